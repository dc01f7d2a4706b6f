//! # praktikum-offline: Offline Engine
//!
//! Everything the practicum client needs to keep working without the
//! network: offline login, a stale-while-revalidate API cache, a queue for
//! quiz answers, and session sync across open tabs.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Offline Engine                                   │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌─────────────┐ │
//! │  │ OfflineAuth  │  │  ApiCache    │  │ AnswerQueue  │  │ TabSync     │ │
//! │  │              │  │              │  │ Snapshot     │  │             │ │
//! │  │ credentials  │  │ TTL + SWR    │  │ Cache        │  │ login /     │ │
//! │  │ session      │  │ invalidation │  │              │  │ logout      │ │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘  └──────┬──────┘ │
//! │         │                 │                 │                 │        │
//! │         └────────┬────────┴────────┬────────┘                 ▼        │
//! │                  ▼                 ▼                  StorageChannel    │
//! │          Arc<dyn LocalStore>   Arc<dyn Clock>         (per-key slots)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Semantics
//! - Verification and restore paths fail closed (`false` / `None`).
//! - Store writes propagate [`OfflineError`].
//! - Clears, background refreshes and malformed tab messages only log.
//!
//! ## Modules
//! - [`auth`] - Offline credentials, session snapshot and offline login
//! - [`cache`] - Stale-while-revalidate cache over the metadata store
//! - [`quiz`] - Offline answer queue and sync
//! - [`snapshot`] - Quiz content kept for offline display
//! - [`channel`] - Same-host storage channel shared by tabs
//! - [`tab_sync`] - Multi-tab session synchronizer
//! - [`notify`] - User-visible notices
//! - [`config`] - TOML + environment configuration
//! - [`layer`] - Composition root

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod cache;
pub mod channel;
pub mod config;
pub mod error;
pub mod layer;
pub mod notify;
pub mod quiz;
pub mod snapshot;
pub mod tab_sync;

mod upsert;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::OfflineAuth;
pub use cache::{ApiCache, CacheOptions, CacheUpdated};
pub use channel::{StorageChannel, StorageEvent, TabEvents, TabPort};
pub use config::{AuthSettings, CacheSettings, OfflineConfig, StoreSettings, TabSyncSettings};
pub use error::{BoxError, OfflineError, OfflineResult};
pub use layer::{init_tracing, OfflineLayer};
pub use notify::{NoOpNotifier, Notice, NoticeLevel, Notifier};
pub use quiz::{AnswerQueue, AnswerSubmitter, SyncReport};
pub use snapshot::SnapshotCache;
pub use tab_sync::{EventOutcome, TabIdentity, TabSession, TabSyncHandle, TabSynchronizer};
