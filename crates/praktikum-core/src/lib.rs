//! # praktikum-core: Pure Types for the Offline Layer
//!
//! Shared vocabulary of the offline-first client layer: the records that get
//! persisted in the local store, the messages exchanged between tabs, the
//! credential digest and the clock every expiry check is evaluated against.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Praktikum Offline Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Web Client (UI layer)                        │   │
//! │  │   Login form ──► Quiz attempt ──► Dashboards ──► Logout         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                praktikum-offline (engine)                       │   │
//! │  │   OfflineAuth • ApiCache • AnswerQueue • TabSynchronizer        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ praktikum-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ credential │  │   clock   │  │ validation│  │   │
//! │  │   │  Records  │  │  SHA-256   │  │ System /  │  │   ids,    │  │   │
//! │  │   │  Messages │  │  salt, TTL │  │  Manual   │  │   email   │  │   │
//! │  │   └───────────┘  └────────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Persisted records and cross-tab messages
//! - [`credential`] - Offline credential digest and trust windows
//! - [`clock`] - Injectable time source
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Time
//!
//! Every timestamp is epoch milliseconds (`i64`). Expiry is never enforced by
//! timers: callers compare stored timestamps to [`Clock::now_ms`] at read time.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod credential;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Storage Layout
// =============================================================================

/// Metadata slot holding the singleton [`OfflineCredentialRecord`].
pub const CREDENTIALS_METADATA_KEY: &str = "offline_credentials";

/// Metadata slot holding the singleton [`OfflineSessionRecord`].
pub const SESSION_METADATA_KEY: &str = "offline_session";

/// Collection holding cached user profiles, keyed by user id.
pub const USERS_COLLECTION: &str = "users";

/// Collection holding queued quiz answers ([`OfflineAnswerRecord`]).
pub const OFFLINE_ANSWERS_COLLECTION: &str = "offline_answers";

/// Collection holding quiz snapshots for offline display.
pub const OFFLINE_QUIZ_COLLECTION: &str = "offline_quiz";

/// Collection holding question-list snapshots, keyed by quiz id.
pub const OFFLINE_QUESTIONS_COLLECTION: &str = "offline_questions";

/// Collection holding attempt snapshots, keyed by attempt id.
pub const OFFLINE_ATTEMPTS_COLLECTION: &str = "offline_attempts";
