//! # praktikum-store: Local Object Store
//!
//! Persistent, asynchronous store for the offline layer: JSON documents in
//! named collections plus single-value metadata slots, on SQLite via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Offline Data Flow                                │
//! │                                                                         │
//! │  OfflineAuth / ApiCache / AnswerQueue                                  │
//! │       │  Arc<dyn LocalStore>                                            │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  praktikum-store (THIS CRATE)                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ DocumentRepo  │    │ 001_local_   │  │   │
//! │  │   │ SqlitePool    │◄───│ MetadataRepo  │    │  store.sql   │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (or :memory: in tests)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use praktikum_store::{Database, DbConfig, LocalStore};
//!
//! let db = Database::new(DbConfig::new("praktikum.db")).await?;
//! db.set_metadata("offline_session", serde_json::json!(null)).await?;
//! let answers = db.get_all("offline_answers").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::document::DocumentRepository;
pub use repository::metadata::MetadataRepository;
pub use store::LocalStore;
