//! # Store Errors
//!
//! ```text
//! sqlx::Error ─────────┐
//! MigrateError ────────┼──► DbError ──► OfflineError::Store (praktikum-offline)
//! serde_json::Error ───┘
//! ```
//!
//! Callers branch on two things only: "does the document already exist"
//! ([`DbError::UniqueViolation`], used by upserts) and "is it worth trying
//! again" ([`DbError::is_transient`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// `update` on an id the collection does not hold.
    #[error("{collection} has no document '{id}'")]
    NotFound { collection: String, id: String },

    /// `create` on an id the collection already holds.
    #[error("{collection} already holds '{id}'")]
    UniqueViolation { collection: String, id: String },

    /// Document is not an object, or its `id` is missing or not a string.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Stored JSON text could not be read back.
    #[error("Corrupt stored JSON: {0}")]
    Serialization(String),

    /// File could not be opened, or the pool is closed.
    #[error("Store unavailable: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// SQLite rejected a statement.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// No connection freed up within the acquire timeout.
    #[error("All store connections busy")]
    PoolExhausted,

    #[error("Internal store error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(collection: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// True when the same call may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::ConnectionFailed(_) | DbError::PoolExhausted | DbError::Internal(_)
        )
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool closed".to_string()),
            sqlx::Error::Io(e) => DbError::ConnectionFailed(e.to_string()),
            // The id is not in the driver error; DocumentRepository fills it in.
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::UniqueViolation {
                collection: db_err.table().unwrap_or("documents").to_string(),
                id: String::new(),
            },
            sqlx::Error::Database(db_err) => DbError::QueryFailed(db_err.message().to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
