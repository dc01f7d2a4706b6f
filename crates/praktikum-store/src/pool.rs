//! # Local Store Handle
//!
//! Opens the SQLite file that backs every offline component and hands out
//! the two repositories living on top of it.
//!
//! ## Open Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Database::new                                   │
//! │                                                                         │
//! │  DbConfig { path | :memory: }                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  connect options: WAL journal, NORMAL sync, busy timeout, rwc           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SqlitePool (1 connection in memory, small pool on disk)                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  embedded migrations (skipped for read-only inspection)                 │
//! │       │                                                                 │
//! │       ├──► documents()  collections: users, offline_answers, ...        │
//! │       └──► metadata()   singleton slots and cache_* entries             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Background cache refreshes write while the UI reads, so the file runs in
//! WAL mode and writers wait on the busy timeout instead of failing with
//! `SQLITE_BUSY`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::document::DocumentRepository;
use crate::repository::metadata::MetadataRepository;

const MEMORY_PATH: &str = ":memory:";

/// How long a writer waits for a competing writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Configuration
// =============================================================================

/// Where the local store lives and how wide its pool is.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, created on first open. `:memory:` for a throwaway store.
    pub database_path: PathBuf,

    /// Upper bound on pooled connections. Default: 4
    pub max_connections: u32,

    /// Apply embedded migrations while opening. Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 4,
            run_migrations: true,
        }
    }

    /// A private in-memory store, used by tests.
    ///
    /// Pinned to one connection that is never recycled, since each SQLite
    /// memory connection is its own database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let url = if self.is_in_memory() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", self.database_path.display())
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::ConnectionFailed(format!("{}: {}", url, e)))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        Ok(options)
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        let options = SqlitePoolOptions::new()
            .max_connections(self.max_connections.max(1))
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10));

        if self.is_in_memory() {
            options.idle_timeout(None).max_lifetime(None)
        } else {
            options
                .idle_timeout(Some(Duration::from_secs(600)))
                .max_lifetime(Some(Duration::from_secs(1800)))
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Open local store. Clones share the pool.
///
/// Offline components see it through [`LocalStore`](crate::LocalStore).
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the store described by `config`.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening local store");

        let pool = config
            .pool_options()
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!(max_connections = config.max_connections, "Local store pool ready");

        let db = Database { pool };
        if config.run_migrations {
            migrations::run_migrations(&db.pool).await?;
        }

        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Collection documents (`users`, `offline_answers`, snapshots).
    pub fn documents(&self) -> DocumentRepository {
        DocumentRepository::new(self.pool.clone())
    }

    /// Keyed metadata slots.
    pub fn metadata(&self) -> MetadataRepository {
        MetadataRepository::new(self.pool.clone())
    }

    /// Closes the pool. Later calls fail with [`DbError::ConnectionFailed`].
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Local store closed");
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
