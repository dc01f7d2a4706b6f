//! # Schema Migrations
//!
//! The schema is two tables (`documents` keyed by `(collection, id)`, and
//! `metadata` keyed by slot name) shipped as SQL files under
//! `migrations/sqlite/` and embedded at compile time.
//!
//! Applied versions are tracked in `_sqlx_migrations`, so opening an already
//! migrated store is a no-op. Schema changes go in a new numbered file; an
//! applied file is never edited, since its checksum is recorded.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the workspace `migrations/sqlite` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every embedded migration not yet recorded in the store.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(migrations = MIGRATOR.migrations.len(), "Local store schema up to date");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)`.
///
/// A store that was never migrated reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if tracked == 0 {
        return Ok((total, 0));
    }

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;

    Ok((total, applied as usize))
}
