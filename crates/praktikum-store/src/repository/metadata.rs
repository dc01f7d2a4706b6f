//! # Metadata Repository
//!
//! Single-value slots addressed by key. Holds the offline credential and
//! session singletons and every `cache_<key>` entry.
//!
//! Writing JSON `null` keeps the row with a NULL value; it reads back as
//! absent, the same as a key that was never written.

use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository for metadata slots.
#[derive(Debug, Clone)]
pub struct MetadataRepository {
    pool: SqlitePool,
}

impl MetadataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MetadataRepository { pool }
    }

    /// Reads a slot. Missing and null slots both return `None`.
    pub async fn get(&self, key: &str) -> DbResult<Option<Value>> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT value FROM metadata WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match value.flatten() {
            Some(raw) => match serde_json::from_str::<Value>(&raw)? {
                Value::Null => Ok(None),
                v => Ok(Some(v)),
            },
            None => Ok(None),
        }
    }

    /// Writes a slot, replacing whatever it held.
    pub async fn set(&self, key: &str, value: &Value) -> DbResult<()> {
        let raw = match value {
            Value::Null => None,
            v => Some(serde_json::to_string(v)?),
        };

        debug!(key = %key, cleared = raw.is_none(), "Writing metadata slot");

        sqlx::query(
            r#"
            INSERT INTO metadata (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(raw)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes a slot. Returns whether it held a value.
    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        let had_value: Option<bool> =
            sqlx::query_scalar("DELETE FROM metadata WHERE key = ?1 RETURNING value IS NOT NULL")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(had_value.unwrap_or(false))
    }

    /// Keys of non-null slots starting with `prefix`, sorted.
    pub async fn keys_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        // substr() instead of LIKE so `_` and `%` in keys match literally.
        let keys: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT key FROM metadata
            WHERE substr(key, 1, length(?1)) = ?1
              AND value IS NOT NULL
            ORDER BY key
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }
}
