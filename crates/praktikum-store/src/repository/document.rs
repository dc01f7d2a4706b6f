//! # Document Repository
//!
//! JSON documents grouped by collection and addressed by their `id` field.
//!
//! ```text
//! documents
//! collection        | id       | body                                  | created_at | updated_at
//! ──────────────────┼──────────┼───────────────────────────────────────┼────────────┼───────────
//! users             | u-1      | {"id":"u-1","email":"a@x.com",...}    | ...        | ...
//! offline_answers   | att1_q1  | {"id":"att1_q1","jawaban":"A",...}    | ...        | ...
//! ```

use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Extracts the document id. Numeric ids are accepted and stored as text.
pub fn document_id(doc: &Value) -> DbResult<String> {
    match doc.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(DbError::InvalidDocument(
            "`id` must be a non-empty string or a number".to_string(),
        )),
        None if doc.is_object() => Err(DbError::InvalidDocument("missing `id`".to_string())),
        None => Err(DbError::InvalidDocument("document must be a JSON object".to_string())),
    }
}

fn decode_body(body: &str) -> DbResult<Value> {
    Ok(serde_json::from_str(body)?)
}

/// Repository for collection documents.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DocumentRepository { pool }
    }

    /// Gets one document, `None` if absent.
    pub async fn get(&self, collection: &str, id: &str) -> DbResult<Option<Value>> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        body.as_deref().map(decode_body).transpose()
    }

    /// Lists every document of a collection in insertion order.
    pub async fn list(&self, collection: &str) -> DbResult<Vec<Value>> {
        let bodies: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT body FROM documents
            WHERE collection = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        bodies.iter().map(|b| decode_body(b)).collect()
    }

    /// Inserts a new document.
    ///
    /// ## Errors
    /// * `UniqueViolation` - a document with this id already exists
    /// * `InvalidDocument` - no usable `id`
    pub async fn insert(&self, collection: &str, doc: &Value) -> DbResult<()> {
        let id = document_id(doc)?;
        let body = serde_json::to_string(doc)?;
        let now = Utc::now();

        debug!(collection = %collection, id = %id, "Inserting document");

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(body)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate(collection, id.clone()),
            other => other,
        })?;

        Ok(())
    }

    /// Replaces an existing document.
    ///
    /// ## Errors
    /// * `NotFound` - no document with this id
    pub async fn replace(&self, collection: &str, doc: &Value) -> DbResult<()> {
        let id = document_id(doc)?;
        let body = serde_json::to_string(doc)?;

        debug!(collection = %collection, id = %id, "Replacing document");

        let result = sqlx::query(
            r#"
            UPDATE documents SET body = ?3, updated_at = ?4
            WHERE collection = ?1 AND id = ?2
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(body)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(collection, id));
        }

        Ok(())
    }

    /// Deletes a document. Returns whether it existed.
    pub async fn delete(&self, collection: &str, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Document count per collection, for diagnostics.
    pub async fn counts(&self) -> DbResult<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT collection, COUNT(*) FROM documents GROUP BY collection ORDER BY collection",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
