//! # LocalStore Contract
//!
//! The asynchronous collection/metadata store the offline layer is written
//! against. Every call may fail; atomicity is guaranteed per call only.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get_by_id(collection, id)  → Option<doc>                               │
//! │  get_all(collection)        → Vec<doc>   (insertion order)              │
//! │  create(collection, doc)    → Err(UniqueViolation) if id exists         │
//! │  update(collection, doc)    → Err(NotFound) if id missing               │
//! │  delete(collection, id)     → Ok even if id missing                     │
//! │  get_metadata(key)          → None if never set or set to null          │
//! │  set_metadata(key, value)   → overwrite; null clears                    │
//! │  delete_metadata(key)       → whether a value was removed               │
//! │  metadata_keys(prefix)      → keys holding a value, sorted              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Documents are JSON objects carrying their own `id`.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DbResult;
use crate::pool::Database;

/// Persistent key/collection store.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get_by_id(&self, collection: &str, id: &str) -> DbResult<Option<Value>>;

    async fn get_all(&self, collection: &str) -> DbResult<Vec<Value>>;

    async fn create(&self, collection: &str, doc: Value) -> DbResult<()>;

    async fn update(&self, collection: &str, doc: Value) -> DbResult<()>;

    async fn delete(&self, collection: &str, id: &str) -> DbResult<()>;

    async fn get_metadata(&self, key: &str) -> DbResult<Option<Value>>;

    async fn set_metadata(&self, key: &str, value: Value) -> DbResult<()>;

    async fn delete_metadata(&self, key: &str) -> DbResult<bool>;

    async fn metadata_keys(&self, prefix: &str) -> DbResult<Vec<String>>;
}

#[async_trait]
impl LocalStore for Database {
    async fn get_by_id(&self, collection: &str, id: &str) -> DbResult<Option<Value>> {
        self.documents().get(collection, id).await
    }

    async fn get_all(&self, collection: &str) -> DbResult<Vec<Value>> {
        self.documents().list(collection).await
    }

    async fn create(&self, collection: &str, doc: Value) -> DbResult<()> {
        self.documents().insert(collection, &doc).await
    }

    async fn update(&self, collection: &str, doc: Value) -> DbResult<()> {
        self.documents().replace(collection, &doc).await
    }

    async fn delete(&self, collection: &str, id: &str) -> DbResult<()> {
        self.documents().delete(collection, id).await.map(|_| ())
    }

    async fn get_metadata(&self, key: &str) -> DbResult<Option<Value>> {
        self.metadata().get(key).await
    }

    async fn set_metadata(&self, key: &str, value: Value) -> DbResult<()> {
        self.metadata().set(key, &value).await
    }

    async fn delete_metadata(&self, key: &str) -> DbResult<bool> {
        self.metadata().delete(key).await
    }

    async fn metadata_keys(&self, prefix: &str) -> DbResult<Vec<String>> {
        self.metadata().keys_with_prefix(prefix).await
    }
}
