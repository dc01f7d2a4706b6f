//! Create-or-update over the [`LocalStore`] contract.
//!
//! The existence check and the write are two separate store calls, so two
//! writers racing on the same id may both see "absent"; the loser's create
//! then fails with a unique violation and is retried as an update.

use serde_json::Value;
use tracing::debug;

use praktikum_store::{DbError, DbResult, LocalStore};

/// Writes `doc` under `id` in `collection`, creating it when absent.
pub(crate) async fn upsert_document(
    store: &dyn LocalStore,
    collection: &str,
    id: &str,
    doc: Value,
) -> DbResult<()> {
    if store.get_by_id(collection, id).await?.is_some() {
        return store.update(collection, doc).await;
    }

    match store.create(collection, doc.clone()).await {
        Err(DbError::UniqueViolation { .. }) => {
            debug!(collection = %collection, id = %id, "Concurrent create, updating instead");
            store.update(collection, doc).await
        }
        other => other,
    }
}
