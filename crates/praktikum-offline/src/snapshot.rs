//! Quiz content kept for offline display.
//!
//! The last fetched quiz header, question list and attempt are stored in
//! their own collections so a student can keep working through a quiz after
//! the connection drops.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use praktikum_core::{Clock, SnapshotKind, SnapshotRecord};
use praktikum_store::LocalStore;

use crate::error::{BoxError, OfflineError, OfflineResult};
use crate::upsert::upsert_document;

/// Snapshot store for quiz content.
#[derive(Clone)]
pub struct SnapshotCache {
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn LocalStore>, clock: Arc<dyn Clock>) -> Self {
        SnapshotCache { store, clock }
    }

    /// Stores `value` as the latest snapshot. Best-effort.
    pub async fn cache_snapshot<T: Serialize>(&self, kind: SnapshotKind, id: &str, value: &T) {
        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(e) => {
                warn!(kind = %kind, id = %id, error = %e, "Snapshot not serializable");
                return;
            }
        };

        let record = SnapshotRecord {
            id: id.to_string(),
            data,
            cached_at: self.clock.now_ms(),
        };

        let doc = match serde_json::to_value(&record) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(kind = %kind, id = %id, error = %e, "Snapshot record not serializable");
                return;
            }
        };

        match upsert_document(self.store.as_ref(), kind.collection(), id, doc).await {
            Ok(()) => debug!(kind = %kind, id = %id, "Snapshot cached"),
            Err(e) => warn!(kind = %kind, id = %id, error = %e, "Failed to cache snapshot"),
        }
    }

    /// Latest snapshot of `kind` for `id`, if one is stored and readable.
    pub async fn cached_snapshot<T: DeserializeOwned>(&self, kind: SnapshotKind, id: &str) -> Option<T> {
        let doc = match self.store.get_by_id(kind.collection(), id).await {
            Ok(doc) => doc?,
            Err(e) => {
                warn!(kind = %kind, id = %id, error = %e, "Failed to read snapshot");
                return None;
            }
        };

        serde_json::from_value::<SnapshotRecord>(doc)
            .and_then(|record| serde_json::from_value(record.data))
            .map_err(|e| warn!(kind = %kind, id = %id, error = %e, "Unreadable snapshot"))
            .ok()
    }

    /// Network first, snapshot second.
    ///
    /// A successful fetch refreshes the snapshot. When the fetch fails the
    /// stored snapshot is returned; with nothing stored the fetch error is.
    pub async fn load_with_fallback<T, F, Fut, E>(
        &self,
        kind: SnapshotKind,
        id: &str,
        fetcher: F,
    ) -> OfflineResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        match fetcher().await {
            Ok(value) => {
                self.cache_snapshot(kind, id, &value).await;
                Ok(value)
            }
            Err(e) => {
                let e: BoxError = e.into();
                match self.cached_snapshot(kind, id).await {
                    Some(cached) => {
                        info!(kind = %kind, id = %id, error = %e, "Serving cached snapshot");
                        Ok(cached)
                    }
                    None => Err(OfflineError::Remote(e)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use praktikum_core::ManualClock;
    use praktikum_store::{Database, DbConfig};
    use serde_json::{json, Value};

    async fn snapshots() -> (SnapshotCache, Arc<Database>) {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        (SnapshotCache::new(db.clone(), Arc::new(ManualClock::new(5_000))), db)
    }

    #[tokio::test]
    async fn test_cache_and_read_snapshot() {
        let (cache, db) = snapshots().await;
        let quiz = json!({"id": "kuis-1", "judul": "Pretest", "durasi_menit": 30});

        cache.cache_snapshot(SnapshotKind::Quiz, "kuis-1", &quiz).await;
        cache.cache_snapshot(SnapshotKind::Quiz, "kuis-1", &quiz).await;

        let stored = db.get_all("offline_quiz").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["cachedAt"], 5_000);

        let read: Value = cache.cached_snapshot(SnapshotKind::Quiz, "kuis-1").await.unwrap();
        assert_eq!(read, quiz);
        assert!(cache
            .cached_snapshot::<Value>(SnapshotKind::Questions, "kuis-1")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_load_with_fallback() {
        let (cache, _) = snapshots().await;
        let questions = json!([{"id": "q1"}, {"id": "q2"}]);

        let err = cache
            .load_with_fallback::<Value, _, _, _>(SnapshotKind::Questions, "kuis-1", || async {
                Err::<Value, BoxError>("offline".into())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OfflineError::Remote(_)));

        let fresh = questions.clone();
        let loaded: Value = cache
            .load_with_fallback(SnapshotKind::Questions, "kuis-1", || async move {
                Ok::<_, BoxError>(fresh)
            })
            .await
            .unwrap();
        assert_eq!(loaded, questions);

        let fallback: Value = cache
            .load_with_fallback(SnapshotKind::Questions, "kuis-1", || async {
                Err::<Value, BoxError>("offline".into())
            })
            .await
            .unwrap();
        assert_eq!(fallback, questions);
    }
}
