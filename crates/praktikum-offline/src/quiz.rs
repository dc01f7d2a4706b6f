//! # Offline Quiz Answer Queue
//!
//! Answers given during a quiz attempt are never lost to a connectivity gap:
//! a failed submit lands in the local queue, and a later sync replays it.
//!
//! ## Queue Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  submit_answer(payload)                                                 │
//! │     ├── online OK ──────────────────────────► SubmittedAnswer (synced)  │
//! │     └── online failed ─► save_answer ───────► SubmittedAnswer (queued)  │
//! │                              │                                          │
//! │                              ▼                                          │
//! │               offline_answers: "<attempt>_<question>" → record          │
//! │               (one slot per question, last write wins)                  │
//! │                              │                                          │
//! │  sync_answers(attempt)       ▼                                          │
//! │     for each queued record: submit ─ OK ─► delete it if still current  │
//! │                                    └ fail ► keep it for the next pass  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use praktikum_core::validation::validate_id;
use praktikum_core::{
    AnswerPayload, Clock, OfflineAnswerRecord, SubmittedAnswer, OFFLINE_ANSWERS_COLLECTION,
};
use praktikum_store::LocalStore;

use crate::error::{BoxError, OfflineResult};
use crate::upsert::upsert_document;

/// Authoritative online submit path.
#[async_trait]
pub trait AnswerSubmitter: Send + Sync {
    async fn submit_answer(&self, payload: &AnswerPayload) -> Result<SubmittedAnswer, BoxError>;
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Answers accepted by the server and removed from the queue.
    pub synced: usize,
    /// Answers that stay queued.
    pub failed: usize,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Local queue of quiz answers.
#[derive(Clone)]
pub struct AnswerQueue {
    store: Arc<dyn LocalStore>,
    submitter: Arc<dyn AnswerSubmitter>,
    clock: Arc<dyn Clock>,
    /// Held while a slot is written, or compared and dequeued after a sync.
    slots: Arc<Mutex<()>>,
}

impl AnswerQueue {
    pub fn new(
        store: Arc<dyn LocalStore>,
        submitter: Arc<dyn AnswerSubmitter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        AnswerQueue {
            store,
            submitter,
            clock,
            slots: Arc::new(Mutex::new(())),
        }
    }

    /// Queues an answer, replacing any earlier answer to the same question.
    pub async fn save_answer(&self, attempt_id: &str, question_id: &str, answer: &str) -> OfflineResult<()> {
        validate_id("attempt_id", attempt_id)?;
        validate_id("soal_id", question_id)?;

        let record = OfflineAnswerRecord::new(attempt_id, question_id, answer, self.clock.now_ms());
        let doc = serde_json::to_value(&record)?;

        let _slot = self.slots.lock().await;
        if let Err(e) = upsert_document(self.store.as_ref(), OFFLINE_ANSWERS_COLLECTION, &record.id, doc).await {
            error!(attempt_id = %attempt_id, question_id = %question_id, error = %e, "Failed to queue answer");
            return Err(e.into());
        }

        debug!(attempt_id = %attempt_id, question_id = %question_id, "Answer queued offline");
        Ok(())
    }

    /// Submits online, falling back to the local queue on any failure.
    ///
    /// The fallback result carries `is_synced = false`. Only a failure to
    /// queue locally is returned as an error.
    pub async fn submit_answer(&self, payload: &AnswerPayload) -> OfflineResult<SubmittedAnswer> {
        match self.submitter.submit_answer(payload).await {
            Ok(submitted) => Ok(submitted),
            Err(e) => {
                warn!(
                    attempt_id = %payload.attempt_id,
                    question_id = %payload.question_id,
                    error = %e,
                    "Online submit failed, queueing answer"
                );
                self.save_answer(&payload.attempt_id, &payload.question_id, &payload.answer)
                    .await?;
                Ok(SubmittedAnswer::queued_locally(payload, self.clock.now_ms()))
            }
        }
    }

    /// Question id → answer for everything queued under `attempt_id`.
    ///
    /// Empty when the queue cannot be read.
    pub async fn offline_answers(&self, attempt_id: &str) -> BTreeMap<String, String> {
        match self.queued(attempt_id).await {
            Ok(records) => records
                .into_iter()
                .map(|record| (record.question_id, record.answer))
                .collect(),
            Err(e) => {
                warn!(attempt_id = %attempt_id, error = %e, "Failed to read offline answers");
                BTreeMap::new()
            }
        }
    }

    /// Number of answers waiting to sync for `attempt_id`.
    pub async fn pending_count(&self, attempt_id: &str) -> usize {
        self.offline_answers(attempt_id).await.len()
    }

    /// Replays queued answers for `attempt_id`.
    ///
    /// Each record is dequeued right after its own successful submit, so a
    /// partial pass leaves only the failures queued. An answer saved to the
    /// same slot while its older value was in flight stays queued.
    pub async fn sync_answers(&self, attempt_id: &str) -> SyncReport {
        let records = match self.queued(attempt_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!(attempt_id = %attempt_id, error = %e, "Failed to read answer queue");
                return SyncReport::default();
            }
        };

        let mut report = SyncReport::default();
        if records.is_empty() {
            return report;
        }

        for record in records {
            let payload = record.to_payload();
            match self.submitter.submit_answer(&payload).await {
                Ok(_) => {
                    self.dequeue_if_current(&record).await;
                    report.synced += 1;
                }
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Answer sync failed, keeping it queued");
                    report.failed += 1;
                }
            }
        }

        info!(
            attempt_id = %attempt_id,
            synced = report.synced,
            failed = report.failed,
            "Offline answers synced"
        );
        report
    }

    /// Removes `record`'s slot unless a newer answer replaced it.
    ///
    /// Failures only log: the answer stays queued and the next pass resubmits it.
    async fn dequeue_if_current(&self, record: &OfflineAnswerRecord) {
        let _slot = self.slots.lock().await;

        let current = match self.store.get_by_id(OFFLINE_ANSWERS_COLLECTION, &record.id).await {
            Ok(doc) => doc.and_then(|doc| serde_json::from_value::<OfflineAnswerRecord>(doc).ok()),
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "Failed to re-read synced answer");
                return;
            }
        };

        match current {
            Some(current) if current.answer == record.answer && current.saved_at == record.saved_at => {
                if let Err(e) = self.store.delete(OFFLINE_ANSWERS_COLLECTION, &record.id).await {
                    warn!(record_id = %record.id, error = %e, "Failed to dequeue synced answer");
                }
            }
            Some(_) => debug!(record_id = %record.id, "Slot changed during sync, keeping newer answer"),
            None => {}
        }
    }

    async fn queued(&self, attempt_id: &str) -> OfflineResult<Vec<OfflineAnswerRecord>> {
        let docs = self.store.get_all(OFFLINE_ANSWERS_COLLECTION).await?;

        Ok(docs
            .into_iter()
            .filter_map(|doc| match serde_json::from_value::<OfflineAnswerRecord>(doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable queued answer");
                    None
                }
            })
            .filter(|record| record.attempt_id == attempt_id)
            .collect())
    }
}
