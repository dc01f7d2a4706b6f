//! End-to-end behavior of the offline layer over an in-memory store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use praktikum_core::credential::{CREDENTIALS_TTL_MS, SESSION_TTL_MS};
use praktikum_core::{
    AnswerPayload, AuthSession, AuthUser, Clock, ManualClock, SubmittedAnswer, TabSyncMessage,
    CREDENTIALS_METADATA_KEY, OFFLINE_ANSWERS_COLLECTION,
};
use praktikum_offline::{
    AnswerQueue, AnswerSubmitter, ApiCache, BoxError, CacheOptions, CacheSettings, Notice,
    NoticeLevel, Notifier, OfflineAuth, OfflineConfig, OfflineLayer, StorageChannel, SyncReport,
    TabIdentity, TabSession, TabSyncSettings, TabSynchronizer,
};
use praktikum_store::{Database, DbConfig, DbError, DbResult, LocalStore};

const T0: i64 = 1_700_000_000_000;

// =============================================================================
// Doubles
// =============================================================================

/// Store whose every call fails.
struct BrokenStore;

fn broken() -> DbError {
    DbError::ConnectionFailed("disk unavailable".into())
}

#[async_trait]
impl LocalStore for BrokenStore {
    async fn get_by_id(&self, _: &str, _: &str) -> DbResult<Option<Value>> {
        Err(broken())
    }
    async fn get_all(&self, _: &str) -> DbResult<Vec<Value>> {
        Err(broken())
    }
    async fn create(&self, _: &str, _: Value) -> DbResult<()> {
        Err(broken())
    }
    async fn update(&self, _: &str, _: Value) -> DbResult<()> {
        Err(broken())
    }
    async fn delete(&self, _: &str, _: &str) -> DbResult<()> {
        Err(broken())
    }
    async fn get_metadata(&self, _: &str) -> DbResult<Option<Value>> {
        Err(broken())
    }
    async fn set_metadata(&self, _: &str, _: Value) -> DbResult<()> {
        Err(broken())
    }
    async fn delete_metadata(&self, _: &str) -> DbResult<bool> {
        Err(broken())
    }
    async fn metadata_keys(&self, _: &str) -> DbResult<Vec<String>> {
        Err(broken())
    }
}

/// Real store that refuses writes to one metadata key.
struct StubbornKey {
    inner: Database,
    key: &'static str,
}

#[async_trait]
impl LocalStore for StubbornKey {
    async fn get_by_id(&self, c: &str, id: &str) -> DbResult<Option<Value>> {
        self.inner.get_by_id(c, id).await
    }
    async fn get_all(&self, c: &str) -> DbResult<Vec<Value>> {
        self.inner.get_all(c).await
    }
    async fn create(&self, c: &str, doc: Value) -> DbResult<()> {
        self.inner.create(c, doc).await
    }
    async fn update(&self, c: &str, doc: Value) -> DbResult<()> {
        self.inner.update(c, doc).await
    }
    async fn delete(&self, c: &str, id: &str) -> DbResult<()> {
        self.inner.delete(c, id).await
    }
    async fn get_metadata(&self, key: &str) -> DbResult<Option<Value>> {
        self.inner.get_metadata(key).await
    }
    async fn set_metadata(&self, key: &str, value: Value) -> DbResult<()> {
        if key == self.key && value.is_null() {
            return Err(broken());
        }
        self.inner.set_metadata(key, value).await
    }
    async fn delete_metadata(&self, key: &str) -> DbResult<bool> {
        self.inner.delete_metadata(key).await
    }
    async fn metadata_keys(&self, prefix: &str) -> DbResult<Vec<String>> {
        self.inner.metadata_keys(prefix).await
    }
}

/// Submitter that rejects the listed question ids and records the rest.
#[derive(Default)]
struct ScriptedSubmitter {
    reject: HashSet<String>,
    accepted: Mutex<Vec<AnswerPayload>>,
}

impl ScriptedSubmitter {
    fn rejecting(ids: &[&str]) -> Self {
        ScriptedSubmitter {
            reject: ids.iter().map(|s| s.to_string()).collect(),
            accepted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AnswerSubmitter for ScriptedSubmitter {
    async fn submit_answer(&self, payload: &AnswerPayload) -> Result<SubmittedAnswer, BoxError> {
        if self.reject.contains(&payload.question_id) {
            return Err(format!("500 rejected {}", payload.question_id).into());
        }
        self.accepted.lock().unwrap().push(payload.clone());
        let mut answer = SubmittedAnswer::queued_locally(payload, T0);
        answer.id = format!("srv_{}", payload.question_id);
        answer.is_synced = true;
        Ok(answer)
    }
}

/// Submitter that, while "A" for `att1/q1` is in flight, has the student
/// change the answer to "B" through the same queue.
#[derive(Default)]
struct ChangingMindSubmitter {
    queue: OnceLock<AnswerQueue>,
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl AnswerSubmitter for ChangingMindSubmitter {
    async fn submit_answer(&self, payload: &AnswerPayload) -> Result<SubmittedAnswer, BoxError> {
        self.sent.lock().unwrap().push(payload.answer.clone());
        if payload.answer == "A" {
            let queue = self.queue.get().ok_or("queue not wired")?;
            queue.save_answer("att1", "q1", "B").await?;
        }
        let mut answer = SubmittedAnswer::queued_locally(payload, T0);
        answer.is_synced = true;
        Ok(answer)
    }
}

/// Tab auth context that counts logouts.
struct RecordingSession {
    user: Option<TabIdentity>,
    logouts: AtomicUsize,
}

impl RecordingSession {
    fn logged_in(user_id: &str, email: &str) -> Arc<Self> {
        Arc::new(RecordingSession {
            user: Some(TabIdentity::new(user_id, email)),
            logouts: AtomicUsize::new(0),
        })
    }

    fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TabSession for RecordingSession {
    fn current_user(&self) -> Option<TabIdentity> {
        self.user.clone()
    }

    async fn logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingNotifier(Mutex<Vec<Notice>>);

impl RecordingNotifier {
    fn notices(&self) -> Vec<Notice> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.0.lock().unwrap().push(notice);
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn memory_db() -> Arc<Database> {
    Arc::new(Database::new(DbConfig::in_memory()).await.unwrap())
}

fn alice() -> AuthUser {
    AuthUser::new("u-1", "alice@example.com").with_field("full_name", json!("Alice"))
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

fn counting_producer(
    calls: &Arc<AtomicUsize>,
    value: Value,
) -> impl FnOnce() -> std::future::Ready<Result<Value, BoxError>> + Send + 'static {
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(value))
    }
}

// =============================================================================
// Offline auth
// =============================================================================

#[tokio::test]
async fn test_credentials_round_trip() {
    let db = memory_db().await;
    let auth = OfflineAuth::new(db, Arc::new(ManualClock::new(T0)), &Default::default());

    for (email, password) in [("alice@example.com", "secret"), ("bob@x.com", "p@ss w0rd")] {
        auth.store_credentials(email, password, &alice()).await.unwrap();
        assert!(auth.verify_credentials(email, password).await);
        assert!(!auth.verify_credentials(email, "different").await);
        assert!(!auth.verify_credentials("other@example.com", password).await);
    }
}

#[tokio::test]
async fn test_credentials_expire_after_thirty_days() {
    let clock = Arc::new(ManualClock::new(T0));
    let auth = OfflineAuth::new(memory_db().await, clock.clone(), &Default::default());

    auth.store_credentials("alice@example.com", "secret", &alice()).await.unwrap();
    clock.advance(Duration::from_secs(31 * 24 * 60 * 60));

    assert!(!auth.verify_credentials("alice@example.com", "secret").await);
    assert!(auth.offline_login("alice@example.com", "secret").await.is_none());
}

#[tokio::test]
async fn test_offline_login_survives_session_expiry() {
    let clock = Arc::new(ManualClock::new(T0));
    let auth = OfflineAuth::new(memory_db().await, clock.clone(), &Default::default());
    let user = alice();

    auth.store_credentials("alice@example.com", "secret", &user).await.unwrap();
    auth.store_session(&user, &AuthSession::offline(user.clone(), T0, SESSION_TTL_MS))
        .await
        .unwrap();

    clock.advance(Duration::from_millis(SESSION_TTL_MS as u64 + 1));
    assert!(auth.restore_session().await.is_none());

    // No cached profile yet: refuse rather than invent a user
    assert!(auth.offline_login("alice@example.com", "secret").await.is_none());

    auth.store_user_data(&user).await.unwrap();
    let restored = auth.offline_login("alice@example.com", "secret").await.unwrap();
    assert!(restored.session.is_offline());
    assert_eq!(restored.user, user);
    assert_eq!(
        restored.session.expires_at,
        (clock.now_ms() + SESSION_TTL_MS) / 1000
    );

    // The minted session is the one a later login resumes
    let again = auth.offline_login("alice@example.com", "secret").await.unwrap();
    assert_eq!(again.session, restored.session);
}

#[tokio::test]
async fn test_auth_reads_fail_closed_on_broken_store() {
    let auth = OfflineAuth::new(Arc::new(BrokenStore), Arc::new(ManualClock::new(T0)), &Default::default());

    assert!(!auth.verify_credentials("alice@example.com", "secret").await);
    assert!(!auth.is_offline_login_available().await);
    assert!(auth.restore_session().await.is_none());
    assert!(auth.stored_user_data().await.is_none());
    assert!(auth.offline_login("alice@example.com", "secret").await.is_none());
    auth.clear_all().await;

    // Writes fail open
    assert!(auth.store_credentials("alice@example.com", "secret", &alice()).await.is_err());
    let session = AuthSession::offline(alice(), T0, SESSION_TTL_MS);
    assert!(auth.store_session(&alice(), &session).await.is_err());
    assert!(auth.store_user_data(&alice()).await.is_err());
}

#[tokio::test]
async fn test_clear_all_attempts_both_slots() {
    let store = Arc::new(StubbornKey {
        inner: Database::new(DbConfig::in_memory()).await.unwrap(),
        key: CREDENTIALS_METADATA_KEY,
    });
    let auth = OfflineAuth::new(store, Arc::new(ManualClock::new(T0)), &Default::default());
    let user = alice();

    auth.store_credentials("alice@example.com", "secret", &user).await.unwrap();
    auth.store_session(&user, &AuthSession::offline(user.clone(), T0, SESSION_TTL_MS))
        .await
        .unwrap();

    auth.clear_all().await;

    assert!(auth.is_offline_login_available().await);
    assert!(auth.restore_session().await.is_none());
}

#[tokio::test]
async fn test_credentials_valid_at_exact_expiry() {
    let clock = Arc::new(ManualClock::new(T0));
    let auth = OfflineAuth::new(memory_db().await, clock.clone(), &Default::default());
    auth.store_credentials("alice@example.com", "secret", &alice()).await.unwrap();

    clock.set(T0 + CREDENTIALS_TTL_MS);
    assert!(auth.verify_credentials("alice@example.com", "secret").await);
}

// =============================================================================
// Cache
// =============================================================================

#[tokio::test]
async fn test_cache_freshness_boundaries() {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = ApiCache::new(memory_db().await, clock.clone(), &CacheSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_millis(1_000);

    cache.fetch("k", counting_producer(&calls, json!(1)), CacheOptions::new().ttl(ttl)).await.unwrap();

    clock.set(T0 + 999);
    let v = cache.fetch("k", counting_producer(&calls, json!(2)), CacheOptions::new().ttl(ttl)).await.unwrap();
    assert_eq!(v, json!(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.set(T0 + 1_001);
    let v = cache.fetch("k", counting_producer(&calls, json!(2)), CacheOptions::new().ttl(ttl)).await.unwrap();
    assert_eq!(v, json!(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stale_while_revalidate_serves_old_value_and_refreshes() {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = ApiCache::new(memory_db().await, clock.clone(), &CacheSettings::default());
    let mut updates = cache.subscribe();
    let calls = Arc::new(AtomicUsize::new(0));
    let opts = CacheOptions::new()
        .ttl(Duration::from_millis(1_000))
        .stale_while_revalidate(true);

    cache.fetch("kelas", counting_producer(&calls, json!({"count": 1})), opts).await.unwrap();
    clock.advance(Duration::from_millis(1_500));

    let v = cache.fetch("kelas", counting_producer(&calls, json!({"count": 2})), opts).await.unwrap();
    assert_eq!(v, json!({"count": 1}));

    let update = tokio::time::timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("no background refresh")
        .unwrap();
    assert_eq!(update.key, "kelas");
    assert_eq!(update.fetched_at, T0 + 1_500);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let entry = cache.peek::<Value>("kelas").await.unwrap();
    assert_eq!(entry.value, json!({"count": 2}));
}

#[tokio::test]
async fn test_background_refresh_failure_keeps_stale_entry() {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = ApiCache::new(memory_db().await, clock.clone(), &CacheSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let opts = CacheOptions::new()
        .ttl(Duration::from_millis(1_000))
        .stale_while_revalidate(true);

    cache.fetch("k", counting_producer(&calls, json!(1)), opts).await.unwrap();
    clock.advance(Duration::from_millis(5_000));

    let failures = Arc::new(AtomicUsize::new(0));
    let counter = failures.clone();
    let v = cache
        .fetch(
            "k",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err::<Value, BoxError>("network down".into()))
            },
            opts,
        )
        .await
        .unwrap();
    assert_eq!(v, json!(1));

    wait_until("background producer", || failures.load(Ordering::SeqCst) == 1).await;
    tokio::task::yield_now().await;
    assert_eq!(cache.peek::<Value>("k").await.unwrap().value, json!(1));
}

#[tokio::test]
async fn test_forced_refresh_failure_propagates_over_valid_entry() {
    let cache = ApiCache::new(memory_db().await, Arc::new(ManualClock::new(T0)), &CacheSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));

    cache.fetch("k", counting_producer(&calls, json!(1)), CacheOptions::new()).await.unwrap();

    let result = cache
        .fetch(
            "k",
            || std::future::ready(Err::<Value, BoxError>("503".into())),
            CacheOptions::new().force_refresh(true),
        )
        .await;
    assert!(result.unwrap_err().is_retryable());
}

#[tokio::test]
async fn test_cache_works_without_a_store() {
    let cache = ApiCache::new(Arc::new(BrokenStore), Arc::new(ManualClock::new(T0)), &CacheSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let v = cache.fetch("k", counting_producer(&calls, json!(7)), CacheOptions::new()).await.unwrap();
    assert_eq!(v, json!(7));
    assert_eq!(cache.invalidate_pattern("k").await, 0);
    assert_eq!(cache.clear_all().await, 0);
}

// =============================================================================
// Answer queue
// =============================================================================

#[tokio::test]
async fn test_answer_overwrite_keeps_one_record() {
    let db = memory_db().await;
    let queue = AnswerQueue::new(db.clone(), Arc::new(ScriptedSubmitter::default()), Arc::new(ManualClock::new(T0)));

    queue.save_answer("a", "q", "v1").await.unwrap();
    queue.save_answer("a", "q", "v2").await.unwrap();

    let records = db.get_all(OFFLINE_ANSWERS_COLLECTION).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], "a_q");
    assert_eq!(records[0]["jawaban"], "v2");
    assert_eq!(records[0]["synced"], false);
}

#[tokio::test]
async fn test_partial_sync_leaves_only_failures_queued() {
    let db = memory_db().await;
    let submitter = Arc::new(ScriptedSubmitter::rejecting(&["q2"]));
    let queue = AnswerQueue::new(db.clone(), submitter.clone(), Arc::new(ManualClock::new(T0)));

    queue.save_answer("att1", "q1", "A").await.unwrap();
    queue.save_answer("att1", "q2", "B").await.unwrap();

    let report = queue.sync_answers("att1").await;
    assert_eq!(report, SyncReport { synced: 1, failed: 1 });

    let remaining = db.get_all(OFFLINE_ANSWERS_COLLECTION).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["id"], "att1_q2");
    assert_eq!(submitter.accepted.lock().unwrap()[0].question_id, "q1");
}

#[tokio::test]
async fn test_sync_keeps_answer_saved_during_submit() {
    let db = memory_db().await;
    let submitter = Arc::new(ChangingMindSubmitter::default());
    // Frozen clock: both saves carry the same savedAt
    let queue = AnswerQueue::new(db.clone(), submitter.clone(), Arc::new(ManualClock::new(T0)));
    assert!(submitter.queue.set(queue.clone()).is_ok());

    queue.save_answer("att1", "q1", "A").await.unwrap();

    let report = queue.sync_answers("att1").await;
    assert_eq!(report, SyncReport { synced: 1, failed: 0 });
    let remaining = queue.offline_answers("att1").await;
    assert_eq!(remaining.get("q1").map(String::as_str), Some("B"));

    let report = queue.sync_answers("att1").await;
    assert_eq!(report, SyncReport { synced: 1, failed: 0 });
    assert!(queue.offline_answers("att1").await.is_empty());
    assert_eq!(*submitter.sent.lock().unwrap(), vec!["A".to_string(), "B".to_string()]);
}

#[tokio::test]
async fn test_answer_queue_reads_fail_closed() {
    let queue = AnswerQueue::new(
        Arc::new(BrokenStore),
        Arc::new(ScriptedSubmitter::rejecting(&["q1"])),
        Arc::new(ManualClock::new(T0)),
    );

    assert!(queue.offline_answers("att1").await.is_empty());
    assert_eq!(queue.sync_answers("att1").await, SyncReport::default());

    let payload = AnswerPayload {
        attempt_id: "att1".into(),
        question_id: "q1".into(),
        answer: "A".into(),
    };
    assert!(queue.submit_answer(&payload).await.is_err());
}

// =============================================================================
// Multi-tab sync
// =============================================================================

struct Tab {
    session: Arc<RecordingSession>,
    notices: Arc<RecordingNotifier>,
}

fn attach(channel: &StorageChannel, user_id: &str, email: &str) -> (Tab, praktikum_offline::TabSyncHandle) {
    let session = RecordingSession::logged_in(user_id, email);
    let notices = Arc::new(RecordingNotifier::default());
    let handle = TabSynchronizer::new(
        &TabSyncSettings::default(),
        session.clone(),
        notices.clone(),
        Arc::new(ManualClock::new(T0)),
    )
    .attach(channel.open_tab());
    (Tab { session, notices }, handle)
}

/// Sends a logout from `other` and waits for `tab` to process it; every
/// earlier event has been handled once this returns.
async fn drain(other: &praktikum_offline::TabPort, tab: &Tab) {
    other.set("_logout_event", TabSyncMessage::logout(T0 + 99).encode().unwrap());
    wait_until("logout handled", || tab.session.logouts() >= 1).await;
}

#[tokio::test]
async fn test_same_user_login_elsewhere_is_a_noop() {
    let channel = StorageChannel::new(16);
    let (tab, handle) = attach(&channel, "user-1", "alice@x.com");
    let other = channel.open_tab();

    other.set(
        "_multiTabSync",
        TabSyncMessage::login("user-1", "alice@x.com", T0 + 1).encode().unwrap(),
    );
    drain(&other, &tab).await;

    assert_eq!(tab.session.logouts(), 1);
    assert_eq!(tab.notices.notices(), vec![Notice::info("Terdeteksi logout dari tab lain")]);
    handle.detach().await.unwrap();
}

#[tokio::test]
async fn test_conflicting_login_logs_out_once_with_warning() {
    let channel = StorageChannel::new(16);
    let (tab, handle) = attach(&channel, "user-1", "alice@x.com");
    let other = channel.open_tab();

    other.set(
        "_multiTabSync",
        TabSyncMessage::login("user-2", "bob@x.com", T0 + 1).encode().unwrap(),
    );
    wait_until("conflict handled", || tab.session.logouts() == 1).await;

    let notices = tab.notices.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Warning);
    assert!(notices[0].message.contains("bob@x.com"));
    handle.detach().await.unwrap();
}

#[tokio::test]
async fn test_malformed_messages_never_log_out() {
    let channel = StorageChannel::new(16);
    let (tab, handle) = attach(&channel, "user-1", "alice@x.com");
    let other = channel.open_tab();

    other.set("_multiTabSync", "invalid json{");
    other.set("_logout_event", "invalid-json");
    other.set("_multiTabSync", r#"{"type":"login","email":"x@x.com","timestamp":1}"#);
    other.remove("_logout_event");
    drain(&other, &tab).await;

    assert_eq!(tab.session.logouts(), 1);
    assert_eq!(tab.notices.notices().len(), 1);
    handle.detach().await.unwrap();
}

#[tokio::test]
async fn test_attaching_tab_announces_itself_to_open_tabs() {
    let channel = StorageChannel::new(16);
    let (first, first_handle) = attach(&channel, "user-1", "alice@x.com");
    let (_second, second_handle) = attach(&channel, "user-2", "bob@x.com");

    wait_until("first tab logged out", || first.session.logouts() == 1).await;
    assert!(first.notices.notices()[0].message.contains("bob@x.com"));

    second_handle.broadcast_logout().unwrap();
    wait_until("logout propagated", || first.session.logouts() == 2).await;

    first_handle.detach().await.unwrap();
    second_handle.detach().await.unwrap();
}

// =============================================================================
// Composition
// =============================================================================

#[tokio::test]
async fn test_layer_wires_components_to_one_store() {
    let db = memory_db().await;
    let clock = Arc::new(ManualClock::new(T0));
    let layer = OfflineLayer::with_store(
        OfflineConfig::default(),
        db.clone(),
        Arc::new(ScriptedSubmitter::rejecting(&["q1"])),
        clock,
    );

    let payload = AnswerPayload {
        attempt_id: "att1".into(),
        question_id: "q1".into(),
        answer: "C".into(),
    };
    let submitted = layer.answers().submit_answer(&payload).await.unwrap();
    assert_eq!(submitted.id, "offline_att1_q1");
    assert_eq!(layer.answers().pending_count("att1").await, 1);

    let calls = Arc::new(AtomicUsize::new(0));
    layer
        .cache()
        .fetch("praktikum_list", counting_producer(&calls, json!([1, 2])), CacheOptions::new())
        .await
        .unwrap();
    assert!(db.get_metadata("cache_praktikum_list").await.unwrap().is_some());
}
