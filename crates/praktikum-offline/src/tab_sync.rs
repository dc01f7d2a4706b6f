//! # Multi-Tab Session Synchronizer
//!
//! Keeps exactly one identity live across every open tab. A login for a
//! different user, or any logout, in one tab ends the session in all others.
//!
//! ## Message Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tab Session Sync                                 │
//! │                                                                         │
//! │  Tab A (user-1)                StorageChannel              Tab B        │
//! │  ──────────────                ──────────────              ─────        │
//! │                                                                         │
//! │  attach() ───── _multiTabSync {login, user-1} ──────────► compare ids   │
//! │                                                           same → no-op  │
//! │                                                                         │
//! │  (user-2 logs in on B)                                                  │
//! │  compare ids ◄──── _multiTabSync {login, user-2} ─────── broadcast      │
//! │  differ → logout + warning                                              │
//! │                                                                         │
//! │  broadcast_logout() ── _logout_event {logout} ──────────► logout + info │
//! │                                                                         │
//! │  detach() stops listening; it never broadcasts a logout.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use praktikum_core::{Clock, TabSyncMessage};

use crate::channel::{StorageEvent, TabEvents, TabPort};
use crate::config::TabSyncSettings;
use crate::error::{OfflineError, OfflineResult};
use crate::notify::{Notice, Notifier};

// =============================================================================
// Collaborators
// =============================================================================

/// Identity currently authenticated in a tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabIdentity {
    pub user_id: String,
    pub email: String,
}

impl TabIdentity {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        TabIdentity {
            user_id: user_id.into(),
            email: email.into(),
        }
    }
}

/// The tab's own auth context.
#[async_trait]
pub trait TabSession: Send + Sync {
    /// Identity logged in on this tab, if any.
    fn current_user(&self) -> Option<TabIdentity>;

    /// Runs this tab's logout procedure.
    async fn logout(&self);
}

/// What the listener did with one storage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Key not ours, slot removed, or nothing to compare against.
    Ignored,
    /// Login broadcast for the user already active here.
    SameUser,
    /// This tab logged out.
    LoggedOut,
    /// Payload was not JSON.
    Malformed,
}

// =============================================================================
// Synchronizer
// =============================================================================

/// Listener logic for one tab.
pub struct TabSynchronizer {
    login_key: String,
    logout_key: String,
    session: Arc<dyn TabSession>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl TabSynchronizer {
    pub fn new(
        settings: &TabSyncSettings,
        session: Arc<dyn TabSession>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        TabSynchronizer {
            login_key: settings.login_key.clone(),
            logout_key: settings.logout_key.clone(),
            session,
            notifier,
            clock,
        }
    }

    /// Starts listening on `port`, then announces this tab's identity.
    ///
    /// The subscription is taken before the announcement so that a reply
    /// from another tab cannot slip in between.
    pub fn attach(self, port: TabPort) -> TabSyncHandle {
        let events = port.subscribe();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let sync = Arc::new(self);
        let handle = TabSyncHandle {
            port,
            login_key: sync.login_key.clone(),
            logout_key: sync.logout_key.clone(),
            clock: sync.clock.clone(),
            shutdown_tx,
            task: None,
        };

        if let Some(identity) = sync.session.current_user() {
            if let Err(e) = handle.broadcast_login(&identity.user_id, &identity.email) {
                warn!(error = %e, "Failed to announce tab identity");
            }
        }

        let listener = sync.clone();
        let tab = handle.port.id();
        let task = tokio::spawn(async move {
            listener.run(events, shutdown_rx).await;
            debug!(tab = %tab, "Tab listener stopped");
        });

        TabSyncHandle {
            task: Some(task),
            ..handle
        }
    }

    async fn run(&self, mut events: TabEvents, mut shutdown_rx: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(&event).await;
                    }
                    None => break,
                },
            }
        }
    }

    /// Reacts to one storage event written by another tab.
    pub async fn handle_event(&self, event: &StorageEvent) -> EventOutcome {
        let is_login = event.key == self.login_key;
        if !is_login && event.key != self.logout_key {
            return EventOutcome::Ignored;
        }

        let Some(raw) = event.new_value.as_deref() else {
            return EventOutcome::Ignored;
        };

        if serde_json::from_str::<serde_json::Value>(raw).is_err() {
            warn!(key = %event.key, "Ignoring malformed tab message");
            return EventOutcome::Malformed;
        }

        if is_login {
            self.handle_login(raw).await
        } else {
            info!("Logout detected in another tab");
            self.session.logout().await;
            self.notifier.notify(Notice::info("Terdeteksi logout dari tab lain"));
            EventOutcome::LoggedOut
        }
    }

    async fn handle_login(&self, raw: &str) -> EventOutcome {
        let (user_id, email) = match TabSyncMessage::decode(raw) {
            Ok(TabSyncMessage::Login { user_id, email, .. }) => (user_id, email),
            Ok(_) | Err(_) => {
                debug!("Login slot holds no usable login message");
                return EventOutcome::Ignored;
            }
        };

        let Some(current) = self.session.current_user() else {
            return EventOutcome::Ignored;
        };

        if current.user_id == user_id {
            return EventOutcome::SameUser;
        }

        warn!(
            current_user = %current.user_id,
            other_user = %user_id,
            "Different user logged in on another tab"
        );
        self.session.logout().await;
        self.notifier.notify(Notice::warning(format!(
            "{} login di tab lain - current session logout",
            email
        )));
        EventOutcome::LoggedOut
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Attached tab: broadcasts and detaches.
pub struct TabSyncHandle {
    port: TabPort,
    login_key: String,
    logout_key: String,
    clock: Arc<dyn Clock>,
    shutdown_tx: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl TabSyncHandle {
    /// Announces a login, replacing the previous login message.
    pub fn broadcast_login(&self, user_id: &str, email: &str) -> OfflineResult<()> {
        let message = TabSyncMessage::login(user_id, email, self.clock.now_ms());
        self.port.set(&self.login_key, message.encode()?);
        debug!(user_id = %user_id, "Broadcast login");
        Ok(())
    }

    /// Announces a logout, replacing the previous logout message.
    pub fn broadcast_logout(&self) -> OfflineResult<()> {
        let message = TabSyncMessage::logout(self.clock.now_ms());
        self.port.set(&self.logout_key, message.encode()?);
        debug!("Broadcast logout");
        Ok(())
    }

    pub fn port(&self) -> &TabPort {
        &self.port
    }

    /// Stops the listener without broadcasting anything.
    pub async fn detach(mut self) -> OfflineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| OfflineError::ChannelClosed)?;
        if let Some(task) = self.task.take() {
            task.await.map_err(|_| OfflineError::ChannelClosed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::StorageChannel;
    use crate::notify::NoticeLevel;
    use praktikum_core::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeSession {
        user: Option<TabIdentity>,
        logouts: AtomicUsize,
    }

    #[async_trait]
    impl TabSession for FakeSession {
        fn current_user(&self) -> Option<TabIdentity> {
            self.user.clone()
        }

        async fn logout(&self) {
            self.logouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Notices(Mutex<Vec<Notice>>);

    impl Notifier for Notices {
        fn notify(&self, notice: Notice) {
            self.0.lock().unwrap().push(notice);
        }
    }

    fn synchronizer(user: Option<TabIdentity>) -> (TabSynchronizer, Arc<FakeSession>, Arc<Notices>) {
        let session = Arc::new(FakeSession {
            user,
            logouts: AtomicUsize::new(0),
        });
        let notices = Arc::new(Notices::default());
        let sync = TabSynchronizer::new(
            &TabSyncSettings::default(),
            session.clone(),
            notices.clone(),
            Arc::new(ManualClock::new(1_000)),
        );
        (sync, session, notices)
    }

    fn event(key: &str, value: Option<&str>) -> StorageEvent {
        StorageEvent {
            key: key.to_string(),
            new_value: value.map(str::to_string),
            old_value: None,
            origin: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_logout_event_logs_out() {
        let (sync, session, notices) = synchronizer(Some(TabIdentity::new("u-1", "a@x.com")));

        let outcome = sync
            .handle_event(&event("_logout_event", Some(r#"{"type":"logout","timestamp":1}"#)))
            .await;

        assert_eq!(outcome, EventOutcome::LoggedOut);
        assert_eq!(session.logouts.load(Ordering::SeqCst), 1);
        let notices = notices.0.lock().unwrap();
        assert_eq!(notices[0].level, NoticeLevel::Info);
        assert_eq!(notices[0].message, "Terdeteksi logout dari tab lain");
    }

    #[tokio::test]
    async fn test_logout_slot_accepts_any_json() {
        let (sync, session, _) = synchronizer(Some(TabIdentity::new("u-1", "a@x.com")));
        let outcome = sync.handle_event(&event("_logout_event", Some("{}"))).await;
        assert_eq!(outcome, EventOutcome::LoggedOut);
        assert_eq!(session.logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_removed_slots_ignored() {
        let (sync, session, _) = synchronizer(Some(TabIdentity::new("u-1", "a@x.com")));
        assert_eq!(sync.handle_event(&event("_logout_event", None)).await, EventOutcome::Ignored);
        assert_eq!(sync.handle_event(&event("_multiTabSync", None)).await, EventOutcome::Ignored);
        assert_eq!(session.logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_login_without_user_id_ignored() {
        let (sync, session, _) = synchronizer(Some(TabIdentity::new("u-1", "a@x.com")));
        let outcome = sync
            .handle_event(&event("_multiTabSync", Some(r#"{"type":"login","email":"b@x.com","timestamp":1}"#)))
            .await;
        assert_eq!(outcome, EventOutcome::Ignored);
        assert_eq!(session.logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_login_while_logged_out_ignored() {
        let (sync, session, notices) = synchronizer(None);
        let outcome = sync
            .handle_event(&event(
                "_multiTabSync",
                Some(r#"{"type":"login","userId":"u-2","email":"b@x.com","timestamp":1}"#),
            ))
            .await;
        assert_eq!(outcome, EventOutcome::Ignored);
        assert_eq!(session.logouts.load(Ordering::SeqCst), 0);
        assert!(notices.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrelated_key_ignored() {
        let (sync, _, _) = synchronizer(Some(TabIdentity::new("u-1", "a@x.com")));
        assert_eq!(sync.handle_event(&event("theme", Some("dark"))).await, EventOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_attach_announces_identity_and_detach_is_silent() {
        let channel = StorageChannel::new(16);
        let observer = channel.open_tab();
        let mut observed = observer.subscribe();

        let (sync, _, _) = synchronizer(Some(TabIdentity::new("u-1", "a@x.com")));
        let handle = sync.attach(channel.open_tab());

        let announced = observed.recv().await.unwrap();
        assert_eq!(announced.key, "_multiTabSync");
        let message = TabSyncMessage::decode(announced.new_value.as_deref().unwrap()).unwrap();
        assert_eq!(message, TabSyncMessage::login("u-1", "a@x.com", 1_000));

        handle.detach().await.unwrap();
        assert!(observed.try_recv().is_none());
        assert!(channel.get("_logout_event").is_none());
    }
}
