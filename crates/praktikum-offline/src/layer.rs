//! # Offline Layer
//!
//! Composes the offline components over one shared local store, clock and
//! tab channel. The UI shell builds one `OfflineLayer` at startup and hands
//! references to the parts it needs.
//!
//! ## Composition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          OfflineLayer                                   │
//! │                                                                         │
//! │  OfflineConfig ──► Database (SQLite) ──► Arc<dyn LocalStore>            │
//! │                                              │                          │
//! │             ┌──────────────┬─────────────────┼──────────────┐           │
//! │             ▼              ▼                 ▼              ▼           │
//! │        OfflineAuth     ApiCache        AnswerQueue    SnapshotCache     │
//! │                                                                         │
//! │  StorageChannel ──► attach_tab() ──► TabSyncHandle (one per tab)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use praktikum_core::{Clock, SystemClock};
use praktikum_store::{Database, DbConfig, LocalStore};

use crate::auth::OfflineAuth;
use crate::cache::ApiCache;
use crate::channel::StorageChannel;
use crate::config::OfflineConfig;
use crate::error::{OfflineError, OfflineResult};
use crate::notify::Notifier;
use crate::quiz::{AnswerQueue, AnswerSubmitter};
use crate::snapshot::SnapshotCache;
use crate::tab_sync::{TabSession, TabSyncHandle, TabSynchronizer};

/// Initializes the tracing subscriber for binaries embedding the layer.
///
/// `RUST_LOG` overrides the default filter. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,praktikum=debug,sqlx=warn"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// All offline components, wired to one store.
pub struct OfflineLayer {
    config: OfflineConfig,
    clock: Arc<dyn Clock>,
    auth: OfflineAuth,
    cache: ApiCache,
    answers: AnswerQueue,
    snapshots: SnapshotCache,
    channel: StorageChannel,
}

impl OfflineLayer {
    /// Opens the SQLite store named by `config` and builds every component.
    pub async fn open(config: OfflineConfig, submitter: Arc<dyn AnswerSubmitter>) -> OfflineResult<Self> {
        config.validate()?;

        let path = config.store.resolve_path().ok_or_else(|| {
            OfflineError::InvalidConfig("no database path and no platform data directory".into())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OfflineError::InvalidConfig(format!("{}: {}", parent.display(), e)))?;
        }

        let mut db_config = DbConfig::new(&path);
        if let Some(max) = config.store.max_connections {
            db_config = db_config.max_connections(max);
        }

        let db = Database::new(db_config).await?;
        info!(path = %path.display(), "Offline layer opened");

        Ok(Self::with_store(config, Arc::new(db), submitter, Arc::new(SystemClock)))
    }

    /// Builds the layer over an existing store and clock.
    pub fn with_store(
        config: OfflineConfig,
        store: Arc<dyn LocalStore>,
        submitter: Arc<dyn AnswerSubmitter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        OfflineLayer {
            auth: OfflineAuth::new(store.clone(), clock.clone(), &config.auth),
            cache: ApiCache::new(store.clone(), clock.clone(), &config.cache),
            answers: AnswerQueue::new(store.clone(), submitter, clock.clone()),
            snapshots: SnapshotCache::new(store, clock.clone()),
            channel: StorageChannel::new(config.tab_sync.channel_capacity),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn auth(&self) -> &OfflineAuth {
        &self.auth
    }

    pub fn cache(&self) -> &ApiCache {
        &self.cache
    }

    pub fn answers(&self) -> &AnswerQueue {
        &self.answers
    }

    pub fn snapshots(&self) -> &SnapshotCache {
        &self.snapshots
    }

    pub fn channel(&self) -> &StorageChannel {
        &self.channel
    }

    /// Opens a tab on the shared channel and attaches its synchronizer.
    pub fn attach_tab(&self, session: Arc<dyn TabSession>, notifier: Arc<dyn Notifier>) -> TabSyncHandle {
        TabSynchronizer::new(&self.config.tab_sync, session, notifier, self.clock.clone())
            .attach(self.channel.open_tab())
    }
}
