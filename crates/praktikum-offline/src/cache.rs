//! # Stale-While-Revalidate Cache
//!
//! Memoizes the result of any async producer under a string key, and keeps
//! serving the last good value when the freshness window has passed.
//!
//! ## Read Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        fetch(key, producer, options)                    │
//! │                                                                         │
//! │  force_refresh? ── yes ──► producer() ─► store ─► return (errors bubble)│
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  entry for key?                                                         │
//! │   ├── none ──────────────► producer() ─► store ─► return                │
//! │   ├── fresh ─────────────► return cached (producer not called)          │
//! │   └── stale                                                             │
//! │        ├── swr ──────────► return cached now                           │
//! │        │                   spawn: producer() ─► store if unchanged     │
//! │        │                          └─► CacheUpdated event               │
//! │        └── no swr ───────► producer() ─► store ─► return                │
//! │                            (stale_if_error: failure serves the entry)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries live in the metadata store under `<prefix><key>`. Concurrent
//! misses for one key may each call the producer.
//!
//! ## Background Refresh Guard
//! Every entry write and removal for a key holds that key's async mutex. A
//! background refresh only lands if the stored entry is still exactly the
//! one it started from, so it never overwrites a newer write (even one made
//! in the same millisecond) and never brings back an invalidated entry.
//!
//! Key locks exist only while someone holds or waits for them; the last
//! holder removes the key from the lock table.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use praktikum_core::{CacheEntry, Clock};
use praktikum_store::LocalStore;

use crate::config::CacheSettings;
use crate::error::{BoxError, OfflineError, OfflineResult};

// =============================================================================
// Options
// =============================================================================

/// Per-call cache behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Freshness window; the cache default when `None`.
    pub ttl: Option<Duration>,

    /// Skip the cache and overwrite the entry.
    pub force_refresh: bool,

    /// Serve a stale entry at once and refresh it in the background.
    pub stale_while_revalidate: bool,

    /// Serve a stale entry when the synchronous refetch fails.
    pub stale_if_error: bool,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn stale_while_revalidate(mut self, swr: bool) -> Self {
        self.stale_while_revalidate = swr;
        self
    }

    pub fn stale_if_error(mut self, enabled: bool) -> Self {
        self.stale_if_error = enabled;
        self
    }
}

/// Raised after a background refresh replaced an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheUpdated {
    pub key: String,
    pub fetched_at: i64,
}

// =============================================================================
// Cache
// =============================================================================

struct CacheInner {
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    prefix: String,
    default_ttl: Duration,
    key_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    events: broadcast::Sender<CacheUpdated>,
}

/// Stale-while-revalidate cache over the local store.
///
/// Cheap to clone; clones share entries, locks and subscribers.
#[derive(Clone)]
pub struct ApiCache {
    inner: Arc<CacheInner>,
}

impl ApiCache {
    pub fn new(store: Arc<dyn LocalStore>, clock: Arc<dyn Clock>, settings: &CacheSettings) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        ApiCache {
            inner: Arc::new(CacheInner {
                store,
                clock,
                prefix: settings.key_prefix.clone(),
                default_ttl: settings.default_ttl(),
                key_locks: StdMutex::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Notifications for entries replaced by background refreshes.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdated> {
        self.inner.events.subscribe()
    }

    /// Returns the value for `key`, calling `producer` only when needed.
    ///
    /// ## Errors
    /// A producer failure is returned as [`OfflineError::Remote`] whenever
    /// the caller waits on the producer, unless `stale_if_error` applies.
    /// Background refresh failures are only logged.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let kelas = cache
    ///     .fetch("kelas_42", move || api.get_kelas(42), CacheOptions::new().stale_while_revalidate(true))
    ///     .await?;
    /// ```
    pub async fn fetch<T, F, Fut, E>(&self, key: &str, producer: F, options: CacheOptions) -> OfflineResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let ttl_ms = self.ttl_ms(options.ttl);

        if options.force_refresh {
            debug!(key = %key, "Cache bypassed by force refresh");
            return self.refresh_now(key, producer, ttl_ms).await;
        }

        let Some((raw, entry)) = self.read_entry::<T>(key).await else {
            debug!(key = %key, "Cache miss");
            return self.refresh_now(key, producer, ttl_ms).await;
        };

        let now = self.inner.clock.now_ms();
        if entry.is_fresh(now, ttl_ms) {
            debug!(key = %key, age_ms = entry.age_ms(now), "Cache hit");
            return Ok(entry.value);
        }

        if options.stale_while_revalidate {
            debug!(key = %key, age_ms = entry.age_ms(now), "Serving stale entry, revalidating");
            self.spawn_revalidation(key, raw, producer, ttl_ms);
            return Ok(entry.value);
        }

        debug!(key = %key, age_ms = entry.age_ms(now), "Cache entry stale, refetching");
        match self.refresh_now(key, producer, ttl_ms).await {
            Err(e) if options.stale_if_error => {
                warn!(key = %key, error = %e, "Refetch failed, serving stale entry");
                Ok(entry.value)
            }
            result => result,
        }
    }

    /// Writes `local` now, then tries to replace it with the server's answer.
    ///
    /// A failing `updater` leaves the local value cached and returns it.
    /// Only the local write can fail this call.
    pub async fn optimistic_update<T, F, Fut, E>(
        &self,
        key: &str,
        local: T,
        updater: F,
        ttl: Option<Duration>,
    ) -> OfflineResult<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let ttl_ms = self.ttl_ms(ttl);
        self.write_entry(key, &local, ttl_ms).await?;

        match updater().await {
            Ok(server) => {
                if let Err(e) = self.write_entry(key, &server, ttl_ms).await {
                    warn!(key = %key, error = %e, "Failed to cache server value");
                }
                Ok(server)
            }
            Err(e) => {
                let e: BoxError = e.into();
                warn!(key = %key, error = %e, "Optimistic update not confirmed, keeping local value");
                Ok(local)
            }
        }
    }

    /// Reads an entry without calling any producer.
    ///
    /// Store failures and entries that no longer decode as `T` read as `None`.
    pub async fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        self.read_entry(key).await.map(|(_, entry)| entry)
    }

    /// The stored entry both as written and decoded.
    async fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<(Value, CacheEntry<T>)> {
        let raw = match self.inner.store.get_metadata(&self.inner.slot(key)).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_value(raw.clone()) {
            Ok(entry) => Some((raw, entry)),
            Err(e) => {
                warn!(key = %key, error = %e, "Unreadable cache entry, treating as miss");
                None
            }
        }
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Removes one entry. Returns whether it existed.
    pub async fn invalidate(&self, key: &str) -> bool {
        let _guard = self.inner.lock_key(key).await;

        match self.inner.store.delete_metadata(&self.inner.slot(key)).await {
            Ok(removed) => {
                debug!(key = %key, removed, "Cache invalidated");
                removed
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to invalidate cache entry");
                false
            }
        }
    }

    /// Removes every entry whose key contains `pattern`.
    ///
    /// `*` and `?` are stripped first, so `kelas_42*` and `kelas_42` both
    /// remove everything cached for kelas 42. Returns how many were removed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let needle: String = pattern.chars().filter(|c| *c != '*' && *c != '?').collect();
        let removed = self.remove_matching(|key| key.contains(needle.as_str())).await;
        info!(pattern = %pattern, removed, "Cache pattern invalidated");
        removed
    }

    /// Removes every entry. Returns how many were removed.
    pub async fn clear_all(&self) -> usize {
        let removed = self.remove_matching(|_| true).await;
        info!(removed, "Cache cleared");
        removed
    }

    async fn remove_matching(&self, matches: impl Fn(&str) -> bool) -> usize {
        let slots = match self.inner.store.metadata_keys(&self.inner.prefix).await {
            Ok(slots) => slots,
            Err(e) => {
                warn!(error = %e, "Failed to list cache entries");
                return 0;
            }
        };

        let mut removed = 0;
        for slot in slots {
            let Some(key) = slot.strip_prefix(self.inner.prefix.as_str()) else {
                continue;
            };
            if matches(key) && self.invalidate(key).await {
                removed += 1;
            }
        }
        removed
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn ttl_ms(&self, ttl: Option<Duration>) -> i64 {
        let ttl = ttl.unwrap_or(self.inner.default_ttl);
        i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
    }

    async fn refresh_now<T, F, Fut, E>(&self, key: &str, producer: F, ttl_ms: i64) -> OfflineResult<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let value = producer().await.map_err(OfflineError::remote)?;

        if let Err(e) = self.write_entry(key, &value, ttl_ms).await {
            warn!(key = %key, error = %e, "Failed to cache fresh value");
        }
        Ok(value)
    }

    async fn write_entry<T: Serialize>(&self, key: &str, value: &T, ttl_ms: i64) -> OfflineResult<i64> {
        let _guard = self.inner.lock_key(key).await;
        self.inner.write_locked(key, value, ttl_ms).await
    }

    fn spawn_revalidation<T, F, Fut, E>(&self, key: &str, started_from: Value, producer: F, ttl_ms: i64)
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let inner = self.inner.clone();
        let key = key.to_string();

        tokio::spawn(async move {
            match producer().await {
                Ok(value) => inner.land_revalidation(&key, &started_from, &value, ttl_ms).await,
                Err(e) => {
                    let e: BoxError = e.into();
                    warn!(key = %key, error = %e, "Background revalidation failed, keeping stale entry");
                }
            }
        });
    }
}

impl CacheInner {
    fn slot(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn locks(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        match self.key_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Waits for exclusive access to `key`'s entry.
    async fn lock_key(&self, key: &str) -> KeyGuard<'_> {
        let lock = self.locks().entry(key.to_string()).or_default().clone();
        KeyGuard {
            inner: self,
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Drops `key` from the lock table once only the table refers to it.
    fn release_key(&self, key: &str) {
        let mut locks = self.locks();
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    /// Caller must hold the key lock.
    async fn write_locked<T: Serialize>(&self, key: &str, value: &T, ttl_ms: i64) -> OfflineResult<i64> {
        let fetched_at = self.clock.now_ms();
        let entry = CacheEntry::new(key, value, fetched_at, ttl_ms);
        self.store
            .set_metadata(&self.slot(key), serde_json::to_value(&entry)?)
            .await?;
        debug!(key = %key, ttl_ms, "Cached");
        Ok(fetched_at)
    }

    async fn land_revalidation<T: Serialize>(&self, key: &str, started_from: &Value, value: &T, ttl_ms: i64) {
        let _guard = self.lock_key(key).await;

        let current = match self.store.get_metadata(&self.slot(key)).await {
            Ok(current) => current,
            Err(e) => {
                warn!(key = %key, error = %e, "Background revalidation could not read entry");
                return;
            }
        };

        if current.as_ref() != Some(started_from) {
            debug!(key = %key, "Entry changed during revalidation, dropping refreshed value");
            return;
        }

        match self.write_locked(key, value, ttl_ms).await {
            Ok(fetched_at) => {
                debug!(key = %key, "Background revalidation completed");
                let _ = self.events.send(CacheUpdated {
                    key: key.to_string(),
                    fetched_at,
                });
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to store revalidated value"),
        }
    }
}

/// Exclusive access to one key's entry, released on drop.
struct KeyGuard<'a> {
    inner: &'a CacheInner,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Unlock first so the table holds the last reference.
        drop(self.guard.take());
        self.inner.release_key(&self.key);
    }
}
