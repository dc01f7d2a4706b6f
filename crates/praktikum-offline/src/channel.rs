//! # Storage Channel
//!
//! Same-host publish/subscribe surface shared by every open tab of the
//! client. It behaves like browser storage events:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        StorageChannel                                   │
//! │                                                                         │
//! │   slots: key → latest value (single slot per key, last write wins)     │
//! │                                                                         │
//! │   ┌─────────┐  set(key, v)   ┌──────────────┐   StorageEvent           │
//! │   │  Tab A  │───────────────►│  broadcast   │──────────────► Tab B     │
//! │   └─────────┘                │  (key, new,  │──────────────► Tab C     │
//! │        ▲                     │   old, from) │                          │
//! │        └──── not delivered ──┴──────────────┘                          │
//! │                                                                         │
//! │   A tab that subscribes after a write never sees that write.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writing the value a slot already holds raises no event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Change notification for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,

    /// `None` when the key was removed.
    pub new_value: Option<String>,

    pub old_value: Option<String>,

    /// Tab that performed the write.
    pub origin: Uuid,
}

#[derive(Debug)]
struct ChannelState {
    slots: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

/// Shared slot store plus change notifications.
#[derive(Debug, Clone)]
pub struct StorageChannel {
    state: Arc<ChannelState>,
}

impl StorageChannel {
    /// Creates a channel buffering up to `capacity` events per listener.
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        StorageChannel {
            state: Arc::new(ChannelState {
                slots: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Opens a new tab on this channel.
    pub fn open_tab(&self) -> TabPort {
        TabPort {
            id: Uuid::new_v4(),
            channel: self.clone(),
        }
    }

    /// Current value of a slot.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.state.slots.lock() {
            Ok(slots) => slots.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    fn write(&self, origin: Uuid, key: &str, value: Option<String>) {
        let mut slots = match self.state.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        let old_value = match &value {
            Some(v) => slots.insert(key.to_string(), v.clone()),
            None => slots.remove(key),
        };
        if old_value == value {
            return;
        }

        let event = StorageEvent {
            key: key.to_string(),
            new_value: value,
            old_value,
            origin,
        };

        // Sent under the slot lock so events arrive in write order.
        // No listeners is fine: nobody else is open.
        if self.state.events.send(event).is_err() {
            debug!(key = %key, "Storage write with no listening tabs");
        }
    }
}

/// One tab's connection to the shared channel.
#[derive(Debug, Clone)]
pub struct TabPort {
    id: Uuid,
    channel: StorageChannel,
}

impl TabPort {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Writes a slot; every other listening tab gets an event.
    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.channel.write(self.id, key, Some(value.into()));
    }

    /// Removes a slot.
    pub fn remove(&self, key: &str) {
        self.channel.write(self.id, key, None);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.channel.get(key)
    }

    /// Starts listening. Only writes made after this call are observed.
    pub fn subscribe(&self) -> TabEvents {
        TabEvents {
            tab: self.id,
            rx: self.channel.state.events.subscribe(),
        }
    }
}

/// Stream of storage events written by other tabs.
#[derive(Debug)]
pub struct TabEvents {
    tab: Uuid,
    rx: broadcast::Receiver<StorageEvent>,
}

impl TabEvents {
    /// Next event from another tab, or `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.tab => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(tab = %self.tab, skipped, "Storage listener lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant used by tests and polling shells.
    pub fn try_recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.origin == self.tab => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(tab = %self.tab, skipped, "Storage listener lagged");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}
