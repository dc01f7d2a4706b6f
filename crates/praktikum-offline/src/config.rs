//! # Offline Configuration
//!
//! Configuration management for the offline engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PRAKTIKUM_DB_PATH=/data/praktikum.db                               │
//! │     PRAKTIKUM_CACHE_TTL_MS=60000                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/praktikum-offline/offline.toml (Linux)                   │
//! │     ~/Library/Application Support/id.praktikum.offline/offline.toml    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     30 day credentials, 24 hour session, 5 minute cache TTL            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # offline.toml
//! [auth]
//! credentials_ttl_days = 30
//! session_ttl_hours = 24
//!
//! [cache]
//! default_ttl_ms = 300000
//! key_prefix = "cache_"
//! event_capacity = 64
//!
//! [tab_sync]
//! login_key = "_multiTabSync"
//! logout_key = "_logout_event"
//! channel_capacity = 64
//!
//! [store]
//! database_path = "/var/lib/praktikum/praktikum.db"
//! max_connections = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use praktikum_core::{LOGIN_CHANNEL_KEY, LOGOUT_CHANNEL_KEY};

use crate::error::{OfflineError, OfflineResult};

const MS_PER_HOUR: i64 = 60 * 60 * 1000;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

// =============================================================================
// Auth Settings
// =============================================================================

/// Trust windows for offline login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// How long stored credentials allow offline login.
    #[serde(default = "default_credentials_ttl_days")]
    pub credentials_ttl_days: u32,

    /// How long a session snapshot can be restored.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u32,
}

fn default_credentials_ttl_days() -> u32 {
    30
}

fn default_session_ttl_hours() -> u32 {
    24
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            credentials_ttl_days: default_credentials_ttl_days(),
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

impl AuthSettings {
    pub fn credentials_ttl_ms(&self) -> i64 {
        i64::from(self.credentials_ttl_days) * MS_PER_DAY
    }

    pub fn session_ttl_ms(&self) -> i64 {
        i64::from(self.session_ttl_hours) * MS_PER_HOUR
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Stale-while-revalidate cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Freshness window used when a call does not pass its own TTL.
    #[serde(default = "default_cache_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Metadata key prefix for cache entries.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Buffered cache-updated notifications per subscriber.
    #[serde(default = "default_capacity")]
    pub event_capacity: usize,
}

fn default_cache_ttl_ms() -> u64 {
    5 * 60 * 1000
}

fn default_key_prefix() -> String {
    "cache_".to_string()
}

fn default_capacity() -> usize {
    64
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            default_ttl_ms: default_cache_ttl_ms(),
            key_prefix: default_key_prefix(),
            event_capacity: default_capacity(),
        }
    }
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

// =============================================================================
// Tab Sync Settings
// =============================================================================

/// Cross-tab channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSyncSettings {
    /// Slot carrying login broadcasts.
    #[serde(default = "default_login_key")]
    pub login_key: String,

    /// Slot carrying logout broadcasts.
    #[serde(default = "default_logout_key")]
    pub logout_key: String,

    /// Buffered storage events per tab before a slow tab starts lagging.
    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,
}

fn default_login_key() -> String {
    LOGIN_CHANNEL_KEY.to_string()
}

fn default_logout_key() -> String {
    LOGOUT_CHANNEL_KEY.to_string()
}

impl Default for TabSyncSettings {
    fn default() -> Self {
        TabSyncSettings {
            login_key: default_login_key(),
            logout_key: default_logout_key(),
            channel_capacity: default_capacity(),
        }
    }
}

// =============================================================================
// Store Settings
// =============================================================================

/// Local store location.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Pool size; `None` keeps the store default.
    #[serde(default)]
    pub max_connections: Option<u32>,
}

impl StoreSettings {
    /// Resolves the database path, falling back to the platform data dir.
    pub fn resolve_path(&self) -> Option<PathBuf> {
        self.database_path.clone().or_else(|| {
            directories::ProjectDirs::from("id", "praktikum", "offline")
                .map(|dirs| dirs.data_dir().join("praktikum.db"))
        })
    }
}

// =============================================================================
// Main Offline Configuration
// =============================================================================

/// Complete offline engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineConfig {
    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub tab_sync: TabSyncSettings,

    #[serde(default)]
    pub store: StoreSettings,
}

impl OfflineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (offline.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> OfflineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading offline config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load offline config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> OfflineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| OfflineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OfflineError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| OfflineError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Offline config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> OfflineResult<()> {
        if self.auth.credentials_ttl_days == 0 || self.auth.session_ttl_hours == 0 {
            return Err(OfflineError::InvalidConfig(
                "auth trust windows must be greater than 0".into(),
            ));
        }

        if self.cache.default_ttl_ms == 0 {
            return Err(OfflineError::InvalidConfig(
                "cache.default_ttl_ms must be greater than 0".into(),
            ));
        }

        if self.cache.key_prefix.is_empty() {
            return Err(OfflineError::InvalidConfig(
                "cache.key_prefix must not be empty".into(),
            ));
        }

        if self.tab_sync.login_key.is_empty() || self.tab_sync.logout_key.is_empty() {
            return Err(OfflineError::InvalidConfig(
                "tab_sync channel keys must not be empty".into(),
            ));
        }

        if self.tab_sync.login_key == self.tab_sync.logout_key {
            return Err(OfflineError::InvalidConfig(format!(
                "tab_sync.login_key and tab_sync.logout_key must differ, both are '{}'",
                self.tab_sync.login_key
            )));
        }

        if self.cache.event_capacity == 0 || self.tab_sync.channel_capacity == 0 {
            return Err(OfflineError::InvalidConfig(
                "channel capacities must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `PRAKTIKUM_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("PRAKTIKUM_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.store.database_path = Some(PathBuf::from(path));
        }

        if let Some(ttl) = lookup("PRAKTIKUM_CACHE_TTL_MS") {
            match ttl.parse::<u64>() {
                Ok(ms) => self.cache.default_ttl_ms = ms,
                Err(_) => warn!(value = %ttl, "Ignoring invalid PRAKTIKUM_CACHE_TTL_MS"),
            }
        }

        if let Some(days) = lookup("PRAKTIKUM_CREDENTIALS_TTL_DAYS") {
            match days.parse::<u32>() {
                Ok(d) => self.auth.credentials_ttl_days = d,
                Err(_) => warn!(value = %days, "Ignoring invalid PRAKTIKUM_CREDENTIALS_TTL_DAYS"),
            }
        }

        if let Some(hours) = lookup("PRAKTIKUM_SESSION_TTL_HOURS") {
            match hours.parse::<u32>() {
                Ok(h) => self.auth.session_ttl_hours = h,
                Err(_) => warn!(value = %hours, "Ignoring invalid PRAKTIKUM_SESSION_TTL_HOURS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("id", "praktikum", "offline")
            .map(|dirs| dirs.config_dir().join("offline.toml"))
    }
}
