//! # Offline Error Types
//!
//! Error types for the offline engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Offline Error Categories                          │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Storage      │  │     Remote              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Store          │  │  Remote (producer or    │ │
//! │  │  ConfigLoad     │  │  Serialization  │  │  submitter failure)     │ │
//! │  │  ConfigSave     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │     Input       │  │   Tab channel   │                              │
//! │  │                 │  │                 │                              │
//! │  │  Validation     │  │  Malformed      │                              │
//! │  │                 │  │  ChannelClosed  │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only write paths return these. Verification and restore paths collapse
//! every failure to `false` / `None` and log instead.

use thiserror::Error;

use praktikum_core::{CoreError, ValidationError};
use praktikum_store::DbError;

/// Boxed error returned by remote producers and submitters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for offline operations.
pub type OfflineResult<T> = Result<T, OfflineError>;

/// Offline engine error.
#[derive(Debug, Error)]
pub enum OfflineError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid offline configuration.
    #[error("Invalid offline configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local store call failed.
    #[error("Local store error: {0}")]
    Store(#[from] DbError),

    /// Record could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The remote producer or submitter failed.
    #[error("Remote call failed: {0}")]
    Remote(#[source] BoxError),

    // =========================================================================
    // Input Errors
    // =========================================================================
    /// Input rejected before touching the store.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Tab Channel Errors
    // =========================================================================
    /// Tab message could not be encoded or decoded.
    #[error("Malformed tab message: {0}")]
    MalformedMessage(String),

    /// The tab listener is gone.
    #[error("Tab channel closed")]
    ChannelClosed,
}

impl OfflineError {
    /// Wraps any remote failure.
    pub fn remote(err: impl Into<BoxError>) -> Self {
        OfflineError::Remote(err.into())
    }

    /// Returns true if the same call may succeed when retried later.
    ///
    /// ## Retryable Errors
    /// - Remote failures (network, server)
    /// - Transient store failures (pool exhausted, connection lost)
    pub fn is_retryable(&self) -> bool {
        match self {
            OfflineError::Remote(_) => true,
            OfflineError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            OfflineError::InvalidConfig(_)
                | OfflineError::ConfigLoadFailed(_)
                | OfflineError::ConfigSaveFailed(_)
        )
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for OfflineError {
    fn from(err: serde_json::Error) -> Self {
        OfflineError::Serialization(err.to_string())
    }
}

impl From<CoreError> for OfflineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => OfflineError::Validation(v),
            CoreError::MalformedMessage(m) => OfflineError::MalformedMessage(m),
            CoreError::Encoding { record, reason } => {
                OfflineError::Serialization(format!("{}: {}", record, reason))
            }
        }
    }
}

impl From<std::io::Error> for OfflineError {
    fn from(err: std::io::Error) -> Self {
        OfflineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for OfflineError {
    fn from(err: toml::de::Error) -> Self {
        OfflineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for OfflineError {
    fn from(err: toml::ser::Error) -> Self {
        OfflineError::ConfigSaveFailed(err.to_string())
    }
}
