//! # Error Types
//!
//! Domain-specific error types for praktikum-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  praktikum-core errors (this file)                                     │
//! │  ├── CoreError        - Record and message errors                      │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  praktikum-store errors (separate crate)                               │
//! │  └── DbError          - Local store failures                           │
//! │                                                                         │
//! │  praktikum-offline errors (separate crate)                             │
//! │  └── OfflineError     - What the UI layer sees                         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → OfflineError → UI                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while building or decoding core records.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A cross-tab payload could not be decoded.
    ///
    /// ## When This Occurs
    /// - Payload is not JSON at all
    /// - JSON does not carry a known `type`
    /// - A login message lacks `userId`
    #[error("Malformed tab message: {0}")]
    MalformedMessage(String),

    /// A record could not be encoded to JSON.
    #[error("Failed to encode {record}: {reason}")]
    Encoding { record: String, reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., email without `@`).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
