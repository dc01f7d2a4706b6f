//! # Offline Credential Digest
//!
//! Local verification of a password without any network access.
//!
//! ## Trust Windows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Independent Expiry Windows                       │
//! │                                                                         │
//! │  online login at T                                                     │
//! │       │                                                                 │
//! │       ├── credentials: T ─────────────────────────────────► T + 30d    │
//! │       │                                                                 │
//! │       └── session:     T ──────► T + 24h                               │
//! │                                                                         │
//! │  Session expired, credentials valid  → offline login mints a session   │
//! │  Credentials expired                 → offline login refused           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The digest is `hex(SHA-256(password + salt(email)))`. The salt is derived
//! from the email and is not secret: this only lets a device recognise a
//! password it has already seen, it is not a password store.

use sha2::{Digest, Sha256};

/// Credentials stay usable for offline login for 30 days.
pub const CREDENTIALS_TTL_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// An offline session snapshot is restorable for 24 hours.
pub const SESSION_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Access token carried by a session minted without the network.
pub const OFFLINE_ACCESS_TOKEN: &str = "offline_session_token";

/// Refresh token carried by a session minted without the network.
pub const OFFLINE_REFRESH_TOKEN: &str = "offline_refresh_token";

/// Canonical form of an email for storage, comparison and salting.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Deterministic, non-secret salt for an email.
///
/// ## Example
/// ```rust
/// use praktikum_core::credential::credential_salt;
///
/// assert_eq!(credential_salt("Alice@Example.com"), "praktikum_alice@example.com_salt");
/// ```
pub fn credential_salt(email: &str) -> String {
    format!("praktikum_{}_salt", normalize_email(email))
}

/// Hex-encoded SHA-256 of `password + salt(email)`.
pub fn hash_password(password: &str, email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(credential_salt(email).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Recomputes the digest and compares it to a stored one.
pub fn verify_password(password: &str, email: &str, stored_hash: &str) -> bool {
    hash_password(password, email).eq_ignore_ascii_case(stored_hash)
}
