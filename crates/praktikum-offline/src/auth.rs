//! # Offline Credential & Session Manager
//!
//! Lets a user who has logged in online before get a usable session back
//! without any network access.
//!
//! ## Login Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        offline_login(email, pw)                         │
//! │                                                                         │
//! │  1. verify_credentials ──── false ──────────────────────► None          │
//! │        │ true                                                           │
//! │        ▼                                                                │
//! │  2. restore_session ─────── Some(unexpired) ────────────► Some(session) │
//! │        │ None                                                           │
//! │        ▼                                                                │
//! │  3. stored_user_data ────── None ───────────────────────► None          │
//! │        │ Some(user)                                                     │
//! │        ▼                                                                │
//! │  4. mint offline session (sentinel tokens), persist best-effort         │
//! │        └────────────────────────────────────────────────► Some(session) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Semantics
//! Reads, verification and restore fail closed (`false` / `None`) and log.
//! Writes propagate their error. Clears are best-effort: logged, swallowed.

use std::sync::Arc;

use futures_util::future::join;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use praktikum_core::validation::{validate_email, validate_id, validate_password};
use praktikum_core::{
    AuthSession, AuthUser, Clock, CredentialCheck, OfflineCredentialRecord, OfflineSessionRecord,
    RestoredSession, CREDENTIALS_METADATA_KEY, SESSION_METADATA_KEY, USERS_COLLECTION,
};
use praktikum_store::LocalStore;

use crate::config::AuthSettings;
use crate::error::OfflineResult;
use crate::upsert::upsert_document;

/// Offline credential and session manager.
#[derive(Clone)]
pub struct OfflineAuth {
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    credentials_ttl_ms: i64,
    session_ttl_ms: i64,
}

impl OfflineAuth {
    pub fn new(store: Arc<dyn LocalStore>, clock: Arc<dyn Clock>, settings: &AuthSettings) -> Self {
        OfflineAuth {
            store,
            clock,
            credentials_ttl_ms: settings.credentials_ttl_ms(),
            session_ttl_ms: settings.session_ttl_ms(),
        }
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// Stores credentials after a successful online login.
    ///
    /// Overwrites any previous record, whoever it belonged to.
    pub async fn store_credentials(
        &self,
        email: &str,
        password: &str,
        user: &AuthUser,
    ) -> OfflineResult<()> {
        validate_email(email)?;
        validate_password(password)?;

        let record = OfflineCredentialRecord::new(
            user.id.clone(),
            email,
            password,
            self.clock.now_ms(),
            self.credentials_ttl_ms,
        );

        let value = serde_json::to_value(&record)?;
        if let Err(e) = self.store.set_metadata(CREDENTIALS_METADATA_KEY, value).await {
            error!(user_id = %user.id, error = %e, "Failed to store offline credentials");
            return Err(e.into());
        }

        info!(user_id = %user.id, expires_at = record.expires_at, "Offline credentials stored");
        Ok(())
    }

    /// Checks a login attempt against the stored credentials.
    ///
    /// Every failure, including a store error, is `false`.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> bool {
        let Some(record) = self.load_credentials().await else {
            debug!("No offline credentials found");
            return false;
        };

        match record.check(email, password, self.clock.now_ms()) {
            CredentialCheck::Valid => {
                debug!(user_id = %record.id, "Offline credentials verified");
                true
            }
            CredentialCheck::Expired => {
                info!(user_id = %record.id, "Offline credentials expired");
                self.clear_credentials().await;
                false
            }
            CredentialCheck::EmailMismatch | CredentialCheck::PasswordMismatch => {
                debug!("Offline credentials rejected");
                false
            }
        }
    }

    /// Removes stored credentials. Best-effort.
    pub async fn clear_credentials(&self) {
        match self.store.set_metadata(CREDENTIALS_METADATA_KEY, Value::Null).await {
            Ok(()) => debug!("Offline credentials cleared"),
            Err(e) => warn!(error = %e, "Failed to clear offline credentials"),
        }
    }

    /// True when a non-expired credential record exists.
    pub async fn is_offline_login_available(&self) -> bool {
        self.load_credentials()
            .await
            .map(|record| !record.is_expired(self.clock.now_ms()))
            .unwrap_or(false)
    }

    async fn load_credentials(&self) -> Option<OfflineCredentialRecord> {
        let raw = match self.store.get_metadata(CREDENTIALS_METADATA_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read offline credentials");
                return None;
            }
        };

        serde_json::from_value(raw)
            .map_err(|e| warn!(error = %e, "Unreadable offline credential record"))
            .ok()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Snapshots the current session for later restore.
    pub async fn store_session(&self, user: &AuthUser, session: &AuthSession) -> OfflineResult<()> {
        let record = OfflineSessionRecord::new(
            user.clone(),
            session.clone(),
            self.clock.now_ms(),
            self.session_ttl_ms,
        );

        let value = serde_json::to_value(&record)?;
        if let Err(e) = self.store.set_metadata(SESSION_METADATA_KEY, value).await {
            error!(user_id = %user.id, error = %e, "Failed to store offline session");
            return Err(e.into());
        }

        debug!(user_id = %user.id, expires_at = record.expires_at, "Offline session stored");
        Ok(())
    }

    /// Returns the stored session unless it is missing or expired.
    pub async fn restore_session(&self) -> Option<RestoredSession> {
        let raw = match self.store.get_metadata(SESSION_METADATA_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No offline session found");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read offline session");
                return None;
            }
        };

        let record: OfflineSessionRecord = match serde_json::from_value(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Unreadable offline session record");
                return None;
            }
        };

        if record.is_expired(self.clock.now_ms()) {
            info!(user_id = %record.id, "Offline session expired");
            self.clear_session().await;
            return None;
        }

        debug!(user_id = %record.id, "Offline session restored");
        Some(record.into_restored())
    }

    /// Removes the stored session. Best-effort.
    pub async fn clear_session(&self) {
        match self.store.set_metadata(SESSION_METADATA_KEY, Value::Null).await {
            Ok(()) => debug!("Offline session cleared"),
            Err(e) => warn!(error = %e, "Failed to clear offline session"),
        }
    }

    // =========================================================================
    // User Profile
    // =========================================================================

    /// Profile of the credential owner, if cached.
    ///
    /// The owner comes from the credential record so the lookup still works
    /// when only credentials survive.
    pub async fn stored_user_data(&self) -> Option<AuthUser> {
        let owner = self.load_credentials().await?.id;

        let raw = match self.store.get_by_id(USERS_COLLECTION, &owner).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(user_id = %owner, error = %e, "Failed to read cached user");
                return None;
            }
        };

        serde_json::from_value(raw)
            .map_err(|e| warn!(user_id = %owner, error = %e, "Unreadable cached user"))
            .ok()
    }

    /// Caches a user profile for offline use.
    pub async fn store_user_data(&self, user: &AuthUser) -> OfflineResult<()> {
        validate_id("user id", &user.id)?;

        let doc = serde_json::to_value(user)?;
        if let Err(e) = upsert_document(self.store.as_ref(), USERS_COLLECTION, &user.id, doc).await {
            error!(user_id = %user.id, error = %e, "Failed to store user data");
            return Err(e.into());
        }

        debug!(user_id = %user.id, "User data stored for offline access");
        Ok(())
    }

    // =========================================================================
    // Offline Login
    // =========================================================================

    /// Logs in without the network.
    ///
    /// An existing unexpired session is returned as is. Otherwise a session
    /// is minted around the cached profile and persisted; a failure to
    /// persist it does not fail the login.
    pub async fn offline_login(&self, email: &str, password: &str) -> Option<RestoredSession> {
        if !self.verify_credentials(email, password).await {
            info!("Offline login refused");
            return None;
        }

        if let Some(restored) = self.restore_session().await {
            info!(user_id = %restored.user.id, "Offline login resumed existing session");
            return Some(restored);
        }

        let Some(user) = self.stored_user_data().await else {
            warn!("Offline login failed: no cached user profile");
            return None;
        };

        let session = AuthSession::offline(user.clone(), self.clock.now_ms(), self.session_ttl_ms);
        if let Err(e) = self.store_session(&user, &session).await {
            warn!(user_id = %user.id, error = %e, "Offline session not persisted");
        }

        info!(user_id = %user.id, "Offline login successful");
        Some(RestoredSession { user, session })
    }

    /// Clears credentials and session; one failing does not stop the other.
    pub async fn clear_all(&self) {
        join(self.clear_credentials(), self.clear_session()).await;
        info!("Offline auth data cleared");
    }
}
