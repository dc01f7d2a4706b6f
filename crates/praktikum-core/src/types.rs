//! # Core Types
//!
//! Records persisted by the offline layer and the messages exchanged between
//! tabs. Shapes are the JSON the web client reads back, so field names follow
//! the stored format (camelCase for offline records, the backend's
//! `soal_id`/`jawaban` for quiz answers).
//!
//! ## Where Each Record Lives
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Local Store Layout                               │
//! │                                                                         │
//! │  metadata                                                              │
//! │  ├── offline_credentials → OfflineCredentialRecord  (singleton)        │
//! │  ├── offline_session     → OfflineSessionRecord     (singleton)        │
//! │  └── cache_<key>         → CacheEntry<T>            (one per key)      │
//! │                                                                         │
//! │  collections                                                           │
//! │  ├── users            → AuthUser           (by user id)                │
//! │  ├── offline_answers  → OfflineAnswerRecord (by attempt_question)      │
//! │  ├── offline_quiz     → SnapshotRecord     (by quiz id)                │
//! │  ├── offline_questions→ SnapshotRecord     (by quiz id)                │
//! │  └── offline_attempts → SnapshotRecord     (by attempt id)             │
//! │                                                                         │
//! │  tab channel (not persisted)                                           │
//! │  ├── _multiTabSync    → TabSyncMessage::Login                          │
//! │  └── _logout_event    → TabSyncMessage::Logout                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

use crate::credential::{
    hash_password, normalize_email, verify_password, OFFLINE_ACCESS_TOKEN, OFFLINE_REFRESH_TOKEN,
};
use crate::error::{CoreError, CoreResult};
use crate::{
    OFFLINE_ATTEMPTS_COLLECTION, OFFLINE_QUESTIONS_COLLECTION, OFFLINE_QUIZ_COLLECTION,
};

// =============================================================================
// Identity
// =============================================================================

/// Cached user profile.
///
/// Only `id` and `email` are interpreted here; every other profile field
/// (name, NIM/NIP, avatar...) is carried through untouched in `profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuthUser {
    /// User id (owner of credentials and session).
    pub id: String,

    /// Login email.
    #[serde(default)]
    pub email: String,

    /// Application role (mahasiswa, dosen, laboran, admin).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Remaining profile fields, opaque to this layer.
    #[serde(flatten)]
    #[ts(skip)]
    pub profile: Map<String, Value>,
}

impl AuthUser {
    /// Creates a profile with only the interpreted fields set.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        AuthUser {
            id: id.into(),
            email: email.into(),
            role: None,
            profile: Map::new(),
        }
    }

    /// Sets the role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Adds an opaque profile field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.profile.insert(name.into(), value);
        self
    }
}

/// Token bundle for an authenticated session.
///
/// Online sessions come from the hosted auth service and may carry extra
/// fields (`token_type`, `expires_in`...), kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuthSession {
    pub access_token: String,

    pub refresh_token: String,

    /// Token expiry in epoch **seconds**, as issued by the auth service.
    #[serde(default)]
    #[ts(type = "number")]
    pub expires_at: i64,

    pub user: AuthUser,

    #[serde(flatten)]
    #[ts(skip)]
    pub extra: Map<String, Value>,
}

impl AuthSession {
    /// Mints a session without the network, wrapping a cached profile.
    ///
    /// The sentinel tokens let callers tell it apart from an online-issued one.
    pub fn offline(user: AuthUser, now_ms: i64, ttl_ms: i64) -> Self {
        AuthSession {
            access_token: OFFLINE_ACCESS_TOKEN.to_string(),
            refresh_token: OFFLINE_REFRESH_TOKEN.to_string(),
            expires_at: (now_ms + ttl_ms) / 1000,
            user,
            extra: Map::new(),
        }
    }

    /// Returns true if this session was minted offline.
    pub fn is_offline(&self) -> bool {
        self.access_token == OFFLINE_ACCESS_TOKEN
    }
}

// =============================================================================
// Offline Credentials
// =============================================================================

/// Outcome of checking a login attempt against the stored credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialCheck {
    Valid,
    EmailMismatch,
    PasswordMismatch,
    Expired,
}

/// Singleton record enabling offline login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OfflineCredentialRecord {
    /// Owner user id.
    pub id: String,

    /// Lower-cased login email.
    pub email: String,

    /// Hex SHA-256 of `password + salt(email)`.
    pub password_hash: String,

    #[ts(type = "number")]
    pub created_at: i64,

    #[ts(type = "number")]
    pub expires_at: i64,
}

impl OfflineCredentialRecord {
    /// Builds a record for a successful online login.
    pub fn new(user_id: impl Into<String>, email: &str, password: &str, now_ms: i64, ttl_ms: i64) -> Self {
        OfflineCredentialRecord {
            id: user_id.into(),
            email: normalize_email(email),
            password_hash: hash_password(password, email),
            created_at: now_ms,
            expires_at: now_ms + ttl_ms,
        }
    }

    /// Expired once `now` is strictly past `expires_at`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at
    }

    /// Checks a login attempt; expiry is reported before any other mismatch.
    pub fn check(&self, email: &str, password: &str, now_ms: i64) -> CredentialCheck {
        if self.is_expired(now_ms) {
            CredentialCheck::Expired
        } else if self.email != normalize_email(email) {
            CredentialCheck::EmailMismatch
        } else if !verify_password(password, email, &self.password_hash) {
            CredentialCheck::PasswordMismatch
        } else {
            CredentialCheck::Valid
        }
    }
}

// =============================================================================
// Offline Session
// =============================================================================

/// Singleton snapshot of the last authenticated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OfflineSessionRecord {
    /// User id, mirrors the credential owner.
    pub id: String,

    pub user: AuthUser,

    pub session: AuthSession,

    #[ts(type = "number")]
    pub created_at: i64,

    #[ts(type = "number")]
    pub expires_at: i64,
}

impl OfflineSessionRecord {
    pub fn new(user: AuthUser, session: AuthSession, now_ms: i64, ttl_ms: i64) -> Self {
        OfflineSessionRecord {
            id: user.id.clone(),
            user,
            session,
            created_at: now_ms,
            expires_at: now_ms + ttl_ms,
        }
    }

    /// A session is valid while `now <= expires_at`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at
    }

    pub fn into_restored(self) -> RestoredSession {
        RestoredSession {
            user: self.user,
            session: self.session,
        }
    }
}

/// User and session handed back by a successful restore or offline login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestoredSession {
    pub user: AuthUser,
    pub session: AuthSession,
}

// =============================================================================
// Cache Entry
// =============================================================================

/// One memoized producer result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub key: String,

    /// Last successfully fetched payload.
    pub value: T,

    /// When `value` was fetched (epoch ms).
    pub fetched_at: i64,

    /// Freshness window requested by the call that wrote the entry.
    pub ttl_ms: i64,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, value: T, fetched_at: i64, ttl_ms: i64) -> Self {
        CacheEntry {
            key: key.into(),
            value,
            fetched_at,
            ttl_ms,
        }
    }

    /// Fresh iff `now - fetched_at < ttl`.
    pub fn is_fresh(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.fetched_at < ttl_ms
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.fetched_at
    }
}

// =============================================================================
// Quiz Answers
// =============================================================================

/// Id of the single answer slot for a question within an attempt.
pub fn answer_record_id(attempt_id: &str, question_id: &str) -> String {
    format!("{}_{}", attempt_id, question_id)
}

/// Answer waiting in the offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OfflineAnswerRecord {
    /// `<attempt_id>_<question_id>`.
    pub id: String,

    pub attempt_id: String,

    #[serde(rename = "soal_id")]
    pub question_id: String,

    #[serde(rename = "jawaban")]
    pub answer: String,

    #[serde(rename = "savedAt")]
    #[ts(type = "number")]
    pub saved_at: i64,

    /// False until reconciled with the remote source.
    #[serde(default)]
    pub synced: bool,
}

impl OfflineAnswerRecord {
    pub fn new(attempt_id: &str, question_id: &str, answer: impl Into<String>, now_ms: i64) -> Self {
        OfflineAnswerRecord {
            id: answer_record_id(attempt_id, question_id),
            attempt_id: attempt_id.to_string(),
            question_id: question_id.to_string(),
            answer: answer.into(),
            saved_at: now_ms,
            synced: false,
        }
    }

    pub fn to_payload(&self) -> AnswerPayload {
        AnswerPayload {
            attempt_id: self.attempt_id.clone(),
            question_id: self.question_id.clone(),
            answer: self.answer.clone(),
        }
    }
}

/// Answer submission as sent to the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AnswerPayload {
    pub attempt_id: String,

    #[serde(rename = "soal_id")]
    pub question_id: String,

    #[serde(rename = "jawaban")]
    pub answer: String,
}

/// Answer as acknowledged by the remote source, or accepted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SubmittedAnswer {
    pub id: String,

    pub attempt_id: String,

    #[serde(rename = "soal_id")]
    pub question_id: String,

    #[serde(rename = "jawaban")]
    pub answer: String,

    /// False when the answer only reached the local queue.
    pub is_synced: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl SubmittedAnswer {
    /// Result returned when the online submit failed and the answer was queued.
    pub fn queued_locally(payload: &AnswerPayload, now_ms: i64) -> Self {
        let now = DateTime::<Utc>::from_timestamp_millis(now_ms).unwrap_or_default();
        SubmittedAnswer {
            id: format!("offline_{}_{}", payload.attempt_id, payload.question_id),
            attempt_id: payload.attempt_id.clone(),
            question_id: payload.question_id.clone(),
            answer: payload.answer.clone(),
            is_synced: false,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Quiz Snapshots
// =============================================================================

/// Kind of quiz content kept for offline display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SnapshotKind {
    /// Quiz header (title, duration, schedule), keyed by quiz id.
    Quiz,
    /// Question list, keyed by quiz id.
    Questions,
    /// Attempt in progress, keyed by attempt id.
    Attempt,
}

impl SnapshotKind {
    /// Collection the snapshot is stored in.
    pub fn collection(&self) -> &'static str {
        match self {
            SnapshotKind::Quiz => OFFLINE_QUIZ_COLLECTION,
            SnapshotKind::Questions => OFFLINE_QUESTIONS_COLLECTION,
            SnapshotKind::Attempt => OFFLINE_ATTEMPTS_COLLECTION,
        }
    }
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotKind::Quiz => write!(f, "quiz"),
            SnapshotKind::Questions => write!(f, "questions"),
            SnapshotKind::Attempt => write!(f, "attempt"),
        }
    }
}

/// Stored snapshot of remote quiz content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SnapshotRecord {
    pub id: String,

    #[ts(type = "unknown")]
    pub data: Value,

    #[ts(type = "number")]
    pub cached_at: i64,
}

// =============================================================================
// Cross-Tab Messages
// =============================================================================

/// Default channel slot for login broadcasts.
pub const LOGIN_CHANNEL_KEY: &str = "_multiTabSync";

/// Default channel slot for logout broadcasts.
pub const LOGOUT_CHANNEL_KEY: &str = "_logout_event";

/// Message written to the shared tab channel.
///
/// ## Wire Format
/// ```text
/// {"type":"login","userId":"u-1","email":"a@x.com","timestamp":1700000000000}
/// {"type":"logout","timestamp":1700000000000}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "lowercase")]
#[ts(export)]
pub enum TabSyncMessage {
    Login {
        #[serde(rename = "userId")]
        user_id: String,
        email: String,
        #[ts(type = "number")]
        timestamp: i64,
    },
    Logout {
        #[ts(type = "number")]
        timestamp: i64,
    },
}

impl TabSyncMessage {
    pub fn login(user_id: impl Into<String>, email: impl Into<String>, timestamp: i64) -> Self {
        TabSyncMessage::Login {
            user_id: user_id.into(),
            email: email.into(),
            timestamp,
        }
    }

    pub fn logout(timestamp: i64) -> Self {
        TabSyncMessage::Logout { timestamp }
    }

    /// Encodes the message for the channel.
    pub fn encode(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(|e| CoreError::Encoding {
            record: "tab message".to_string(),
            reason: e.to_string(),
        })
    }

    /// Decodes a channel payload.
    ///
    /// Any JSON that is not a complete login/logout message is rejected,
    /// including a login without `userId`.
    pub fn decode(raw: &str) -> CoreResult<Self> {
        serde_json::from_str(raw).map_err(|e| CoreError::MalformedMessage(e.to_string()))
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            TabSyncMessage::Login { timestamp, .. } | TabSyncMessage::Logout { timestamp } => {
                *timestamp
            }
        }
    }
}
