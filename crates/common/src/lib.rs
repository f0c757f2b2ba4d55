// ================
// crates/common/src/lib.rs
// ================
//! Common types shared between the `Foundation` admin backend crates.
//! These are the persisted records (sessions and users) plus the names of
//! the cookie and header that carry them over HTTP.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key of a user row
pub type UserId = i64;

/// Name of the cookie holding the session id
pub const SESSION_COOKIE_NAME: &str = "foundation_session";

/// Header carrying the CSRF token, in both directions.
/// Clients send it as `X-CSRF-TOKEN`; header names are case-insensitive.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Server-side record binding an opaque bearer token to an optional user
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque random token, also the cookie value
    pub id: String,
    /// Owning user; `None` for anonymous sessions
    pub user_id: Option<UserId>,
    /// When this row was issued (rotation resets it)
    pub created_at: DateTime<Utc>,
    /// The session is invalid once `now > expires_at`
    pub expires_at: DateTime<Utc>,
    /// Per-session CSRF secret, never shared with another id
    pub csrf_token: String,
}

impl Session {
    /// Whether the session has passed its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Anonymous sessions carry no user binding
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }
}

// Ids and tokens are bearer credentials; keep them out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &redact(&self.id))
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("csrf_token", &"<redacted>")
            .finish()
    }
}

/// An account that can log in to the admin UI
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub user_name: String,
    /// Self-describing argon2id hash string
    pub hashed_password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("user_name", &self.user_name)
            .field("hashed_password", &"<redacted>")
            .finish()
    }
}

/// Fields needed to create a user; the store assigns id and timestamps
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_name: String,
    pub display_name: String,
    pub hashed_password: String,
}

/// Show only a short prefix of a secret token
pub fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{prefix}…")
}
