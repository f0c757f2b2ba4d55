// ============================
// crates/backend-lib/src/auth/session.rs
// ============================
//! Session lifecycle: creation, rotation, login, logout and expiry.
//!
//! Sessions are not cached here; every decision reads the store. Two
//! concurrent requests can both decide to rotate the same row. With a store
//! whose `replace` is not atomic the loser's delete finds nothing, so the
//! window for two live rows per user is narrow but real.
use chrono::{DateTime, Duration, Utc};
use foundation_common::{Session, User};
use metrics::counter;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::auth::password::{decoy_hash, verify_password};
use crate::auth::rate_limit::{client_key, AuthRateLimiter};
use crate::auth::token_generator::{generate_csrf_token, generate_session_id};
use crate::config::Settings;
use crate::error::{AppError, AuthFailure};
use crate::metrics::{
    LOGIN_FAILED, LOGIN_RATE_LIMITED, LOGIN_SUCCEEDED, SESSION_CREATED, SESSION_EXPIRED_SWEPT,
    SESSION_ROTATED,
};
use crate::storage::{SessionStore, StorageError, UserStore};

/// Longest accepted username, in bytes
pub const MAX_USERNAME_LENGTH: usize = 255;

/// Longest accepted password, in bytes
pub const MAX_PASSWORD_LENGTH: usize = 1024;

/// The session a request ends up with
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub session: Session,
    /// CSRF token of the session this one replaced on this request
    pub previous_csrf_token: Option<String>,
    /// Set when the client does not yet hold this id and needs a cookie
    pub changed: bool,
}

impl ResolvedSession {
    fn unchanged(session: Session) -> Self {
        Self {
            session,
            previous_csrf_token: None,
            changed: false,
        }
    }

    fn issued(session: Session) -> Self {
        Self {
            session,
            previous_csrf_token: None,
            changed: true,
        }
    }

    pub fn current_csrf_token(&self) -> &str {
        &self.session.csrf_token
    }

    /// Only present on the request during which rotation happened
    pub fn previous_csrf_token(&self) -> Option<&str> {
        self.previous_csrf_token.as_deref()
    }
}

/// Username and password as submitted
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(AppError::MissingCredentials);
        }
        if self.username.len() > MAX_USERNAME_LENGTH || self.password.len() > MAX_PASSWORD_LENGTH {
            return Err(AppError::CredentialsTooLong);
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything a login needs from the request
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Session id from the request's cookie, if any
    pub session_id: Option<String>,
    /// Best-effort client network id, see [`crate::auth::rate_limit::client_address`]
    pub client_addr: String,
    pub credentials: Credentials,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: ResolvedSession,
    pub user: User,
}

/// Session manager
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    rate_limiter: AuthRateLimiter,
    duration: Duration,
    rotation_interval: Duration,
    /// Verified against when the username does not exist
    decoy_hash: Arc<str>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        rate_limiter: AuthRateLimiter,
        settings: &Settings,
    ) -> Result<Self, AppError> {
        let duration = Duration::from_std(settings.session.duration())
            .map_err(|e| AppError::Internal(format!("session duration: {e}")))?;
        let rotation_interval = Duration::from_std(settings.session.rotation_interval())
            .map_err(|e| AppError::Internal(format!("rotation interval: {e}")))?;
        let decoy_hash = decoy_hash(settings.password)?;

        Ok(Self {
            store,
            users,
            rate_limiter,
            duration,
            rotation_interval,
            decoy_hash: decoy_hash.into(),
        })
    }

    pub fn rate_limiter(&self) -> &AuthRateLimiter {
        &self.rate_limiter
    }

    /// Resolve the session named by the request's cookie, creating an
    /// anonymous one when there is none or it is unknown or expired.
    pub async fn get_or_create(
        &self,
        session_id: Option<&str>,
    ) -> Result<ResolvedSession, AppError> {
        self.get_or_create_at(session_id, Utc::now()).await
    }

    pub async fn get_or_create_at(
        &self,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ResolvedSession, AppError> {
        let existing = match session_id {
            Some(id) => self.store.get(id).await?,
            None => None,
        };

        match existing {
            Some(session) if !session.is_expired_at(now) => {
                if session.is_anonymous() {
                    Ok(ResolvedSession::unchanged(session))
                } else {
                    self.rotate_at(session, now).await
                }
            },
            _ => {
                let session = self.create_session(None, now).await?;
                Ok(ResolvedSession::issued(session))
            },
        }
    }

    /// Rotate an authenticated session once it is older than the rotation
    /// interval. Anonymous and fresh sessions come back unchanged.
    pub async fn rotate_if_needed(&self, session_id: &str) -> Result<ResolvedSession, AppError> {
        self.rotate_if_needed_at(session_id, Utc::now()).await
    }

    pub async fn rotate_if_needed_at(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ResolvedSession, AppError> {
        let session = self
            .store
            .get(session_id)
            .await?
            .filter(|s| !s.is_expired_at(now))
            .ok_or(AppError::ExpiredSession)?;
        self.rotate_at(session, now).await
    }

    async fn rotate_at(
        &self,
        current: Session,
        now: DateTime<Utc>,
    ) -> Result<ResolvedSession, AppError> {
        if current.is_anonymous() || now - current.created_at <= self.rotation_interval {
            return Ok(ResolvedSession::unchanged(current));
        }

        let rotated = self.new_session(current.user_id, now);
        self.store.replace(&current.id, &rotated).await?;

        counter!(SESSION_ROTATED).increment(1);
        debug!(user_id = ?rotated.user_id, "rotated session");

        Ok(ResolvedSession {
            session: rotated,
            previous_csrf_token: Some(current.csrf_token),
            changed: true,
        })
    }

    /// Authenticate and bind a new session to the user.
    ///
    /// Blocked keys are rejected before any lookup. Otherwise the password is
    /// always verified, against the decoy hash when the user does not exist,
    /// so timing does not reveal which usernames are valid.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, AppError> {
        let LoginRequest {
            session_id,
            client_addr,
            credentials,
        } = request;
        credentials.validate()?;

        let key = client_key(&client_addr, &credentials.username);
        if self.rate_limiter.is_blocked(&key) {
            counter!(LOGIN_RATE_LIMITED).increment(1);
            warn!(client = %client_addr, "login rejected: rate limited");
            return Err(AppError::RateLimited);
        }

        let lookup = self.users.find_by_username(&credentials.username).await;
        let hash = match &lookup {
            Ok(Some(user)) => user.hashed_password.clone(),
            _ => self.decoy_hash.to_string(),
        };

        let password = credentials.password.clone();
        let verification = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))?;

        // Every attempt that got past the block check counts, store errors too
        let lookup = match lookup {
            Ok(lookup) => lookup,
            Err(e) => {
                self.rate_limiter.record_attempt(&key, false);
                counter!(LOGIN_FAILED).increment(1);
                error!(client = %client_addr, error = %e, "user lookup failed during login");
                return Err(e.into());
            },
        };
        let outcome = match lookup {
            None => Err(AuthFailure::UnknownUser),
            Some(user) => match verification {
                Ok(true) => Ok(user),
                Ok(false) => Err(AuthFailure::WrongPassword),
                Err(e) => {
                    error!(user_id = user.id, error = %e, "stored password hash is unusable");
                    Err(AuthFailure::BadStoredHash)
                },
            },
        };

        let user = match outcome {
            Ok(user) => user,
            Err(reason) => {
                self.rate_limiter.record_attempt(&key, false);
                counter!(LOGIN_FAILED).increment(1);
                warn!(client = %client_addr, %reason, "login failed");
                return Err(AppError::InvalidCredentials(reason));
            },
        };
        self.rate_limiter.record_attempt(&key, true);

        if let Some(id) = session_id.as_deref() {
            self.store.delete(id).await?;
        }
        let session = self.create_session(Some(user.id), Utc::now()).await?;

        counter!(LOGIN_SUCCEEDED).increment(1);
        info!(user_id = user.id, "user logged in");

        Ok(LoginOutcome {
            session: ResolvedSession::issued(session),
            user,
        })
    }

    /// Drop the current session, if any, and hand out a fresh anonymous one
    pub async fn logout(&self, session_id: Option<&str>) -> Result<ResolvedSession, AppError> {
        if let Some(id) = session_id {
            self.store.delete(id).await?;
        }
        let session = self.create_session(None, Utc::now()).await?;
        Ok(ResolvedSession::issued(session))
    }

    /// The user a session is bound to
    pub async fn user_for(&self, session: &Session) -> Result<Option<User>, AppError> {
        match session.user_id {
            Some(id) => Ok(self.users.find_by_id(id).await?),
            None => Ok(None),
        }
    }

    /// Delete every session that expired before now
    pub async fn sweep_expired(&self) -> Result<usize, StorageError> {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let removed = self.store.delete_expired(now).await?;
        if removed > 0 {
            counter!(SESSION_EXPIRED_SWEPT).increment(removed as u64);
        }
        Ok(removed)
    }

    /// Periodic expiry sweep, stopped by `shutdown`. Failures are logged and
    /// the loop keeps going.
    pub async fn run_cleanup(self, interval: std::time::Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("session sweep stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.sweep_expired().await {
                        Ok(removed) => debug!(removed, "swept expired sessions"),
                        Err(e) => error!(error = %e, "session sweep failed"),
                    }
                }
            }
        }
    }

    fn new_session(
        &self,
        user_id: Option<foundation_common::UserId>,
        now: DateTime<Utc>,
    ) -> Session {
        Session {
            id: generate_session_id(),
            user_id,
            created_at: now,
            expires_at: now + self.duration,
            csrf_token: generate_csrf_token(),
        }
    }

    async fn create_session(
        &self,
        user_id: Option<foundation_common::UserId>,
        now: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        let session = self.new_session(user_id, now);
        self.store.insert(&session).await?;
        counter!(SESSION_CREATED).increment(1);
        Ok(session)
    }
}
