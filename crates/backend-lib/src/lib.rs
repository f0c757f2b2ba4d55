// ============================
// foundation-backend-lib/src/lib.rs
// ============================
//! Core of the `Foundation` admin backend: sessions with rotation and CSRF
//! binding, login rate limiting, and topic broadcasts for live pages.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod storage;

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthRateLimiter, SessionManager};
use crate::broadcast::Broadcaster;
use crate::config::Settings;
use crate::error::AppError;
use crate::storage::{SessionStore, UserStore};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Session manager
    pub sessions: SessionManager,
    /// Topic notifications for streaming clients
    pub broadcaster: Broadcaster,
    /// Settings the server was started with
    pub settings: Arc<Settings>,
    /// Cancelled on shutdown; stops sweeps and open streams
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new application state over one storage backend
    pub fn new<S>(storage: Arc<S>, settings: Settings) -> Result<Self, AppError>
    where
        S: SessionStore + UserStore + 'static,
    {
        let session_store: Arc<dyn SessionStore> = storage.clone();
        let user_store: Arc<dyn UserStore> = storage;
        let rate_limiter = AuthRateLimiter::from_settings(&settings.rate_limit);
        let sessions = SessionManager::new(session_store, user_store, rate_limiter, &settings)?;

        Ok(Self {
            sessions,
            broadcaster: Broadcaster::new(),
            settings: Arc::new(settings),
            shutdown: CancellationToken::new(),
        })
    }

    /// Start the rate limit and session sweeps; both stop when `shutdown`
    /// is cancelled.
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let rate_limit_sweep = self.sessions.rate_limiter().clone().run_cleanup(
            self.settings.rate_limit.cleanup_interval(),
            self.shutdown.clone(),
        );
        let session_sweep = self.sessions.clone().run_cleanup(
            self.settings.session.cleanup_interval(),
            self.shutdown.clone(),
        );

        vec![tokio::spawn(rate_limit_sweep), tokio::spawn(session_sweep)]
    }
}
