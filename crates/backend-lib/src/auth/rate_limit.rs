// ============================
// crates/backend-lib/src/auth/rate_limit.rs
// ============================
//! Rate limiting for login attempts.
//!
//! Entries are keyed by `<client network id>:<username>`. The network id
//! comes from client-supplied headers when present, so the key can be spoofed;
//! this deters casual brute force, not an attacker who controls headers.

use axum::http::HeaderMap;
use dashmap::DashMap;
use metrics::counter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RateLimitSettings;
use crate::metrics::RATE_LIMIT_SWEPT;

/// Default number of failed attempts before blocking
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default sliding window for counting failures
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Default block duration (15 minutes)
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(15 * 60);

/// Default interval between sweeps of stale entries
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Entry in the rate limit map
#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    /// Consecutive failures since the last reset
    attempts: u32,
    /// Time of the most recent attempt, success or failure
    last_attempt: Instant,
    /// While `now < blocked_until` every attempt is rejected
    blocked_until: Option<Instant>,
}

impl RateLimitEntry {
    fn is_blocked_at(&self, now: Instant) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }
}

/// Rate limiter for authentication attempts
#[derive(Debug, Clone)]
pub struct AuthRateLimiter {
    /// Map of client keys to rate limit entries
    entries: Arc<DashMap<String, RateLimitEntry>>,
    /// Failures within the window before a block is set
    max_attempts: u32,
    /// How long failures stay relevant
    window: Duration,
    /// Length of a block once triggered
    block_duration: Duration,
}

impl Default for AuthRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW, DEFAULT_BLOCK_DURATION)
    }
}

impl AuthRateLimiter {
    /// Create a new auth rate limiter
    pub fn new(max_attempts: u32, window: Duration, block_duration: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_attempts,
            window,
            block_duration,
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_secs(settings.window_secs),
            Duration::from_secs(settings.block_secs),
        )
    }

    /// Check whether `key` is currently blocked
    pub fn is_blocked(&self, key: &str) -> bool {
        self.is_blocked_at(key, Instant::now())
    }

    pub fn is_blocked_at(&self, key: &str, now: Instant) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.is_blocked_at(now))
    }

    /// Record the outcome of a credential check for `key`
    pub fn record_attempt(&self, key: &str, success: bool) {
        self.record_attempt_at(key, success, Instant::now());
    }

    pub fn record_attempt_at(&self, key: &str, success: bool, now: Instant) {
        let mut entry = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| RateLimitEntry {
                attempts: 0,
                last_attempt: now,
                blocked_until: None,
            });

        // Outside the window the old failures no longer count
        if now.saturating_duration_since(entry.last_attempt) > self.window {
            entry.attempts = 0;
            entry.blocked_until = None;
        }

        entry.last_attempt = now;

        if success {
            entry.attempts = 0;
            entry.blocked_until = None;
            return;
        }

        entry.attempts += 1;
        if entry.attempts >= self.max_attempts {
            entry.blocked_until = Some(now + self.block_duration);
            warn!(attempts = entry.attempts, "login key blocked after repeated failures");
        }
    }

    /// Failures currently counted against `key`
    pub fn attempts(&self, key: &str) -> u32 {
        self.entries.get(key).map_or(0, |entry| entry.attempts)
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries that are both unblocked and stale. Returns how many went.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            let unblocked = entry.blocked_until.map_or(true, |until| now > until);
            let stale = now.saturating_duration_since(entry.last_attempt) > self.window;
            !(unblocked && stale)
        });
        before.saturating_sub(self.entries.len())
    }

    /// Periodic sweep, stopped by `shutdown`
    pub async fn run_cleanup(self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("rate limit sweep stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let removed = self.sweep();
                    if removed > 0 {
                        counter!(RATE_LIMIT_SWEPT).increment(removed as u64);
                        debug!(removed, remaining = self.len(), "swept rate limit entries");
                    }
                }
            }
        }
    }
}

/// Best-effort network identifier of the client: `X-Forwarded-For`, then
/// `X-Real-IP`, then the peer address.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    };

    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}

/// Rate limit key for a login attempt
pub fn client_key(client_address: &str, username: &str) -> String {
    format!("{client_address}:{username}")
}
