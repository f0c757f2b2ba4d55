// ==============================
// tests/unit/rate_limit_tests.rs
// ==============================
//! This test suite is designed to validate the functionality of the `AuthRateLimiter`
use foundation_backend_lib::auth::rate_limit::{
    AuthRateLimiter, DEFAULT_BLOCK_DURATION, DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW,
};
use std::time::{Duration, Instant};

const KEY: &str = "192.0.2.1:admin";

#[test]
fn test_unknown_key_is_not_blocked() {
    let rate_limiter = AuthRateLimiter::default();
    assert!(!rate_limiter.is_blocked(KEY));
    // Checking never creates an entry
    assert!(rate_limiter.is_empty());
}

#[test]
fn test_five_failures_block_immediately() {
    let rate_limiter = AuthRateLimiter::default();
    let now = Instant::now();

    for i in 1..DEFAULT_MAX_ATTEMPTS {
        rate_limiter.record_attempt_at(KEY, false, now);
        assert!(!rate_limiter.is_blocked_at(KEY, now), "blocked after {i}");
    }
    rate_limiter.record_attempt_at(KEY, false, now);
    assert!(rate_limiter.is_blocked_at(KEY, now));
    assert!(rate_limiter.is_blocked_at(KEY, now + DEFAULT_BLOCK_DURATION - Duration::from_secs(1)));
    assert!(!rate_limiter.is_blocked_at(KEY, now + DEFAULT_BLOCK_DURATION));
}

#[test]
fn test_success_always_resets() {
    let rate_limiter = AuthRateLimiter::default();
    let now = Instant::now();

    for _ in 0..DEFAULT_MAX_ATTEMPTS {
        rate_limiter.record_attempt_at(KEY, false, now);
    }
    assert!(rate_limiter.is_blocked_at(KEY, now));

    // Even mid-block, a recorded success clears both counters
    rate_limiter.record_attempt_at(KEY, true, now + Duration::from_secs(1));
    assert!(!rate_limiter.is_blocked_at(KEY, now + Duration::from_secs(1)));
    assert_eq!(rate_limiter.attempts(KEY), 0);
}

#[test]
fn test_window_expiry_restarts_count_at_one() {
    let rate_limiter = AuthRateLimiter::default();
    let now = Instant::now();

    for _ in 0..DEFAULT_MAX_ATTEMPTS - 1 {
        rate_limiter.record_attempt_at(KEY, false, now);
    }
    let later = now + DEFAULT_WINDOW + Duration::from_millis(1);
    rate_limiter.record_attempt_at(KEY, false, later);

    assert_eq!(rate_limiter.attempts(KEY), 1);
    assert!(!rate_limiter.is_blocked_at(KEY, later));
}

#[test]
fn test_failures_inside_window_accumulate() {
    let rate_limiter = AuthRateLimiter::default();
    let now = Instant::now();

    // Each attempt lands within the window of the previous one
    for i in 0..DEFAULT_MAX_ATTEMPTS {
        rate_limiter.record_attempt_at(KEY, false, now + DEFAULT_WINDOW * i / 2);
    }
    assert_eq!(rate_limiter.attempts(KEY), DEFAULT_MAX_ATTEMPTS);
}

#[test]
fn test_keys_are_independent() {
    let rate_limiter = AuthRateLimiter::default();
    for _ in 0..DEFAULT_MAX_ATTEMPTS {
        rate_limiter.record_attempt("192.0.2.1:admin", false);
    }
    assert!(rate_limiter.is_blocked("192.0.2.1:admin"));
    assert!(!rate_limiter.is_blocked("192.0.2.1:other"));
    assert!(!rate_limiter.is_blocked("192.0.2.2:admin"));
}

#[test]
fn test_custom_limits() {
    let rate_limiter = AuthRateLimiter::new(2, Duration::from_secs(10), Duration::from_secs(30));
    let now = Instant::now();
    rate_limiter.record_attempt_at(KEY, false, now);
    rate_limiter.record_attempt_at(KEY, false, now);
    assert!(rate_limiter.is_blocked_at(KEY, now + Duration::from_secs(29)));
    assert!(!rate_limiter.is_blocked_at(KEY, now + Duration::from_secs(30)));
}

#[test]
fn test_concurrent_failures_are_all_counted() {
    let rate_limiter = AuthRateLimiter::new(1000, Duration::from_secs(60), Duration::from_secs(60));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let rate_limiter = rate_limiter.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    rate_limiter.record_attempt(KEY, false);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(rate_limiter.attempts(KEY), 400);
}
