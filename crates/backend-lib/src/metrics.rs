// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const SESSION_CREATED: &str = "session.created";
pub const SESSION_ROTATED: &str = "session.rotated";
pub const SESSION_EXPIRED_SWEPT: &str = "session.expired_swept";
pub const LOGIN_SUCCEEDED: &str = "login.succeeded";
pub const LOGIN_FAILED: &str = "login.failed";
pub const LOGIN_RATE_LIMITED: &str = "login.rate_limited";
pub const RATE_LIMIT_SWEPT: &str = "rate_limit.swept";
pub const CSRF_REJECTED: &str = "csrf.rejected";
pub const BROADCAST_SENT: &str = "broadcast.sent";
pub const BROADCAST_MISSED: &str = "broadcast.missed";
pub const STREAM_ACTIVE: &str = "stream.active";
