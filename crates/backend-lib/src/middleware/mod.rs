// crates/backend-lib/src/middleware/mod.rs

//! Middleware for the `Foundation` admin backend.

pub mod session;

pub use session::{session_layer, CurrentUser, RequestSession, SessionUpdate, CSRF_RESPONSE_HEADER};
