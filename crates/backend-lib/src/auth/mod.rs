// ============================
// foundation-backend-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod cookie;
pub mod csrf;
pub mod password;
pub mod rate_limit;
pub mod session;
pub mod token_generator;

pub use cookie::{session_cookie, session_id_from_headers};
pub use csrf::{requires_csrf_protection, verify_csrf_token};
pub use password::{
    hash_password, hash_password_with, verify_password, PasswordError, PasswordParams,
};
pub use rate_limit::{client_address, client_key, AuthRateLimiter};
pub use session::{Credentials, LoginOutcome, LoginRequest, ResolvedSession, SessionManager};
