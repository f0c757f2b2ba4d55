// crates/backend-lib/src/handlers/mod.rs

//! HTTP handlers.

pub mod auth;
pub mod live;

pub use auth::{login, logout, session_info, LoginForm, SessionInfo};
pub use live::{stream_topic, topic_events, touch_topic};
