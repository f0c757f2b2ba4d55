// ============================
// crates/backend-lib/src/router.rs
// ============================
/** HTTP router for the `Foundation` admin backend.
Every `/admin` route runs behind the session layer, so handlers always see
a resolved session and state-changing requests have passed the CSRF check. */
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{login, logout, session_info, stream_topic, touch_topic};
use crate::middleware::session_layer;
use crate::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin/session", get(session_info))
        .route("/admin/login", post(login))
        .route("/admin/logout", post(logout))
        .route("/admin/stream/{topic}", get(stream_topic))
        .route("/admin/topics/{topic}/touch", post(touch_topic))
        .layer(middleware::from_fn_with_state(state.clone(), session_layer));

    Router::new()
        .route("/health", get(health_handler))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "Healthy"
}
