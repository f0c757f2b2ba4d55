// ============================
// crates/backend-lib/src/handlers/auth.rs
// ============================
//! Session, login and logout endpoints.
use axum::{
    extract::{Form, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::{Credentials, LoginRequest, ResolvedSession};
use crate::error::AppError;
use crate::middleware::{RequestSession, SessionUpdate};
use crate::AppState;

/// Login form fields. Missing fields deserialize as empty so they are
/// reported as missing credentials rather than a form rejection.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// What the page layer needs to know about the caller
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub authenticated: bool,
    pub user_name: Option<String>,
    pub display_name: Option<String>,
    pub csrf_token: String,
}

impl SessionInfo {
    fn new(session: &ResolvedSession, user: Option<&foundation_common::User>) -> Self {
        Self {
            authenticated: user.is_some(),
            user_name: user.map(|u| u.user_name.clone()),
            display_name: user.map(|u| u.display_name.clone()),
            csrf_token: session.current_csrf_token().to_string(),
        }
    }
}

/// `GET /admin/session`
pub async fn session_info(request_session: RequestSession) -> Json<SessionInfo> {
    Json(SessionInfo::new(
        &request_session.session,
        request_session.user.as_ref(),
    ))
}

/// `POST /admin/login`
pub async fn login(
    State(state): State<AppState>,
    request_session: RequestSession,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let request = LoginRequest {
        session_id: Some(request_session.session.session.id.clone()),
        client_addr: request_session.client_addr,
        credentials: Credentials::new(form.username, form.password),
    };
    let outcome = state.sessions.login(request).await?;

    let info = SessionInfo::new(&outcome.session, Some(&outcome.user));
    Ok((Extension(SessionUpdate(outcome.session.session)), Json(info)))
}

/// `POST /admin/logout`
pub async fn logout(
    State(state): State<AppState>,
    request_session: RequestSession,
) -> Result<impl IntoResponse, AppError> {
    let resolved = state
        .sessions
        .logout(Some(&request_session.session.session.id))
        .await?;

    let info = SessionInfo::new(&resolved, None);
    Ok((Extension(SessionUpdate(resolved.session)), Json(info)))
}
