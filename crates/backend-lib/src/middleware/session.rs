// crates/backend-lib/src/middleware/session.rs

//! Per-request session resolution and CSRF enforcement.
use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header::SET_COOKIE, request::Parts, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use foundation_common::{Session, User};
use metrics::counter;
use std::net::SocketAddr;
use tracing::{error, warn};

use crate::auth::cookie::{session_cookie, session_id_from_headers};
use crate::auth::csrf::{csrf_token_from_headers, requires_csrf_protection, verify_csrf_token};
use crate::auth::rate_limit::client_address;
use crate::auth::ResolvedSession;
use crate::error::AppError;
use crate::metrics::CSRF_REJECTED;
use crate::AppState;

/// Response header carrying the current CSRF token
pub const CSRF_RESPONSE_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");

/// Session state the middleware attaches to every request
#[derive(Debug, Clone)]
pub struct RequestSession {
    pub session: ResolvedSession,
    /// The session's user, loaded once per request
    pub user: Option<User>,
    /// Best-effort client network id for rate limiting
    pub client_addr: String,
}

/// Returned in response extensions by handlers that replace the session
#[derive(Debug, Clone)]
pub struct SessionUpdate(pub Session);

/// The logged-in user; rejects anonymous requests
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for RequestSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestSession>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer not installed".to_string()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = RequestSession::from_request_parts(parts, state).await?;
        session.user.map(CurrentUser).ok_or(AppError::Unauthorized)
    }
}

/// Resolve (and maybe rotate) the session, check CSRF on state-changing
/// methods, then send the cookie and token back with the response.
pub async fn session_layer(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let cookie = session_id_from_headers(request.headers());
    let resolved = state.sessions.get_or_create(cookie.as_deref()).await?;
    let secure = state.settings.secure_cookies;

    if requires_csrf_protection(request.method()) {
        let supplied = csrf_token_from_headers(request.headers());
        if let Err(e) = verify_csrf_token(
            supplied,
            resolved.current_csrf_token(),
            resolved.previous_csrf_token(),
        ) {
            counter!(CSRF_REJECTED).increment(1);
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                error = %e,
                "CSRF check failed"
            );
            // The client still needs the (possibly new) session to retry with
            let mut response = e.into_response();
            apply_session_headers(&mut response, &resolved.session, resolved.changed, secure);
            return Ok(response);
        }
    }

    let user = state.sessions.user_for(&resolved.session).await?;
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_addr = client_address(request.headers(), peer);

    request.extensions_mut().insert(RequestSession {
        session: resolved.clone(),
        user,
        client_addr,
    });

    let mut response = next.run(request).await;

    match response.extensions_mut().remove::<SessionUpdate>() {
        Some(SessionUpdate(session)) => {
            apply_session_headers(&mut response, &session, true, secure)
        },
        None => {
            apply_session_headers(&mut response, &resolved.session, resolved.changed, secure)
        },
    }

    Ok(response)
}

fn apply_session_headers(
    response: &mut Response,
    session: &Session,
    set_cookie: bool,
    secure: bool,
) {
    let headers = response.headers_mut();

    if set_cookie {
        match session_cookie(session, secure) {
            Ok(cookie) => {
                headers.append(SET_COOKIE, cookie);
            },
            Err(e) => error!(error = %e, "failed to encode session cookie"),
        }
    }

    match HeaderValue::from_str(&session.csrf_token) {
        Ok(token) => {
            headers.insert(CSRF_RESPONSE_HEADER, token);
        },
        Err(e) => error!(error = %e, "failed to encode CSRF header"),
    }
}
