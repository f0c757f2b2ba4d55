// ============================
// crates/backend-lib/src/auth/cookie.rs
// ============================
//! The session cookie on the wire.
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use chrono::{DateTime, Utc};
use foundation_common::{Session, SESSION_COOKIE_NAME};

/// `HttpOnly`, `SameSite=Lax` cookie for `session`, expiring with it
pub fn session_cookie(session: &Session, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    session_cookie_at(session, secure, Utc::now())
}

pub fn session_cookie_at(
    session: &Session,
    secure: bool,
    now: DateTime<Utc>,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = (session.expires_at - now).num_seconds().max(0);
    let expires = session.expires_at.format("%a, %d %b %Y %H:%M:%S GMT");
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax; \
         Expires={expires}; Max-Age={max_age}",
        session.id
    );
    // Only mark cookies secure when served over HTTPS
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Session id from the request's `Cookie` header(s), if any
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == SESSION_COOKIE_NAME)
                .then(|| val.trim().to_string())
                .filter(|v| !v.is_empty())
        })
}
