// ============================
// crates/backend-lib/src/auth/csrf.rs
// ============================
//! CSRF checks for state-changing requests.
use axum::http::{HeaderMap, Method};
use foundation_common::CSRF_HEADER;
use subtle::ConstantTimeEq;

use crate::error::AppError;

/// POST, PUT, PATCH and DELETE must carry a valid token
pub fn requires_csrf_protection(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Token supplied in the request header, if any
pub fn csrf_token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Check `supplied` against the session's current token, or against the
/// token it had before a rotation that happened on this very request.
pub fn verify_csrf_token(
    supplied: Option<&str>,
    current: &str,
    previous: Option<&str>,
) -> Result<(), AppError> {
    let supplied = supplied.ok_or(AppError::MissingCsrfToken)?;
    if current.is_empty() {
        return Err(AppError::NoSession);
    }

    // Evaluate both comparisons so timing does not reveal which one matched
    let matches_current = constant_time_eq(supplied, current);
    let matches_previous = previous
        .filter(|p| !p.is_empty())
        .is_some_and(|p| constant_time_eq(supplied, p));

    if matches_current | matches_previous {
        Ok(())
    } else {
        Err(AppError::InvalidCsrfToken)
    }
}

/// Byte-wise comparison whose running time depends only on the lengths
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
