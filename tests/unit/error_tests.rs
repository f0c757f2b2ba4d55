// =========================
// tests/unit/error_tests.rs
// =========================
//! Unit tests for the error module
use axum::http::StatusCode;
use axum::response::IntoResponse;
use foundation_backend_lib::error::{AppError, AuthFailure};
use foundation_backend_lib::storage::StorageError;
use foundation_tests::test_utils::json_body;
use std::io::{Error as IoError, ErrorKind};

#[test]
fn test_app_error_status_codes() {
    let cases = [
        (AppError::MissingCredentials, StatusCode::BAD_REQUEST),
        (AppError::CredentialsTooLong, StatusCode::BAD_REQUEST),
        (AppError::InvalidTopic, StatusCode::BAD_REQUEST),
        (AppError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
        (AppError::InvalidCredentials(AuthFailure::WrongPassword), StatusCode::UNAUTHORIZED),
        (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
        (AppError::ExpiredSession, StatusCode::UNAUTHORIZED),
        (AppError::MissingCsrfToken, StatusCode::FORBIDDEN),
        (AppError::InvalidCsrfToken, StatusCode::FORBIDDEN),
        (AppError::NoSession, StatusCode::FORBIDDEN),
        (AppError::Internal("test".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        (
            AppError::Io(IoError::new(ErrorKind::NotFound, "File not found")),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];
    for (error, status) in cases {
        assert_eq!(error.status_code(), status, "{error}");
    }
}

#[test]
fn test_csrf_errors_differ_from_auth_errors() {
    assert_ne!(
        AppError::InvalidCsrfToken.status_code(),
        AppError::InvalidCredentials(AuthFailure::WrongPassword).status_code()
    );
    assert_ne!(AppError::MissingCsrfToken.error_code(), AppError::InvalidCsrfToken.error_code());
}

#[test]
fn test_combined_storage_error_mentions_both() {
    let error = StorageError::Combined {
        primary: Box::new(StorageError::Unavailable("delete old".to_string())),
        compensation: Box::new(StorageError::Unavailable("delete new".to_string())),
    };
    let message = error.to_string();
    assert!(message.contains("delete old"));
    assert!(message.contains("delete new"));
}

#[tokio::test]
async fn test_response_body_shape() {
    let response = AppError::RateLimited.into_response();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "AUTH_003");
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn test_credential_failure_body_hides_reason() {
    for reason in [
        AuthFailure::UnknownUser,
        AuthFailure::WrongPassword,
        AuthFailure::BadStoredHash,
    ] {
        let body = json_body(AppError::InvalidCredentials(reason).into_response()).await;
        assert_eq!(body["error"]["message"], "Invalid username or password");
    }
}
