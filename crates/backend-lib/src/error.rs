// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::auth::password::PasswordError;
use crate::storage::StorageError;

/// Why a credential check failed. Only logged; every variant reaches the
/// client as the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    UnknownUser,
    WrongPassword,
    BadStoredHash,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            AuthFailure::UnknownUser => "unknown user",
            AuthFailure::WrongPassword => "wrong password",
            AuthFailure::BadStoredHash => "malformed stored hash",
        };
        f.write_str(reason)
    }
}

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Username and password are required")]
    MissingCredentials,

    #[error("Username or password too long")]
    CredentialsTooLong,

    #[error("Invalid topic name")]
    InvalidTopic,

    #[error("Too many login attempts")]
    RateLimited,

    #[error("Invalid credentials ({0})")]
    InvalidCredentials(AuthFailure),

    #[error("Session expired")]
    ExpiredSession,

    #[error("Missing CSRF token")]
    MissingCsrfToken,

    #[error("Invalid CSRF token")]
    InvalidCsrfToken,

    #[error("No session")]
    NoSession,

    #[error("Login required")]
    Unauthorized,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingCredentials
            | AppError::CredentialsTooLong
            | AppError::InvalidTopic => StatusCode::BAD_REQUEST,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidCredentials(_) | AppError::Unauthorized | AppError::ExpiredSession => {
                StatusCode::UNAUTHORIZED
            },
            AppError::MissingCsrfToken | AppError::InvalidCsrfToken | AppError::NoSession => {
                StatusCode::FORBIDDEN
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::MissingCredentials => "VAL_001",
            AppError::CredentialsTooLong => "VAL_002",
            AppError::InvalidTopic => "VAL_003",
            AppError::RateLimited => "AUTH_003",
            AppError::InvalidCredentials(_) => "AUTH_001",
            AppError::ExpiredSession => "SESSION_001",
            AppError::NoSession => "SESSION_002",
            AppError::Unauthorized => "AUTH_002",
            AppError::MissingCsrfToken => "CSRF_001",
            AppError::InvalidCsrfToken => "CSRF_002",
            AppError::Storage(_) => "STORE_001",
            AppError::Password(_) => "AUTH_004",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
            AppError::Internal(_) => "INT_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::MissingCredentials => "Username and password are required".to_string(),
            AppError::CredentialsTooLong => "Username or password too long".to_string(),
            AppError::InvalidTopic => "Invalid topic name".to_string(),
            AppError::RateLimited => {
                "Too many login attempts, please try again later".to_string()
            },
            AppError::InvalidCredentials(_) => "Invalid username or password".to_string(),
            AppError::ExpiredSession => "Session expired, please log in again".to_string(),
            AppError::Unauthorized => "Login required".to_string(),
            AppError::MissingCsrfToken | AppError::InvalidCsrfToken | AppError::NoSession => {
                "Request forbidden".to_string()
            },
            AppError::Storage(_)
            | AppError::Password(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::Internal(_) => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        if status.is_server_error() {
            tracing::error!(error = %self, code = error_code, "request failed");
        }

        // Use detailed messages in development, sanitized in production.
        // Credential failures stay generic either way.
        let detailed = cfg!(debug_assertions) && !matches!(self, AppError::InvalidCredentials(_));
        let message = if detailed {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}
