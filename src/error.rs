use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request is missing a field or carries an invalid value.
    #[error("{0}")]
    Validation(String),

    /// Resource already exists (duplicate email, ...).
    #[error("{0}")]
    Conflict(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Credentials did not match. Unknown email and wrong password both end here.
    #[error("Invalid email or password")]
    AuthFailed,

    /// Missing, invalid or expired session token.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// Upload exceeds the configured size cap.
    #[error("File exceeds the maximum size of {max_bytes} bytes")]
    PayloadTooLarge {
        /// Configured cap.
        max_bytes: usize,
    },

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable error kind, sent as `code`.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::AuthFailed => "auth_failed",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::PayloadTooLarge { .. } => "payload_too_large",
            AppError::Io(_) | AppError::Config(_) | AppError::Internal(_) => "internal",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AuthFailed | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Io(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Background task failed: {}", e))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the log.
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request error");
            "Internal server error".to_string()
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
            self.to_string()
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
