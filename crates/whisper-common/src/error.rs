//! Centralized error type for the Whisper2 relay.
//!
//! Uses `thiserror` for ergonomic definitions and maps every variant to the
//! wire-level error code and HTTP status the protocol promises. The same
//! enum backs both surfaces: HTTP responses and gateway `error` frames.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Core application error used across all relay crates.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    // === Auth errors ===
    #[error("Identity is not registered")]
    NotRegistered,

    #[error("Authentication failed")]
    AuthFailed,

    #[error("Identity is banned")]
    UserBanned,

    // === Validation errors ===
    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    #[error("Timestamp outside the accepted window")]
    InvalidTimestamp,

    // === Authorization ===
    #[error("Forbidden")]
    Forbidden,

    #[error("{resource} not found")]
    NotFound { resource: String },

    // === Rate limiting ===
    #[error("Rate limited. Retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    // === Infrastructure errors ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    /// Shorthand for a shape/content validation failure.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidPayload { message: message.into() }
    }

    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotRegistered | Self::AuthFailed => StatusCode::UNAUTHORIZED,
            Self::UserBanned | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidPayload { .. } | Self::InvalidTimestamp => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Database(_) | Self::Redis(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Protocol error code, shared by HTTP bodies and gateway `error` frames.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotRegistered => "NOT_REGISTERED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::UserBanned => "USER_BANNED",
            Self::InvalidPayload { .. } => "INVALID_PAYLOAD",
            Self::InvalidTimestamp => "INVALID_TIMESTAMP",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Database(_) | Self::Redis(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-facing message. Internal details are logged, never returned.
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(e) => {
                tracing::error!("Database error: {e}");
                "An internal error occurred".to_string()
            }
            Self::Redis(e) => {
                tracing::error!("Redis error: {e}");
                "An internal error occurred".to_string()
            }
            Self::Internal(e) => {
                tracing::error!("Internal error: {e}");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// JSON error response body sent on the HTTP surface.
#[derive(Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.error_code().to_string(),
            message: self.public_message(),
            retry_after_ms: self.retry_after_ms(),
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Convenience alias for Results using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;
