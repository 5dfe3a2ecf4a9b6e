//! Error types for the bridge
//!
//! Errors fall into three classes: configuration errors (nothing was routed),
//! transport errors (the backend or the network failed mid-generation) and
//! cancellation, which is a normal terminal outcome rather than a failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session {session_id} already has a generation in flight for {provider}")]
    SessionBusy { session_id: String, provider: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code shared by HTTP bodies and channel error frames
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::SessionBusy { .. } => "SESSION_BUSY",
            AppError::Authentication(_) => "AUTHENTICATION_ERROR",
            AppError::Transport(_) | AppError::HttpError(_) => "TRANSPORT_ERROR",
            AppError::Upstream { .. } => "UPSTREAM_ERROR",
            AppError::Cancelled => "CANCELLED",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::JsonError(_) => "INVALID_JSON",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this is the cancellation outcome rather than a real failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }


    fn status(&self) -> StatusCode {
        match self {
            AppError::Configuration(_) | AppError::BadRequest(_) | AppError::JsonError(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::SessionBusy { .. } => StatusCode::CONFLICT,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Transport(_) | AppError::Upstream { .. } | AppError::HttpError(_) => {
                StatusCode::BAD_GATEWAY
            }
            // Client closed request
            AppError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller
    pub fn public_message(&self) -> String {
        match self {
            AppError::HttpError(_) => "Upstream service error".to_string(),
            AppError::JsonError(_) => "Invalid JSON in request".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.public_message(),
            },
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
