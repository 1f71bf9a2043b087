//! Error taxonomy and its mapping onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::task::TaskStatus;

/// Failures of the JSON document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access data file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode or decode data file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the API. Each variant maps to one status code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("cannot move task from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("task was modified concurrently (expected revision {expected}, found {actual})")]
    RevisionMismatch { expected: u64, actual: u64 },

    #[error("Failed to send SMS")]
    Sms(#[source] SmsError),

    #[error("Storage failure")]
    Storage(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Delivery failures of the SMS gateway.
#[derive(Debug, Error)]
pub enum SmsError {
    #[error("SMS delivery is not configured")]
    NotConfigured,
    #[error("SMS gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SMS gateway rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl AppError {
    pub fn task_not_found(id: &str) -> Self {
        Self::NotFound(format!("Task not found: {id}"))
    }

    pub fn user_not_found(id: &str) -> Self {
        Self::NotFound(format!("User not found: {id}"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::InvalidTransition { .. } | Self::RevisionMismatch { .. } => {
                StatusCode::CONFLICT
            }
            Self::Sms(_) | Self::Storage(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<SmsError> for AppError {
    fn from(err: SmsError) -> Self {
        Self::Sms(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match &self {
                Self::Sms(source) => tracing::error!(error = %source, "sms delivery failed"),
                Self::Storage(source) => tracing::error!(error = %source, "storage failed"),
                other => tracing::error!(error = %other, "request failed"),
            }
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
