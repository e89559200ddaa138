use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::store::StoreError;

/// Request-level failure taxonomy. Every variant renders as a JSON body with a
/// stable `error` field and an optional `details` field.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    Upstream {
        message: String,
        details: Option<String>,
    },

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            details: None,
        }
    }
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(message: impl Into<String>, details: Option<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            details,
        }
    }

    pub fn internal(message: impl Into<String>, details: impl ToString) -> Self {
        Self::Internal {
            message: message.into(),
            details: Some(details.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            AppError::Upstream { message, details } | AppError::Internal { message, details } => {
                ErrorResponse {
                    error: message.clone(),
                    details: details.clone(),
                }
            }
            other => ErrorResponse::new(&other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            err @ StoreError::NotFound { .. } => AppError::NotFound(err.to_string()),
            err @ StoreError::DuplicateKey { .. } => AppError::Conflict(err.to_string()),
            StoreError::Codec(e) => AppError::internal("Stored record could not be decoded", e),
            StoreError::Backend(e) => AppError::internal("Record store failure", format!("{:#}", e)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{} ({})", self, status);
        } else {
            log::debug!("request rejected: {} ({})", self, status);
        }
        (status, Json(self.body())).into_response()
    }
}
