//! API error types with JSON responses.
//!
//! Every failure a caller can recover from maps to one kind with its own
//! status code, so the client can pick the matching recovery action.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use nbrepo_core::{Username, ValueError};
use nbrepo_store::StoreError;
use serde::Serialize;

use crate::workspace::WorkspaceError;

/// API error that can be returned from handlers and coordination operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad input (400). `users` names the invitees that failed validation.
    #[error("{message}")]
    Validation {
        message: String,
        users: Vec<Username>,
    },

    /// Unauthorized (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Not found (404): stale id or path, refresh and re-render.
    #[error("not found: {0}")]
    NotFound(String),

    /// Conflict (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Downstream workspace or storage collaborator failed (503).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            users: Vec::new(),
        }
    }

    /// Get the error code string for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValueError> for ApiError {
    fn from(e: ValueError) -> Self {
        Self::validation(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PublicationNotFound(_)
            | StoreError::ShareNotFound(_)
            | StoreError::InviteNotFound(_)
            | StoreError::TagNotFound(_) => Self::NotFound(e.to_string()),
            StoreError::DuplicatePublication { .. } => Self::Conflict(e.to_string()),
            StoreError::EmptyCollaborators => Self::validation(e.to_string()),
            StoreError::Connection(_) => {
                tracing::error!(error = %e, "Store unavailable");
                Self::Unavailable("storage is unavailable".to_string())
            }
            other => {
                tracing::error!(error = %other, "Store failure");
                Self::Internal(other.to_string())
            }
        }
    }
}

impl From<WorkspaceError> for ApiError {
    fn from(e: WorkspaceError) -> Self {
        match e {
            WorkspaceError::InvalidDestination(_) => Self::validation(e.to_string()),
            other => {
                tracing::warn!(error = %other, "Workspace operation failed");
                Self::Unavailable(other.to_string())
            }
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: &'static str,
    /// Invitees that failed validation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<Username>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();
        let users = match self {
            Self::Validation { users, .. } => users,
            _ => Vec::new(),
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code,
                users,
            }),
        )
            .into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
