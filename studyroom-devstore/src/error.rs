//! API errors and their JSON response bodies.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use studyroom_proto::task::TextError;

/// Any rejection the development store answers with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Missing, malformed, or unknown credentials.
    #[error("authentication credentials were not provided or are invalid")]
    Unauthorized,

    /// Authenticated, but not allowed to touch the resource.
    #[error("{0}")]
    Forbidden(String),

    /// The resource does not exist.
    #[error("{entity} '{identifier}' not found")]
    NotFound {
        entity: &'static str,
        identifier: String,
    },

    /// The request body failed validation.
    #[error("{0}")]
    Validation(String),

    /// The request is well formed but cannot be applied.
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    #[must_use]
    pub fn not_found(entity: &'static str, identifier: impl ToString) -> Self {
        Self::NotFound {
            entity,
            identifier: identifier.to_string(),
        }
    }

    #[must_use]
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest(reason.into())
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> String {
        match self {
            Self::Unauthorized => "NOT_AUTHENTICATED".to_string(),
            Self::Forbidden(_) => "PERMISSION_DENIED".to_string(),
            Self::NotFound { entity, .. } => format!("{}_NOT_FOUND", entity.to_uppercase()),
            Self::Validation(_) => "VALIDATION_ERROR".to_string(),
            Self::BadRequest(_) => "BAD_REQUEST".to_string(),
        }
    }
}

impl From<TextError> for ApiError {
    fn from(e: TextError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = ErrorBody {
            code: self.error_code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
