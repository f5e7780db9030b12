//! HTTP error type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use engine::EngineError;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Http { status, .. } => *status,
            ApiError::Engine(err) => match err {
                EngineError::UnknownItem(_)
                | EngineError::UnknownGlobalAction(_)
                | EngineError::NoMatchingTrigger(_) => StatusCode::NOT_FOUND,
                EngineError::NotInteractive(_) | EngineError::Unavailable(_) => {
                    StatusCode::CONFLICT
                }
                EngineError::NotAuthorised(_) => StatusCode::FORBIDDEN,
                EngineError::FieldNotEditable(_) => StatusCode::UNPROCESSABLE_ENTITY,
                EngineError::UnknownStatus(_) | EngineError::WorkflowMismatch { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let visible = match &self {
            ApiError::Engine(err) => err.is_user_visible(),
            ApiError::Http { .. } => true,
            ApiError::Store(_) => false,
        };
        let message = if visible {
            self.to_string()
        } else {
            error!(error = %self, "request failed");
            "internal error".to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
