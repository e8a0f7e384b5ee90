use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::db::StoreError;
use crate::ingestion::error::{ErrorKind, IngestError};
use crate::sanitize::{is_safe_message, sanitize_message};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ingestion error: {source}")]
    Ingest {
        request_id: Uuid,
        #[source]
        source: IngestError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn ingest(request_id: Uuid, source: IngestError) -> Self {
        AppError::Ingest { request_id, source }
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                ErrorKind::NotFound.code(),
                ErrorKind::NotFound.user_message().to_string(),
            ),
            AppError::Validation(msg) => {
                let message = if is_safe_message(msg) {
                    msg.clone()
                } else {
                    ErrorKind::Validation.user_message().to_string()
                };
                (StatusCode::BAD_REQUEST, ErrorKind::Validation.code(), message)
            }
            AppError::Ingest { source, .. } => {
                let kind = source.kind();
                (kind.status_code(), kind.code(), source.user_message())
            }
            AppError::Store(StoreError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                ErrorKind::NotFound.code(),
                ErrorKind::NotFound.user_message().to_string(),
            ),
            AppError::Store(e) => {
                tracing::error!("Store error: {}", sanitize_message(&e.to_string()));
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorKind::Persistence.code(),
                    ErrorKind::Persistence.user_message().to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", sanitize_message(&format!("{e:?}")));
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorKind::Internal.code(),
                    ErrorKind::Internal.user_message().to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let request_id = match &self {
            AppError::Ingest { request_id, .. } => *request_id,
            _ => Uuid::new_v4(),
        };

        let body = Json(json!({
            "error": message,
            "code": code,
            "request_id": request_id,
            "timestamp": Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}
