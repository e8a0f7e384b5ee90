use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::analysis::AnalysisError;
use crate::db::StoreError;
use crate::extraction::ExtractionError;
use crate::llm_client::LlmError;
use crate::sanitize::is_safe_message;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    Validation(String),

    #[error("subject {0} not found")]
    SubjectNotFound(Uuid),

    #[error("document '{0}' not found")]
    DocumentNotFound(String),

    #[error("subject {0} already has an active ingestion session")]
    SessionActive(Uuid),

    #[error("document download failed: {0}")]
    Download(#[source] StoreError),

    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("persisting results failed: {0}")]
    Persistence(#[source] StoreError),

    #[error("stage '{stage}' timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },
}

/// Closed classification of every failure. Determines HTTP status, the
/// stable error code written to usage metrics, and the user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    SessionActive,
    RateLimited,
    Unavailable,
    Timeout,
    Extraction,
    Provider,
    Persistence,
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::SessionActive => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Extraction
            | ErrorKind::Provider
            | ErrorKind::Persistence
            | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::SessionActive => "session_active",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Unavailable => "service_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Extraction => "extraction_failed",
            ErrorKind::Provider => "provider_error",
            ErrorKind::Persistence => "persistence_error",
            ErrorKind::Internal => "internal_error",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::Validation => "The request is invalid",
            ErrorKind::Unauthorized => "Authentication required",
            ErrorKind::Forbidden => "Access denied",
            ErrorKind::NotFound => "The requested resource was not found",
            ErrorKind::SessionActive => "An ingestion is already running for this subject",
            ErrorKind::RateLimited => "Too many requests, please try again shortly",
            ErrorKind::Unavailable => "A required service is temporarily unavailable",
            ErrorKind::Timeout => "The operation took too long, please try again",
            ErrorKind::Extraction => "We could not read enough text from this document",
            ErrorKind::Provider => "The document could not be analyzed",
            ErrorKind::Persistence => "The results could not be saved",
            ErrorKind::Internal => "An internal server error occurred",
        }
    }
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Validation(_) => ErrorKind::Validation,
            IngestError::SubjectNotFound(_) | IngestError::DocumentNotFound(_) => {
                ErrorKind::NotFound
            }
            IngestError::SessionActive(_) => ErrorKind::SessionActive,
            IngestError::Timeout { .. } => ErrorKind::Timeout,
            IngestError::Download(StoreError::Timeout(_)) => ErrorKind::Timeout,
            IngestError::Download(_) => ErrorKind::Unavailable,
            IngestError::Extraction(ExtractionError::Vision(e)) => {
                llm_kind(e).unwrap_or(ErrorKind::Extraction)
            }
            IngestError::Extraction(_) => ErrorKind::Extraction,
            IngestError::Analysis(AnalysisError::Provider(e)) => {
                llm_kind(e).unwrap_or(ErrorKind::Provider)
            }
            IngestError::Analysis(_) => ErrorKind::Provider,
            IngestError::Persistence(StoreError::Timeout(_)) => ErrorKind::Timeout,
            IngestError::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Safe to show a caller: allow-listed validation messages verbatim,
    /// otherwise the category message.
    pub fn user_message(&self) -> String {
        match self {
            IngestError::Validation(msg) if is_safe_message(msg) => msg.clone(),
            other => other.kind().user_message().to_string(),
        }
    }
}

fn llm_kind(e: &LlmError) -> Option<ErrorKind> {
    if matches!(e, LlmError::MissingApiKey) {
        return Some(ErrorKind::Unavailable);
    }
    if e.is_timeout() {
        return Some(ErrorKind::Timeout);
    }
    match e.status()? {
        401 => Some(ErrorKind::Unauthorized),
        403 => Some(ErrorKind::Forbidden),
        429 => Some(ErrorKind::RateLimited),
        500..=599 => Some(ErrorKind::Unavailable),
        _ => None,
    }
}
