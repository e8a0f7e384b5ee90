use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::documents::storage_key;
use crate::errors::AppError;
use crate::extraction::DocumentFormat;
use crate::models::subject::DocumentRow;
use crate::sanitize::{MSG_FILE_TOO_LARGE, MSG_NO_FILE, MSG_UNSUPPORTED_FORMAT};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
    pub document_ref: String,
    pub format: DocumentFormat,
    pub uploaded_at: DateTime<Utc>,
}

struct UploadedFile {
    filename: String,
    bytes: Bytes,
}

/// POST /api/v1/subjects/:subject_id/documents
///
/// Multipart fields: `file` (required), `tenant_id` (optional). The new
/// document becomes the subject's current one; earlier documents stay as they are.
pub async fn handle_upload(
    State(state): State<AppState>,
    Path(subject_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let max_bytes = state.config.max_upload_bytes;
    let mut file = None;
    let mut tenant_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => file = Some(read_file(field, max_bytes).await?),
            Some("tenant_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("invalid tenant_id field: {e}")))?;
                tenant_id = Some(value.trim().to_string()).filter(|t| !t.is_empty());
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::Validation(MSG_NO_FILE.into()))?;
    if file.bytes.is_empty() {
        return Err(AppError::Validation(MSG_NO_FILE.into()));
    }
    let format = DocumentFormat::from_path(&file.filename)
        .ok_or_else(|| AppError::Validation(MSG_UNSUPPORTED_FORMAT.into()))?;

    let profiles = &state.stores.profiles;
    profiles.ensure_subject(subject_id, tenant_id.as_deref()).await?;

    let document_id = Uuid::new_v4();
    let key = storage_key(subject_id, document_id, format);
    let size_bytes = file.bytes.len() as i64;
    state
        .stores
        .documents
        .put(&key, file.bytes, format.media_type())
        .await?;

    let row = DocumentRow {
        id: document_id,
        subject_id,
        storage_key: key.clone(),
        format: format.as_str().to_string(),
        original_filename: Some(file.filename),
        size_bytes,
        uploaded_at: Utc::now(),
    };
    profiles.record_document(&row).await?;

    info!(
        subject_id = %subject_id,
        document_id = %document_id,
        format = format.as_str(),
        size_bytes,
        "document uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            document_id,
            document_ref: key,
            format,
            uploaded_at: row.uploaded_at,
        }),
    ))
}

/// Reads the file field chunk by chunk, stopping as soon as it exceeds the cap.
async fn read_file(mut field: Field<'_>, max_bytes: usize) -> Result<UploadedFile, AppError> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let mut buf = BytesMut::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| upload_error(&e.to_string()))?
    {
        if buf.len() + chunk.len() > max_bytes {
            return Err(AppError::Validation(MSG_FILE_TOO_LARGE.into()));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(UploadedFile {
        filename,
        bytes: buf.freeze(),
    })
}

fn upload_error(message: &str) -> AppError {
    // the body limit layer surfaces as a read error
    if message.contains("length limit") {
        AppError::Validation(MSG_FILE_TOO_LARGE.into())
    } else {
        AppError::Validation(format!("failed to read upload: {message}"))
    }
}
