use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::ingestion::coordinator::{IngestionReport, IngestionRequest};
use crate::ingestion::persistence::{delete_all, DeletionReport};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestionBody {
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub document_ref: String,
    #[serde(default)]
    pub source_tag: String,
    pub template_override: Option<String>,
    pub session_item_ref: Option<String>,
    pub tenant_id: Option<String>,
    pub session_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct IngestionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: IngestionReport,
}

#[derive(Serialize)]
pub struct SessionStatusResponse {
    pub status: String,
    pub progress: i16,
    pub message: String,
    pub metadata: Value,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// POST /api/v1/ingestions
pub async fn handle_run_ingestion(
    State(state): State<AppState>,
    Json(body): Json<IngestionBody>,
) -> Result<Json<IngestionResponse>, AppError> {
    let request_id = Uuid::new_v4();
    let request = IngestionRequest {
        subject_id: body.subject_id,
        document_ref: body.document_ref,
        source_tag: body.source_tag,
        template_override: body.template_override,
        session_item_ref: body.session_item_ref,
        tenant_id: body.tenant_id,
        session_id: body.session_id,
        request_id,
    };

    let report = state
        .coordinator
        .run(request)
        .await
        .map_err(|e| AppError::ingest(request_id, e))?;

    Ok(Json(IngestionResponse {
        success: true,
        report,
    }))
}

/// GET /api/v1/subjects/:subject_id/sessions/:session_id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path((subject_id, session_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SessionStatusResponse>, AppError> {
    let row = state
        .stores
        .sessions
        .get(subject_id, session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;

    Ok(Json(SessionStatusResponse {
        status: row.status,
        progress: row.progress,
        message: row.message,
        metadata: row.metadata,
        updated_at: row.updated_at,
    }))
}

/// DELETE /api/v1/subjects/:subject_id/cv-data
pub async fn handle_delete_cv_data(
    State(state): State<AppState>,
    Path(subject_id): Path<Uuid>,
) -> Result<Json<DeletionReport>, AppError> {
    state
        .stores
        .profiles
        .subject(subject_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Subject {subject_id} not found")))?;

    let report = delete_all(
        &state.stores.profiles,
        &state.stores.sessions,
        &state.stores.documents,
        subject_id,
    )
    .await;
    Ok(Json(report))
}
