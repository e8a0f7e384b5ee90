use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::batch::{NewBatchJob, MAX_SUBJECTS_PER_JOB};
use crate::errors::AppError;
use crate::models::batch::BatchJobRow;
use crate::sanitize::{MSG_EMPTY_SUBJECT_LIST, MSG_TOO_MANY_SUBJECTS};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBatchJob {
    #[serde(default)]
    pub subject_ids: Vec<Uuid>,
    pub tenant_id: Option<String>,
    pub template_override: Option<String>,
}

/// POST /api/v1/batch-jobs
pub async fn handle_create_batch_job(
    State(state): State<AppState>,
    Json(req): Json<CreateBatchJob>,
) -> Result<(StatusCode, Json<BatchJobRow>), AppError> {
    let mut subject_ids = req.subject_ids;
    // keep first occurrence order
    let mut seen = std::collections::HashSet::new();
    subject_ids.retain(|id| seen.insert(*id));

    if subject_ids.is_empty() {
        return Err(AppError::Validation(MSG_EMPTY_SUBJECT_LIST.into()));
    }
    if subject_ids.len() > MAX_SUBJECTS_PER_JOB {
        return Err(AppError::Validation(MSG_TOO_MANY_SUBJECTS.into()));
    }

    let job = state
        .stores
        .batch_jobs
        .enqueue(&NewBatchJob {
            tenant_id: req.tenant_id,
            template_override: req.template_override,
            subject_ids,
        })
        .await?;
    tracing::info!(job_id = %job.id, total = job.total, "batch job queued");

    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /api/v1/batch-jobs/:job_id
pub async fn handle_get_batch_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<BatchJobRow>, AppError> {
    let job = state
        .stores
        .batch_jobs
        .get(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Batch job {job_id} not found")))?;
    Ok(Json(job))
}
