pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::batch::handlers as batch;
use crate::documents::handlers as documents;
use crate::ingestion::handlers as ingestion;
use crate::skills::handlers as skills;
use crate::state::AppState;

/// Headroom for multipart boundaries and the non-file fields.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        // Ingestion runs
        .route("/api/v1/ingestions", post(ingestion::handle_run_ingestion))
        .route(
            "/api/v1/subjects/:subject_id/sessions/:session_id",
            get(ingestion::handle_get_session),
        )
        .route(
            "/api/v1/subjects/:subject_id/cv-data",
            delete(ingestion::handle_delete_cv_data),
        )
        .route(
            "/api/v1/subjects/:subject_id/documents",
            post(documents::handle_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Skills
        .route(
            "/api/v1/proficiency-scale",
            get(skills::handle_proficiency_scale),
        )
        .route(
            "/api/v1/skills/standardize",
            post(skills::handle_standardize),
        )
        // Batch jobs
        .route("/api/v1/batch-jobs", post(batch::handle_create_batch_job))
        .route("/api/v1/batch-jobs/:job_id", get(batch::handle_get_batch_job))
        .with_state(state)
}
