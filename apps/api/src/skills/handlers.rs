use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::skills::proficiency::{scale_definition, ScaleEntry};
use crate::skills::standardize::{standardize_existing, StandardizeReport};
use crate::state::AppState;

/// GET /api/v1/proficiency-scale
pub async fn handle_proficiency_scale() -> Json<Vec<ScaleEntry>> {
    Json(scale_definition())
}

/// POST /api/v1/skills/standardize
pub async fn handle_standardize(
    State(state): State<AppState>,
) -> Result<Json<StandardizeReport>, AppError> {
    let report = standardize_existing(state.stores.profiles.as_ref()).await?;
    Ok(Json(report))
}
