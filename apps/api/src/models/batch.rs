use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BatchJobRow {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub template_override: Option<String>,
    pub subject_ids: Vec<Uuid>,
    pub status: String,
    pub total: i32,
    pub success_count: i32,
    pub failure_count: i32,
    pub last_error: Option<String>,
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
