use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SessionRow {
    pub subject_id: Uuid,
    pub session_id: Uuid,
    pub status: String,
    pub progress: i16,
    pub message: String,
    pub metadata: Value,
    pub updated_at: DateTime<Utc>,
}
