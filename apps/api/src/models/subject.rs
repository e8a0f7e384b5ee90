use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubjectRow {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub position_id: Option<Uuid>,
    pub current_document_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub storage_key: String,
    pub format: String,
    pub original_filename: Option<String>,
    pub size_bytes: i64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RequirementRow {
    pub skill_name: String,
    pub required_level: Option<String>,
}

/// A stored skill's level, as read by the standardize pass.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SkillLevelRow {
    pub id: Uuid,
    pub proficiency: i16,
    pub raw_proficiency: Option<String>,
}
