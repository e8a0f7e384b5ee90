//! Storage seams for the ingestion pipeline. `PgStore` implements these in
//! production; tests use the in-memory doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::analysis::StructuredProfile;
use crate::db::StoreError;
use crate::ingestion::metrics::UsageMetric;
use crate::ingestion::status::StatusUpdate;
use crate::models::session::SessionRow;
use crate::models::subject::{DocumentRow, RequirementRow, SkillLevelRow, SubjectRow};
use crate::skills::adapter::CanonicalSkill;
use crate::skills::proficiency::Proficiency;
use crate::skills::SkillSource;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts the first row of a run. Sessions of the same subject that are
    /// still active but untouched since `stale_before` are failed first.
    ///
    /// Errors with `StoreError::ActiveSession` when another run is in flight
    /// and `StoreError::Duplicate` when the session key was used before.
    async fn begin(&self, update: &StatusUpdate, stale_before: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Last write wins on (subject, session).
    async fn upsert(&self, update: &StatusUpdate) -> Result<(), StoreError>;

    /// Moves a session begun with `begin` into its terminal state, which
    /// frees the subject for the next run.
    async fn finish(&self, update: &StatusUpdate) -> Result<(), StoreError>;

    async fn get(&self, subject_id: Uuid, session_id: Uuid)
        -> Result<Option<SessionRow>, StoreError>;

    async fn delete_for_subject(&self, subject_id: Uuid) -> Result<u64, StoreError>;
}

/// Everything keyed by subject: the subject row, its documents, profile and skills.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn subject(&self, subject_id: Uuid) -> Result<Option<SubjectRow>, StoreError>;

    /// Creates the subject if it does not exist yet.
    async fn ensure_subject(&self, subject_id: Uuid, tenant_id: Option<&str>)
        -> Result<SubjectRow, StoreError>;

    /// Assigns the placeholder position when the subject has none and returns
    /// the subject's position.
    async fn ensure_position(&self, subject_id: Uuid) -> Result<Uuid, StoreError>;

    async fn position_requirements(&self, position_id: Uuid)
        -> Result<Vec<RequirementRow>, StoreError>;

    /// Records a new document and makes it the subject's current one.
    async fn record_document(&self, document: &DocumentRow) -> Result<(), StoreError>;

    async fn current_document(&self, subject_id: Uuid) -> Result<Option<DocumentRow>, StoreError>;

    async fn documents_for_subject(&self, subject_id: Uuid) -> Result<Vec<DocumentRow>, StoreError>;

    /// Clears the current-document reference and removes the document rows.
    async fn delete_documents(&self, subject_id: Uuid) -> Result<u64, StoreError>;

    /// Merges scalar fields (absent values keep what is stored) and replaces
    /// the imported sections wholesale.
    async fn upsert_profile(
        &self,
        subject_id: Uuid,
        profile: &StructuredProfile,
        match_score: Option<u32>,
    ) -> Result<(), StoreError>;

    async fn clear_profile_scores(&self, subject_id: Uuid) -> Result<u64, StoreError>;

    async fn clear_profile_sections(&self, subject_id: Uuid) -> Result<u64, StoreError>;

    /// Deletes every row of `source` for the subject and inserts `skills`,
    /// atomically. Returns the number inserted.
    async fn replace_skills(
        &self,
        subject_id: Uuid,
        position_id: Uuid,
        source: SkillSource,
        skills: &[CanonicalSkill],
    ) -> Result<u64, StoreError>;

    async fn delete_skills(&self, subject_id: Uuid, source: SkillSource) -> Result<u64, StoreError>;

    /// Keyset page over all skill rows, ordered by id.
    async fn skill_levels(&self, after: Option<Uuid>, limit: i64)
        -> Result<Vec<SkillLevelRow>, StoreError>;

    async fn set_skill_proficiency(&self, skill_id: Uuid, proficiency: Proficiency)
        -> Result<(), StoreError>;
}

/// Append-only sink for usage metrics. Never read back by the pipeline.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record(&self, metric: &UsageMetric) -> Result<(), StoreError>;
}
