//! Persistence & Cleanup.
//!
//! `persist` writes one successful run: profile merge, then replace-by-source
//! of the subject's `cv` skills. `delete_all` tears a subject's cv-derived data
//! down step by step; a failing step is reported and the rest still run.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::StructuredProfile;
use crate::db::StoreError;
use crate::documents::DocumentStore;
use crate::ingestion::store::{ProfileStore, SessionStore};
use crate::models::subject::SubjectRow;
use crate::sanitize::sanitize_message;
use crate::skills::adapter::CanonicalSkill;
use crate::skills::SkillSource;

#[derive(Debug, Clone, PartialEq)]
pub struct PersistOutcome {
    pub position_id: Uuid,
    pub skills_written: u64,
}

pub async fn persist(
    profiles: &dyn ProfileStore,
    subject: &SubjectRow,
    profile: &StructuredProfile,
    skills: &[CanonicalSkill],
    match_score: Option<u32>,
) -> Result<PersistOutcome, StoreError> {
    // skill rows require a position
    let position_id = match subject.position_id {
        Some(id) => id,
        None => profiles.ensure_position(subject.id).await?,
    };

    profiles.upsert_profile(subject.id, profile, match_score).await?;
    let skills_written = profiles
        .replace_skills(subject.id, position_id, SkillSource::Cv, skills)
        .await?;

    info!(
        subject_id = %subject.id,
        skills_written,
        "persisted ingestion results"
    );
    Ok(PersistOutcome {
        position_id,
        skills_written,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionStep {
    pub step: &'static str,
    pub ok: bool,
    pub affected: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    pub subject_id: Uuid,
    pub steps: Vec<DeletionStep>,
}

impl DeletionReport {
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }

    fn push(&mut self, step: &'static str, result: Result<u64, StoreError>) {
        let entry = match result {
            Ok(affected) => DeletionStep {
                step,
                ok: true,
                affected,
                error: None,
            },
            Err(e) => {
                let message = sanitize_message(&e.to_string());
                warn!(subject_id = %self.subject_id, step, error = %message, "deletion step failed");
                DeletionStep {
                    step,
                    ok: false,
                    affected: 0,
                    error: Some(message),
                }
            }
        };
        self.steps.push(entry);
    }
}

/// Removes the subject's cv-derived skills, profile scores, imported profile
/// sections, session records and documents. `verified`/`manual` skills and
/// other subjects are untouched.
pub async fn delete_all(
    profiles: &Arc<dyn ProfileStore>,
    sessions: &Arc<dyn SessionStore>,
    documents: &Arc<dyn DocumentStore>,
    subject_id: Uuid,
) -> DeletionReport {
    let mut report = DeletionReport {
        subject_id,
        steps: Vec::with_capacity(6),
    };

    report.push("cv_skills", profiles.delete_skills(subject_id, SkillSource::Cv).await);
    report.push("profile_scores", profiles.clear_profile_scores(subject_id).await);
    report.push("profile_sections", profiles.clear_profile_sections(subject_id).await);
    report.push("sessions", sessions.delete_for_subject(subject_id).await);

    let blobs = delete_blobs(profiles.as_ref(), documents.as_ref(), subject_id).await;
    report.push("document_blobs", blobs);
    report.push("document_records", profiles.delete_documents(subject_id).await);

    info!(
        subject_id = %subject_id,
        complete = report.is_complete(),
        "cv data deletion finished"
    );
    report
}

async fn delete_blobs(
    profiles: &dyn ProfileStore,
    documents: &dyn DocumentStore,
    subject_id: Uuid,
) -> Result<u64, StoreError> {
    let rows = profiles.documents_for_subject(subject_id).await?;
    let mut deleted = 0;
    let mut last_err = None;
    for row in rows {
        match documents.delete(&row.storage_key).await {
            Ok(()) => deleted += 1,
            Err(e) => {
                warn!(subject_id = %subject_id, error = %e, "failed to delete document blob");
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(e) => Err(e),
        None => Ok(deleted),
    }
}
