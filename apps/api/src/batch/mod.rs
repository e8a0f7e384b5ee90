//! Batch Queue Processor: drives ingestion across many subjects.
//!
//! Jobs are claimed in creation order, a bounded number per poll. Subjects in
//! one job run strictly one after another with a fixed delay between them;
//! counts are persisted after every subject so a caller can poll mid-job.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::StoreError;
use crate::models::batch::BatchJobRow;

pub mod handlers;
pub mod processor;

pub const MAX_SUBJECTS_PER_JOB: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    CompletedWithErrors,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Queued => "queued",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::CompletedWithErrors => "completed_with_errors",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a job from its counts. An empty job counts as completed.
pub fn final_status(success: u32, failure: u32) -> BatchStatus {
    match (success, failure) {
        (_, 0) => BatchStatus::Completed,
        (0, _) => BatchStatus::Failed,
        _ => BatchStatus::CompletedWithErrors,
    }
}

#[derive(Debug, Clone)]
pub struct NewBatchJob {
    pub tenant_id: Option<String>,
    pub template_override: Option<String>,
    pub subject_ids: Vec<Uuid>,
}

#[async_trait]
pub trait BatchJobStore: Send + Sync {
    async fn enqueue(&self, job: &NewBatchJob) -> Result<BatchJobRow, StoreError>;

    /// Moves up to `limit` queued jobs, oldest first, to `processing` for
    /// `worker_id`. Jobs claimed by another worker are skipped, not waited on.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<BatchJobRow>, StoreError>;

    /// Returns `processing` jobs with no write since `now - max_processing` to
    /// the queue, unclaimed and with counts and last error cleared. The next claim reruns every
    /// subject of such a job. Returns how many jobs moved.
    async fn recover_stale(
        &self,
        now: DateTime<Utc>,
        max_processing: chrono::Duration,
    ) -> Result<u64, StoreError>;

    async fn record_progress(
        &self,
        job_id: Uuid,
        success: u32,
        failure: u32,
        last_error: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn finish(
        &self,
        job_id: Uuid,
        status: BatchStatus,
        success: u32,
        failure: u32,
    ) -> Result<(), StoreError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<BatchJobRow>, StoreError>;
}
