use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::batch::{final_status, BatchJobStore, BatchStatus};
use crate::config::BatchSettings;
use crate::db::StoreError;
use crate::ingestion::coordinator::{IngestionCoordinator, IngestionRequest};
use crate::ingestion::error::ErrorKind;
use crate::models::batch::BatchJobRow;

pub const BATCH_SOURCE_TAG: &str = "batch";

pub struct BatchProcessor {
    jobs: Arc<dyn BatchJobStore>,
    coordinator: Arc<IngestionCoordinator>,
    settings: BatchSettings,
}

/// Final counts of one processed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    pub status: BatchStatus,
    pub success: u32,
    pub failure: u32,
}

impl BatchProcessor {
    pub fn new(
        jobs: Arc<dyn BatchJobStore>,
        coordinator: Arc<IngestionCoordinator>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            jobs,
            coordinator,
            settings,
        }
    }

    /// Polls forever. Sleeps only when a poll found nothing to do.
    pub async fn run_worker(self: Arc<Self>) {
        info!(
            worker_id = %self.settings.worker_id,
            claim_limit = self.settings.claim_limit,
            "batch worker started"
        );
        loop {
            match self.poll_once().await {
                Ok(0) => tokio::time::sleep(self.settings.poll_interval).await,
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "failed to claim batch jobs");
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
            }
        }
    }

    /// Requeues stale claims, then claims one bounded batch and processes its
    /// jobs concurrently. Returns how many jobs were claimed.
    pub async fn poll_once(self: &Arc<Self>) -> Result<usize, StoreError> {
        match self
            .jobs
            .recover_stale(Utc::now(), self.settings.stale_claim)
            .await
        {
            Ok(0) => {}
            Ok(recovered) => warn!(recovered, "requeued batch jobs stuck in processing"),
            Err(e) => warn!(error = %e, "failed to recover stale batch jobs"),
        }

        let claimed = self
            .jobs
            .claim(&self.settings.worker_id, self.settings.claim_limit)
            .await?;
        let count = claimed.len();
        if count == 0 {
            return Ok(0);
        }
        info!(jobs = count, "claimed batch jobs");

        let mut set = JoinSet::new();
        for job in claimed {
            let this = Arc::clone(self);
            set.spawn(async move { this.process_job(job).await });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                // a panicking job stays in `processing` until its claim goes stale
                error!(error = %e, "batch job task failed");
            }
        }
        Ok(count)
    }

    pub async fn process_job(&self, job: BatchJobRow) -> JobOutcome {
        let mut success = 0u32;
        let mut failure = 0u32;

        for (i, subject_id) in job.subject_ids.iter().copied().enumerate() {
            if i > 0 && !self.settings.item_delay.is_zero() {
                tokio::time::sleep(self.settings.item_delay).await;
            }

            let last_error = match self.process_subject(&job, subject_id).await {
                Ok(()) => {
                    success += 1;
                    None
                }
                Err(message) => {
                    failure += 1;
                    warn!(job_id = %job.id, subject_id = %subject_id, error = %message, "batch subject failed");
                    Some(message)
                }
            };

            if let Err(e) = self
                .jobs
                .record_progress(job.id, success, failure, last_error.as_deref())
                .await
            {
                warn!(job_id = %job.id, error = %e, "failed to record batch progress");
            }
        }

        let status = final_status(success, failure);
        if let Err(e) = self.jobs.finish(job.id, status, success, failure).await {
            error!(job_id = %job.id, error = %e, "failed to finish batch job");
        }
        info!(job_id = %job.id, status = %status, success, failure, "batch job finished");

        JobOutcome {
            status,
            success,
            failure,
        }
    }

    /// One subject: resolve its current document, then run the pipeline.
    /// Errors come back as user-safe text.
    async fn process_subject(&self, job: &BatchJobRow, subject_id: Uuid) -> Result<(), String> {
        let document = self
            .coordinator
            .profiles()
            .current_document(subject_id)
            .await
            .map_err(|_| ErrorKind::Persistence.user_message().to_string())?
            .ok_or_else(|| format!("subject {subject_id} has no current document"))?;

        let request = IngestionRequest {
            subject_id: subject_id.to_string(),
            document_ref: document.storage_key,
            source_tag: BATCH_SOURCE_TAG.to_string(),
            template_override: job.template_override.clone(),
            session_item_ref: Some(job.id.to_string()),
            tenant_id: job.tenant_id.clone(),
            session_id: None,
            request_id: Uuid::new_v4(),
        };

        self.coordinator
            .run(request)
            .await
            .map(|_| ())
            .map_err(|e| format!("{}: {}", e.kind().code(), e.user_message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::batch::NewBatchJob;
    use crate::config::IngestionSettings;
    use crate::testing::{InMemoryBatchJobs, InMemoryTemplates, ScriptedReasoner, TestStores};

    const ANALYSIS: &str = r#"{"summary": "x", "work_experience": [], "education": [],
        "skills": [{"name": "Rust", "level": "expert"}]}"#;
    const RESUME: &str = "Jane Doe, backend engineer. Ten years of Rust, Go and PostgreSQL in production.";

    struct Fixture {
        stores: TestStores,
        jobs: Arc<InMemoryBatchJobs>,
        processor: Arc<BatchProcessor>,
    }

    fn fixture(responses: usize) -> Fixture {
        let stores = TestStores::new();
        let reasoner = Arc::new(ScriptedReasoner::new(
            (0..responses).map(|_| Ok(ANALYSIS.to_string())).collect(),
        ));
        let coordinator = Arc::new(IngestionCoordinator::new(
            stores.profiles_dyn(),
            stores.sessions_dyn(),
            stores.metrics_dyn(),
            stores.documents_dyn(),
            Arc::new(InMemoryTemplates::default()),
            reasoner,
            IngestionSettings::default(),
        ));
        let jobs = Arc::new(InMemoryBatchJobs::default());
        let settings = BatchSettings {
            claim_limit: 10,
            item_delay: Duration::from_millis(2_000),
            poll_interval: Duration::from_millis(10),
            stale_claim: chrono::Duration::minutes(30),
            worker_id: "test-worker".to_string(),
        };
        let processor = Arc::new(BatchProcessor::new(jobs.clone(), coordinator, settings));
        Fixture {
            stores,
            jobs,
            processor,
        }
    }

    async fn subject_with_document(stores: &TestStores) -> Uuid {
        let subject = stores.profiles.insert_subject(Uuid::new_v4(), None);
        stores
            .attach_document(subject.id, &format!("documents/{}/cv.txt", subject.id), RESUME.as_bytes())
            .await;
        subject.id
    }

    async fn enqueue(jobs: &InMemoryBatchJobs, subject_ids: Vec<Uuid>) -> Uuid {
        jobs.enqueue(&NewBatchJob {
            tenant_id: None,
            template_override: None,
            subject_ids,
        })
        .await
        .unwrap()
        .id
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_subjects_succeed() {
        let f = fixture(2);
        let a = subject_with_document(&f.stores).await;
        let b = subject_with_document(&f.stores).await;
        let job_id = enqueue(&f.jobs, vec![a, b]).await;

        assert_eq!(f.processor.poll_once().await.unwrap(), 1);

        let row = f.jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert_eq!((row.success_count, row.failure_count), (2, 0));
        assert!(row.completed_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_results_complete_with_errors() {
        let f = fixture(2);
        let a = subject_with_document(&f.stores).await;
        let missing_doc = f.stores.profiles.insert_subject(Uuid::new_v4(), None).id;
        let b = subject_with_document(&f.stores).await;
        let job_id = enqueue(&f.jobs, vec![a, missing_doc, b]).await;

        f.processor.poll_once().await.unwrap();

        let row = f.jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(row.status, "completed_with_errors");
        assert_eq!(row.success_count + row.failure_count, row.total);
        assert_eq!(row.failure_count, 1);
        assert!(row.last_error.unwrap().contains("no current document"));
        // one progress write per subject
        assert_eq!(f.jobs.progress_writes(job_id), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failures_mark_job_failed_without_blocking_others() {
        let f = fixture(1);
        let ghost = Uuid::new_v4();
        let failing = enqueue(&f.jobs, vec![ghost, Uuid::new_v4()]).await;
        let ok = subject_with_document(&f.stores).await;
        let passing = enqueue(&f.jobs, vec![ok]).await;

        assert_eq!(f.processor.poll_once().await.unwrap(), 2);

        let failed = f.jobs.get(failing).await.unwrap().unwrap();
        assert_eq!(failed.status, "failed");
        assert_eq!(failed.failure_count, 2);
        assert_eq!(f.jobs.get(passing).await.unwrap().unwrap().status, "completed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_subjects_are_spaced_by_item_delay() {
        let f = fixture(3);
        let ids = vec![
            subject_with_document(&f.stores).await,
            subject_with_document(&f.stores).await,
            subject_with_document(&f.stores).await,
        ];
        let job = f.jobs.enqueue(&NewBatchJob {
            tenant_id: None,
            template_override: None,
            subject_ids: ids,
        })
        .await
        .unwrap();

        let started = tokio::time::Instant::now();
        let outcome = f.processor.process_job(job).await;

        assert_eq!(outcome.success, 3);
        assert!(started.elapsed() >= Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_runs_use_batch_source_tag() {
        let f = fixture(1);
        let a = subject_with_document(&f.stores).await;
        enqueue(&f.jobs, vec![a]).await;

        f.processor.poll_once().await.unwrap();

        let session = &f.stores.sessions.for_subject(a)[0];
        assert_eq!(session.metadata["source_tag"], BATCH_SOURCE_TAG);
    }

    #[tokio::test]
    async fn test_claim_respects_limit_and_order() {
        let f = fixture(0);
        let mut ids = Vec::new();
        for _ in 0..12 {
            ids.push(enqueue(&f.jobs, vec![]).await);
        }
        let claimed = f.jobs.claim("w", 10).await.unwrap();
        assert_eq!(claimed.len(), 10);
        assert_eq!(claimed[0].id, ids[0]);
        assert!(claimed.iter().all(|j| j.status == "processing"));
        assert_eq!(f.jobs.claim("w", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_processing_jobs_return_to_queue_and_unlock() {
        let f = fixture(0);
        let stuck = enqueue(&f.jobs, vec![Uuid::new_v4()]).await;
        let finished = enqueue(&f.jobs, vec![]).await;
        let waiting = enqueue(&f.jobs, vec![]).await;
        f.jobs.claim("crashed-worker", 2).await.unwrap();
        f.jobs.record_progress(stuck, 0, 1, Some("boom")).await.unwrap();
        f.jobs.finish(finished, BatchStatus::Completed, 0, 0).await.unwrap();

        let now = Utc::now();
        let long_ago = now - chrono::Duration::hours(2);
        for id in [stuck, finished, waiting] {
            f.jobs.backdate(id, long_ago);
        }

        let recovered = f
            .jobs
            .recover_stale(now, chrono::Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(recovered, 1);

        let row = f.jobs.get(stuck).await.unwrap().unwrap();
        assert_eq!(row.status, "queued");
        assert!(row.claimed_by.is_none());
        assert!(row.started_at.is_none());
        assert_eq!((row.success_count, row.failure_count), (0, 0));
        assert!(row.last_error.is_none());
        assert_eq!(row.updated_at, now);

        assert_eq!(f.jobs.get(finished).await.unwrap().unwrap().status, "completed");
        let untouched = f.jobs.get(waiting).await.unwrap().unwrap();
        assert_eq!(untouched.status, "queued");
        assert_eq!(untouched.updated_at, long_ago);
    }

    #[tokio::test]
    async fn test_recent_claims_are_left_alone() {
        let f = fixture(0);
        let job_id = enqueue(&f.jobs, vec![Uuid::new_v4()]).await;
        f.jobs.claim("other-worker", 1).await.unwrap();

        assert_eq!(f.processor.poll_once().await.unwrap(), 0);

        let row = f.jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(row.status, "processing");
        assert_eq!(row.claimed_by.as_deref(), Some("other-worker"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_reruns_job_abandoned_by_crashed_worker() {
        let f = fixture(1);
        let subject = subject_with_document(&f.stores).await;
        let job_id = enqueue(&f.jobs, vec![subject]).await;
        f.jobs.claim("crashed-worker", 1).await.unwrap();
        f.jobs.backdate(job_id, Utc::now() - chrono::Duration::hours(1));

        assert_eq!(f.processor.poll_once().await.unwrap(), 1);

        let row = f.jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert_eq!((row.success_count, row.failure_count), (1, 0));
        assert_eq!(row.claimed_by.as_deref(), Some("test-worker"));
    }
}
