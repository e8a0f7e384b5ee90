use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::batch::{BatchJobStore, BatchStatus, NewBatchJob};
use crate::db::{PgStore, StoreError};
use crate::models::batch::BatchJobRow;

const COLUMNS: &str = "id, tenant_id, template_override, subject_ids, status, total, \
     success_count, failure_count, last_error, claimed_by, created_at, started_at, completed_at, \
     updated_at";

#[async_trait]
impl BatchJobStore for PgStore {
    async fn enqueue(&self, job: &NewBatchJob) -> Result<BatchJobRow, StoreError> {
        let sql = format!(
            "INSERT INTO batch_jobs (id, tenant_id, template_override, subject_ids, total) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, BatchJobRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&job.tenant_id)
            .bind(&job.template_override)
            .bind(&job.subject_ids)
            .bind(job.subject_ids.len() as i32)
            .fetch_one(self.pool())
            .await?)
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<BatchJobRow>, StoreError> {
        let sql = format!(
            r#"
            UPDATE batch_jobs
            SET status = 'processing',
                claimed_by = $1,
                started_at = now(),
                updated_at = now()
            WHERE id IN (
                SELECT id
                FROM batch_jobs
                WHERE status = 'queued'
                ORDER BY created_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {COLUMNS}
            "#
        );
        let mut jobs = sqlx::query_as::<_, BatchJobRow>(&sql)
            .bind(worker_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        // RETURNING order is unspecified
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn recover_stale(
        &self,
        now: DateTime<Utc>,
        max_processing: chrono::Duration,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs
            SET status = 'queued',
                claimed_by = NULL,
                started_at = NULL,
                success_count = 0,
                failure_count = 0,
                last_error = NULL,
                updated_at = $1
            WHERE status = 'processing'
              AND updated_at <= $2
            "#,
        )
        .bind(now)
        .bind(now - max_processing)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn record_progress(
        &self,
        job_id: Uuid,
        success: u32,
        failure: u32,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE batch_jobs
            SET success_count = $2,
                failure_count = $3,
                last_error = COALESCE($4, last_error),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(success as i32)
        .bind(failure as i32)
        .bind(last_error)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn finish(
        &self,
        job_id: Uuid,
        status: BatchStatus,
        success: u32,
        failure: u32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE batch_jobs
            SET status = $2,
                success_count = $3,
                failure_count = $4,
                completed_at = now(),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(success as i32)
        .bind(failure as i32)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<BatchJobRow>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM batch_jobs WHERE id = $1");
        Ok(sqlx::query_as::<_, BatchJobRow>(&sql)
            .bind(job_id)
            .fetch_optional(self.pool())
            .await?)
    }
}
