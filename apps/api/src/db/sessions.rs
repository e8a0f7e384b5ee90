use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{PgStore, StoreError};
use crate::ingestion::status::StatusUpdate;
use crate::ingestion::store::SessionStore;
use crate::models::session::SessionRow;

const PKEY: &str = "ingestion_sessions_pkey";
const ONE_ACTIVE: &str = "ingestion_sessions_one_active";

#[async_trait]
impl SessionStore for PgStore {
    async fn begin(
        &self,
        update: &StatusUpdate,
        stale_before: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;

        let abandoned = sqlx::query(
            r#"
            UPDATE ingestion_sessions
            SET status = 'failed', message = 'Session abandoned', updated_at = now()
            WHERE subject_id = $1
              AND status NOT IN ('completed', 'failed')
              AND updated_at < $2
            "#,
        )
        .bind(update.subject_id)
        .bind(stale_before)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if abandoned > 0 {
            tracing::warn!(subject_id = %update.subject_id, abandoned, "marked stale sessions as failed");
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO ingestion_sessions
                (subject_id, session_id, status, progress, message, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(update.subject_id)
        .bind(update.session_id)
        .bind(update.stage.as_str())
        .bind(i16::from(update.progress))
        .bind(&update.message)
        .bind(&update.metadata)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            return Err(match StoreError::violated_constraint(&e) {
                Some(ONE_ACTIVE) => StoreError::ActiveSession,
                Some(PKEY) => StoreError::Duplicate(PKEY),
                _ => StoreError::Database(e),
            });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert(&self, update: &StatusUpdate) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_sessions
                (subject_id, session_id, status, progress, message, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (subject_id, session_id) DO UPDATE SET
                status = EXCLUDED.status,
                progress = EXCLUDED.progress,
                message = EXCLUDED.message,
                metadata = EXCLUDED.metadata,
                updated_at = now()
            "#,
        )
        .bind(update.subject_id)
        .bind(update.session_id)
        .bind(update.stage.as_str())
        .bind(i16::from(update.progress))
        .bind(&update.message)
        .bind(&update.metadata)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn finish(&self, update: &StatusUpdate) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE ingestion_sessions
            SET status = $3, progress = $4, message = $5, metadata = $6, updated_at = now()
            WHERE subject_id = $1 AND session_id = $2
            "#,
        )
        .bind(update.subject_id)
        .bind(update.session_id)
        .bind(update.stage.as_str())
        .bind(i16::from(update.progress))
        .bind(&update.message)
        .bind(&update.metadata)
        .execute(self.pool())
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound(format!("session {}", update.session_id)));
        }
        Ok(())
    }

    async fn get(
        &self,
        subject_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<SessionRow>, StoreError> {
        Ok(sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT subject_id, session_id, status, progress, message, metadata, updated_at
            FROM ingestion_sessions
            WHERE subject_id = $1 AND session_id = $2
            "#,
        )
        .bind(subject_id)
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?)
    }

    async fn delete_for_subject(&self, subject_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM ingestion_sessions WHERE subject_id = $1")
            .bind(subject_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
