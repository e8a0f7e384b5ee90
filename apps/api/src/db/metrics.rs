use async_trait::async_trait;

use crate::db::{PgStore, StoreError};
use crate::ingestion::metrics::UsageMetric;
use crate::ingestion::store::MetricsSink;

#[async_trait]
impl MetricsSink for PgStore {
    async fn record(&self, metric: &UsageMetric) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO usage_metrics
                (subject_id, session_id, request_id, operation, model, input_tokens,
                 output_tokens, cost_estimate, duration_ms, success, error_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(metric.subject_id)
        .bind(metric.session_id)
        .bind(metric.request_id)
        .bind(&metric.operation)
        .bind(&metric.model)
        .bind(i32::try_from(metric.input_tokens).unwrap_or(i32::MAX))
        .bind(i32::try_from(metric.output_tokens).unwrap_or(i32::MAX))
        .bind(metric.cost_estimate)
        .bind(i64::try_from(metric.duration_ms).unwrap_or(i64::MAX))
        .bind(metric.success)
        .bind(&metric.error_code)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
