use std::sync::Arc;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::ingestion::store::MetricsSink;
use crate::llm_client::{LlmInvocation, TokenUsage, MODEL};

/// One append-only usage row: a reasoning-service call or a terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageMetric {
    pub subject_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub request_id: Uuid,
    pub operation: String,
    pub model: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_estimate: f64,
    pub duration_ms: u64,
    pub success: bool,
    pub error_code: Option<String>,
}

/// Identifies the run every metric row belongs to.
#[derive(Debug, Clone, Copy)]
pub struct MetricContext {
    pub subject_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub request_id: Uuid,
}

impl MetricContext {
    pub fn invocation(&self, inv: &LlmInvocation) -> UsageMetric {
        UsageMetric {
            subject_id: self.subject_id,
            session_id: self.session_id,
            request_id: self.request_id,
            operation: inv.operation.to_string(),
            model: Some(MODEL.to_string()),
            input_tokens: inv.usage.input,
            output_tokens: inv.usage.output,
            cost_estimate: inv.usage.cost_estimate(),
            duration_ms: inv.duration_ms,
            success: true,
            error_code: None,
        }
    }

    /// The terminal row for a run, with totals across all its calls.
    pub fn outcome(&self, usage: TokenUsage, duration_ms: u64, error_code: Option<&str>) -> UsageMetric {
        UsageMetric {
            subject_id: self.subject_id,
            session_id: self.session_id,
            request_id: self.request_id,
            operation: "ingestion".to_string(),
            model: None,
            input_tokens: usage.input,
            output_tokens: usage.output,
            cost_estimate: usage.cost_estimate(),
            duration_ms,
            success: error_code.is_none(),
            error_code: error_code.map(str::to_string),
        }
    }
}

/// Appends rows in order. Metric failures are logged and never fail a run.
pub async fn record_all(sink: &Arc<dyn MetricsSink>, rows: &[UsageMetric]) {
    for row in rows {
        if let Err(e) = sink.record(row).await {
            warn!(operation = %row.operation, error = %e, "failed to record usage metric");
        }
    }
}
