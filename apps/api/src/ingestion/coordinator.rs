//! Ingestion Coordinator: one linear pipeline run per request.
//!
//! `started → downloading → extracting → analyzing → skills_extraction →
//! storing → completed`, any stage may go straight to `failed`. Input is
//! validated before any external call. Every failure is sanitized, written as
//! a `failed` status, recorded as a usage metric and returned as an
//! `IngestError`; raw internal detail never leaves this module.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analysis::Analyzer;
use crate::analysis::templates::TemplateRepository;
use crate::config::IngestionSettings;
use crate::db::StoreError;
use crate::documents::DocumentStore;
use crate::extraction::{DocumentFormat, TextExtractor};
use crate::ingestion::error::IngestError;
use crate::ingestion::metrics::{record_all, MetricContext, UsageMetric};
use crate::ingestion::persistence::persist;
use crate::ingestion::status::{IngestionStage, StatusTracker};
use crate::ingestion::store::{MetricsSink, ProfileStore, SessionStore};
use crate::llm_client::{LlmInvocation, ReasoningService, TokenUsage};
use crate::models::subject::{RequirementRow, SubjectRow};
use crate::sanitize::{
    sanitize_message, MSG_DOCUMENT_REQUIRED, MSG_SESSION_ID_REUSED, MSG_SOURCE_TAG_INVALID,
    MSG_SUBJECT_ID_INVALID, MSG_SUBJECT_REQUIRED, MSG_UNSUPPORTED_FORMAT,
};
use crate::skills::adapter::canonicalize_skills;
use crate::skills::matching::{match_score, PositionRequirement};

const MAX_SOURCE_TAG_CHARS: usize = 64;

/// One invocation of the pipeline, as received.
#[derive(Debug, Clone, Default)]
pub struct IngestionRequest {
    pub subject_id: String,
    pub document_ref: String,
    pub source_tag: String,
    pub template_override: Option<String>,
    pub session_item_ref: Option<String>,
    pub tenant_id: Option<String>,
    /// Pre-generated by a caller that wants to poll while the run is in flight.
    pub session_id: Option<Uuid>,
    pub request_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub session_id: Uuid,
    pub skills_extracted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<u32>,
    pub duration_ms: u64,
    pub token_usage: TokenUsage,
    pub cost_estimate: f64,
}

/// A request that passed validation.
struct ValidRequest<'a> {
    subject_id: Uuid,
    document_ref: &'a str,
    format: DocumentFormat,
}

pub struct IngestionCoordinator {
    profiles: Arc<dyn ProfileStore>,
    sessions: Arc<dyn SessionStore>,
    metrics: Arc<dyn MetricsSink>,
    documents: Arc<dyn DocumentStore>,
    extractor: TextExtractor,
    analyzer: Analyzer,
    settings: IngestionSettings,
}

impl IngestionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        sessions: Arc<dyn SessionStore>,
        metrics: Arc<dyn MetricsSink>,
        documents: Arc<dyn DocumentStore>,
        templates: Arc<dyn TemplateRepository>,
        reasoning: Arc<dyn ReasoningService>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            extractor: TextExtractor::new(reasoning.clone(), settings.min_text_chars),
            analyzer: Analyzer::new(reasoning, templates, settings.max_prompt_chars),
            profiles,
            sessions,
            metrics,
            documents,
            settings,
        }
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.profiles
    }

    pub async fn run(&self, request: IngestionRequest) -> Result<IngestionReport, IngestError> {
        let started = Instant::now();
        let session_id = request.session_id.unwrap_or_else(Uuid::new_v4);
        let mut ctx = MetricContext {
            subject_id: None,
            session_id: Some(session_id),
            request_id: request.request_id,
        };

        let valid = match validate(&request) {
            Ok(valid) => valid,
            Err(e) => return Err(self.reject(ctx, started, e).await),
        };
        ctx.subject_id = Some(valid.subject_id);

        let subject = match self.profiles.subject(valid.subject_id).await {
            Ok(Some(subject)) => subject,
            Ok(None) => {
                let e = IngestError::SubjectNotFound(valid.subject_id);
                return Err(self.reject(ctx, started, e).await);
            }
            Err(e) => return Err(self.reject(ctx, started, IngestError::Persistence(e)).await),
        };

        let tracker = StatusTracker::new(
            self.sessions.clone(),
            valid.subject_id,
            session_id,
            json!({
                "source_tag": request.source_tag,
                "document_ref": valid.document_ref,
                "request_id": request.request_id,
                "session_item_ref": request.session_item_ref,
            }),
            self.settings.status_update_cap,
            self.settings.status_write_timeout,
        );

        let stale_before = chrono::Utc::now() - self.settings.stale_session;
        if let Err(e) = tracker.begin(stale_before).await {
            let e = match e {
                StoreError::ActiveSession => IngestError::SessionActive(valid.subject_id),
                StoreError::Duplicate(_) => IngestError::Validation(MSG_SESSION_ID_REUSED.into()),
                other => IngestError::Persistence(other),
            };
            return Err(self.reject(ctx, started, e).await);
        }

        info!(
            subject_id = %valid.subject_id,
            session_id = %session_id,
            request_id = %request.request_id,
            source_tag = %request.source_tag,
            "ingestion started"
        );

        let mut invocations = Vec::new();
        let result = self
            .execute(&tracker, &subject, &valid, &request, &mut invocations)
            .await;

        let usage = total_usage(&invocations);
        let duration_ms = started.elapsed().as_millis() as u64;
        let mut rows: Vec<UsageMetric> = invocations.iter().map(|i| ctx.invocation(i)).collect();

        match result {
            Ok((skills_extracted, match_score)) => {
                rows.push(ctx.outcome(usage, duration_ms, None));
                record_all(&self.metrics, &rows).await;
                info!(
                    subject_id = %valid.subject_id,
                    session_id = %session_id,
                    skills_extracted,
                    duration_ms,
                    "ingestion completed"
                );
                Ok(IngestionReport {
                    session_id,
                    skills_extracted,
                    match_score,
                    duration_ms,
                    token_usage: usage,
                    cost_estimate: usage.cost_estimate(),
                })
            }
            Err(e) => {
                tracker.fail(&e.user_message()).await;
                rows.push(ctx.outcome(usage, duration_ms, Some(e.kind().code())));
                record_all(&self.metrics, &rows).await;
                log_failure(&ctx, &e);
                Err(e)
            }
        }
    }

    /// The stages after `started`. Returns the skill count and match score.
    async fn execute(
        &self,
        tracker: &StatusTracker,
        subject: &SubjectRow,
        valid: &ValidRequest<'_>,
        request: &IngestionRequest,
        invocations: &mut Vec<LlmInvocation>,
    ) -> Result<(usize, Option<u32>), IngestError> {
        tracker
            .report(IngestionStage::Downloading, "Downloading document")
            .await;
        let bytes = self
            .within(IngestionStage::Downloading, async {
                self.documents
                    .get(valid.document_ref)
                    .await
                    .map_err(|e| match e {
                        StoreError::NotFound(_) => {
                            IngestError::DocumentNotFound(valid.document_ref.to_string())
                        }
                        other => IngestError::Download(other),
                    })
            })
            .await?;

        tracker
            .report(IngestionStage::Extracting, "Extracting text")
            .await;
        let extracted = self
            .within(
                IngestionStage::Extracting,
                self.extractor.extract(bytes, valid.format),
            )
            .await?;
        invocations.extend(extracted.invocation.clone());

        tracker
            .report(IngestionStage::Analyzing, "Analyzing resume")
            .await;
        let tenant_id = request.tenant_id.as_deref().or(subject.tenant_id.as_deref());
        let outcome = self
            .within(
                IngestionStage::Analyzing,
                self.analyzer.analyze(
                    &extracted.text,
                    tenant_id,
                    request.template_override.as_deref(),
                ),
            )
            .await?;
        invocations.extend(outcome.invocations.iter().cloned());

        tracker
            .report(IngestionStage::SkillsExtraction, "Normalizing skills")
            .await;
        let skills = canonicalize_skills(&outcome.profile.skills);
        let score = match subject.position_id {
            Some(position_id) => {
                let requirements = self
                    .profiles
                    .position_requirements(position_id)
                    .await
                    .map_err(IngestError::Persistence)?;
                match_score(&to_requirements(requirements), &skills)
            }
            None => None,
        };

        tracker.report(IngestionStage::Storing, "Saving results").await;
        persist(self.profiles.as_ref(), subject, &outcome.profile, &skills, score)
            .await
            .map_err(IngestError::Persistence)?;

        tracker.complete("Ingestion completed").await;
        Ok((skills.len(), score))
    }

    /// Runs one stage under the configured deadline.
    async fn within<T, E, F>(&self, stage: IngestionStage, fut: F) -> Result<T, IngestError>
    where
        F: Future<Output = Result<T, E>>,
        IngestError: From<E>,
    {
        match tokio::time::timeout(self.settings.stage_timeout, fut).await {
            Ok(result) => result.map_err(IngestError::from),
            Err(_) => Err(IngestError::Timeout {
                stage: stage.as_str(),
                secs: self.settings.stage_timeout.as_secs(),
            }),
        }
    }

    /// Failure before a session exists: no status row, but still metered.
    async fn reject(&self, ctx: MetricContext, started: Instant, e: IngestError) -> IngestError {
        let duration_ms = started.elapsed().as_millis() as u64;
        let row = ctx.outcome(TokenUsage::default(), duration_ms, Some(e.kind().code()));
        record_all(&self.metrics, &[row]).await;
        log_failure(&ctx, &e);
        e
    }
}

fn validate(request: &IngestionRequest) -> Result<ValidRequest<'_>, IngestError> {
    let subject = request.subject_id.trim();
    if subject.is_empty() {
        return Err(IngestError::Validation(MSG_SUBJECT_REQUIRED.into()));
    }
    let subject_id = Uuid::parse_str(subject)
        .map_err(|_| IngestError::Validation(MSG_SUBJECT_ID_INVALID.into()))?;

    let document_ref = request.document_ref.trim();
    if document_ref.is_empty() {
        return Err(IngestError::Validation(MSG_DOCUMENT_REQUIRED.into()));
    }
    let format = DocumentFormat::from_path(document_ref)
        .ok_or_else(|| IngestError::Validation(MSG_UNSUPPORTED_FORMAT.into()))?;

    let tag = request.source_tag.trim();
    if tag.is_empty() || tag.chars().count() > MAX_SOURCE_TAG_CHARS {
        return Err(IngestError::Validation(MSG_SOURCE_TAG_INVALID.into()));
    }

    Ok(ValidRequest {
        subject_id,
        document_ref,
        format,
    })
}

fn to_requirements(rows: Vec<RequirementRow>) -> Vec<PositionRequirement> {
    rows.into_iter()
        .map(|r| PositionRequirement {
            skill_name: r.skill_name,
            required_level: r.required_level.map(Value::String).unwrap_or(Value::Null),
        })
        .collect()
}

fn total_usage(invocations: &[LlmInvocation]) -> TokenUsage {
    let mut usage = TokenUsage::default();
    for inv in invocations {
        usage.add(inv.usage);
    }
    usage
}

fn log_failure(ctx: &MetricContext, e: &IngestError) {
    let kind = e.kind();
    let message = sanitize_message(&e.to_string());
    if kind.status_code().is_server_error() {
        error!(
            subject_id = ?ctx.subject_id,
            session_id = ?ctx.session_id,
            request_id = %ctx.request_id,
            code = kind.code(),
            error = %message,
            "ingestion failed"
        );
    } else {
        warn!(
            subject_id = ?ctx.subject_id,
            session_id = ?ctx.session_id,
            request_id = %ctx.request_id,
            code = kind.code(),
            error = %message,
            "ingestion rejected"
        );
    }
}
