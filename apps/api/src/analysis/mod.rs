//! Structured Analysis Stage: resume text in, typed profile out.
//!
//! One reasoning-service call with the resolved template, then defensive
//! parsing:
//! 1. strict JSON parse
//! 2. fence stripping + `{`…`}` span repair
//! 3. a single retry with a stricter "JSON only" prompt
//!
//! Keys are normalized before anything reads them. When work history or
//! education is missing, a narrower follow-up prompt fills just those arrays;
//! that follow-up is best-effort.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{LlmError, LlmInvocation, ReasoningService};
use crate::skills::adapter::RawSkill;

pub mod normalize;
pub mod prompts;
pub mod repair;
pub mod templates;

use prompts::{SECTIONS_PROMPT, STRICT_RETRY_PROMPT};
use repair::parse_model_json;
use templates::{TemplateRepository, RESUME_TEXT_PLACEHOLDER};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("resume text is empty")]
    EmptyInput,

    #[error("reasoning service call failed: {0}")]
    Provider(#[from] LlmError),

    #[error("reasoning service output could not be parsed: {0}")]
    Unparseable(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkEntry {
    pub title: String,
    pub company: String,
    /// One of `normalize::DURATION_BUCKETS`.
    pub duration: String,
    pub duration_raw: Option<String>,
    pub description: Option<String>,
    pub responsibilities: Vec<String>,
    pub achievements: Vec<String>,
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    pub degree: String,
    pub field_of_study: String,
    pub institution: String,
    pub year: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredProfile {
    pub personal: PersonalInfo,
    pub summary: Option<String>,
    pub work_experience: Vec<WorkEntry>,
    pub education: Vec<EducationEntry>,
    pub certifications: Vec<String>,
    pub languages: Vec<String>,
    pub skills: Vec<RawSkill>,
    pub total_experience_years: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub profile: StructuredProfile,
    /// Every reasoning-service call made, in order.
    pub invocations: Vec<LlmInvocation>,
}

pub struct Analyzer {
    reasoning: Arc<dyn ReasoningService>,
    templates: Arc<dyn TemplateRepository>,
    max_prompt_chars: usize,
}

impl Analyzer {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        templates: Arc<dyn TemplateRepository>,
        max_prompt_chars: usize,
    ) -> Self {
        Self {
            reasoning,
            templates,
            max_prompt_chars,
        }
    }

    pub async fn analyze(
        &self,
        raw_text: &str,
        tenant_id: Option<&str>,
        template_override: Option<&str>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let text = truncate_chars(raw_text.trim(), self.max_prompt_chars);
        if text.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }

        let template = templates::resolve(self.templates.as_ref(), tenant_id, template_override).await;
        let mut invocations = Vec::new();

        let completion = self
            .reasoning
            .complete(&template.render(text), &template.system)
            .await?;
        invocations.push(LlmInvocation::from_completion("analyze", &completion));

        let mut strict_retry = false;
        let (parsed, parse_layer) = match parse_model_json(&completion.text) {
            Ok(parsed) => parsed,
            Err(first) => {
                warn!(error = %first, "analysis output unparseable, retrying with strict prompt");
                strict_retry = true;
                let retry = self
                    .reasoning
                    .complete(&STRICT_RETRY_PROMPT.replace(RESUME_TEXT_PLACEHOLDER, text), JSON_ONLY_SYSTEM)
                    .await?;
                invocations.push(LlmInvocation::from_completion("analyze_strict_retry", &retry));
                parse_model_json(&retry.text)
                    .map_err(|e| AnalysisError::Unparseable(e.to_string()))?
            }
        };

        let mut value = normalize::normalize_keys(parsed);

        if normalize::missing_sections(&value) {
            match self.fetch_sections(text).await {
                Ok((sections, invocation)) => {
                    invocations.push(invocation);
                    normalize::merge_sections(&mut value, &sections);
                }
                Err(e) => warn!(error = %e, "sections follow-up failed, continuing without it"),
            }
        }

        let (profile, rejected) = normalize::build_profile(&value);
        for e in &rejected {
            warn!(error = %e, "dropped unresolvable skill entry");
        }

        info!(
            skills = profile.skills.len(),
            work_entries = profile.work_experience.len(),
            education_entries = profile.education.len(),
            parse_layer = ?parse_layer,
            strict_retry,
            "analysis complete"
        );

        Ok(AnalysisOutcome {
            profile,
            invocations,
        })
    }

    async fn fetch_sections(&self, text: &str) -> Result<(Value, LlmInvocation), AnalysisError> {
        let completion = self
            .reasoning
            .complete(&SECTIONS_PROMPT.replace(RESUME_TEXT_PLACEHOLDER, text), JSON_ONLY_SYSTEM)
            .await?;
        let invocation = LlmInvocation::from_completion("analyze_sections", &completion);
        let (value, _) = parse_model_json(&completion.text)
            .map_err(|e| AnalysisError::Unparseable(e.to_string()))?;
        Ok((normalize::normalize_keys(value), invocation))
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => {
            warn!(max_chars = max, "resume text truncated before prompting");
            &text[..idx]
        }
        None => text,
    }
}
