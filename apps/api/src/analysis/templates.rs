//! Prompt templates for the analysis stage, loaded per tenant.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::analysis::prompts::{DEFAULT_ANALYSIS_SYSTEM, DEFAULT_ANALYSIS_TEMPLATE};
use crate::db::StoreError;

pub const RESUME_TEXT_PLACEHOLDER: &str = "{resume_text}";
pub const ANALYSIS_TEMPLATE_KIND: &str = "analysis";

#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    pub system: String,
    pub body: String,
}

impl PromptTemplate {
    pub fn default_analysis() -> Self {
        Self {
            system: DEFAULT_ANALYSIS_SYSTEM.to_string(),
            body: DEFAULT_ANALYSIS_TEMPLATE.to_string(),
        }
    }

    /// Substitutes the resume text. Bodies without the placeholder get the
    /// text appended so a tenant template can never drop the resume.
    pub fn render(&self, resume_text: &str) -> String {
        if self.body.contains(RESUME_TEXT_PLACEHOLDER) {
            self.body.replace(RESUME_TEXT_PLACEHOLDER, resume_text)
        } else {
            format!("{}\n\nRESUME TEXT:\n{}", self.body, resume_text)
        }
    }
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn find_template(
        &self,
        tenant_id: &str,
        kind: &str,
    ) -> Result<Option<PromptTemplate>, StoreError>;
}

/// Picks the analysis template: explicit override, then the tenant's stored
/// template, then the built-in default. A failing lookup falls back to the
/// default rather than failing the run.
pub async fn resolve(
    repo: &dyn TemplateRepository,
    tenant_id: Option<&str>,
    template_override: Option<&str>,
) -> PromptTemplate {
    if let Some(body) = template_override.map(str::trim).filter(|b| !b.is_empty()) {
        debug!("using request template override");
        return PromptTemplate {
            system: DEFAULT_ANALYSIS_SYSTEM.to_string(),
            body: body.to_string(),
        };
    }

    if let Some(tenant) = tenant_id {
        match repo.find_template(tenant, ANALYSIS_TEMPLATE_KIND).await {
            Ok(Some(template)) => {
                debug!(tenant_id = tenant, "using tenant analysis template");
                return template;
            }
            Ok(None) => {}
            Err(e) => warn!(tenant_id = tenant, error = %e, "template lookup failed, using default"),
        }
    }

    PromptTemplate::default_analysis()
}
