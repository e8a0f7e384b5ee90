use async_trait::async_trait;

use crate::analysis::templates::{PromptTemplate, TemplateRepository};
use crate::db::{PgStore, StoreError};

#[async_trait]
impl TemplateRepository for PgStore {
    async fn find_template(
        &self,
        tenant_id: &str,
        kind: &str,
    ) -> Result<Option<PromptTemplate>, StoreError> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT system_prompt, body FROM prompt_templates WHERE tenant_id = $1 AND kind = $2",
        )
        .bind(tenant_id)
        .bind(kind)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(system, body)| PromptTemplate { system, body }))
    }
}
