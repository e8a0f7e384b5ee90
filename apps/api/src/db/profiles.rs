use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::analysis::StructuredProfile;
use crate::db::{PgStore, StoreError};
use crate::ingestion::store::ProfileStore;
use crate::models::subject::{DocumentRow, RequirementRow, SkillLevelRow, SubjectRow};
use crate::skills::adapter::CanonicalSkill;
use crate::skills::proficiency::Proficiency;
use crate::skills::SkillSource;

const PLACEHOLDER_POSITION_TITLE: &str = "Unassigned";

#[async_trait]
impl ProfileStore for PgStore {
    async fn subject(&self, subject_id: Uuid) -> Result<Option<SubjectRow>, StoreError> {
        Ok(sqlx::query_as::<_, SubjectRow>(
            "SELECT id, tenant_id, position_id, current_document_id FROM subjects WHERE id = $1",
        )
        .bind(subject_id)
        .fetch_optional(self.pool())
        .await?)
    }

    async fn ensure_subject(
        &self,
        subject_id: Uuid,
        tenant_id: Option<&str>,
    ) -> Result<SubjectRow, StoreError> {
        Ok(sqlx::query_as::<_, SubjectRow>(
            r#"
            INSERT INTO subjects (id, tenant_id)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE
                SET tenant_id = COALESCE(subjects.tenant_id, EXCLUDED.tenant_id)
            RETURNING id, tenant_id, position_id, current_document_id
            "#,
        )
        .bind(subject_id)
        .bind(tenant_id)
        .fetch_one(self.pool())
        .await?)
    }

    async fn ensure_position(&self, subject_id: Uuid) -> Result<Uuid, StoreError> {
        let mut tx = self.pool().begin().await?;

        let current: Option<(Option<Uuid>,)> =
            sqlx::query_as("SELECT position_id FROM subjects WHERE id = $1 FOR UPDATE")
                .bind(subject_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((current,)) = current else {
            return Err(StoreError::NotFound(format!("subject {subject_id}")));
        };
        if let Some(position_id) = current {
            return Ok(position_id);
        }

        sqlx::query(
            r#"
            INSERT INTO positions (id, title, is_placeholder)
            VALUES ($1, $2, TRUE)
            ON CONFLICT (is_placeholder) WHERE is_placeholder DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(PLACEHOLDER_POSITION_TITLE)
        .execute(&mut *tx)
        .await?;

        let position_id: Uuid =
            sqlx::query_scalar("SELECT id FROM positions WHERE is_placeholder")
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query("UPDATE subjects SET position_id = $2 WHERE id = $1")
            .bind(subject_id)
            .bind(position_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(subject_id = %subject_id, position_id = %position_id, "assigned placeholder position");
        Ok(position_id)
    }

    async fn position_requirements(
        &self,
        position_id: Uuid,
    ) -> Result<Vec<RequirementRow>, StoreError> {
        Ok(sqlx::query_as::<_, RequirementRow>(
            "SELECT skill_name, required_level FROM position_requirements WHERE position_id = $1",
        )
        .bind(position_id)
        .fetch_all(self.pool())
        .await?)
    }

    async fn record_document(&self, document: &DocumentRow) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, subject_id, storage_key, format, original_filename, size_bytes, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(document.id)
        .bind(document.subject_id)
        .bind(&document.storage_key)
        .bind(&document.format)
        .bind(&document.original_filename)
        .bind(document.size_bytes)
        .bind(document.uploaded_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE subjects SET current_document_id = $2 WHERE id = $1")
            .bind(document.subject_id)
            .bind(document.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn current_document(&self, subject_id: Uuid) -> Result<Option<DocumentRow>, StoreError> {
        Ok(sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT d.id, d.subject_id, d.storage_key, d.format, d.original_filename,
                   d.size_bytes, d.uploaded_at
            FROM subjects s
            JOIN documents d ON d.id = s.current_document_id
            WHERE s.id = $1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(self.pool())
        .await?)
    }

    async fn documents_for_subject(&self, subject_id: Uuid) -> Result<Vec<DocumentRow>, StoreError> {
        Ok(sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, subject_id, storage_key, format, original_filename, size_bytes, uploaded_at
            FROM documents
            WHERE subject_id = $1
            ORDER BY uploaded_at
            "#,
        )
        .bind(subject_id)
        .fetch_all(self.pool())
        .await?)
    }

    async fn delete_documents(&self, subject_id: Uuid) -> Result<u64, StoreError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("UPDATE subjects SET current_document_id = NULL WHERE id = $1")
            .bind(subject_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM documents WHERE subject_id = $1")
            .bind(subject_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted)
    }

    async fn upsert_profile(
        &self,
        subject_id: Uuid,
        profile: &StructuredProfile,
        match_score: Option<u32>,
    ) -> Result<(), StoreError> {
        // scalars merge, imported sections are replaced wholesale
        sqlx::query(
            r#"
            INSERT INTO subject_profiles
                (subject_id, full_name, email, phone, location, summary,
                 total_experience_years, match_score, work_experience, education,
                 certifications, languages, imported_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now())
            ON CONFLICT (subject_id) DO UPDATE SET
                full_name = COALESCE(EXCLUDED.full_name, subject_profiles.full_name),
                email = COALESCE(EXCLUDED.email, subject_profiles.email),
                phone = COALESCE(EXCLUDED.phone, subject_profiles.phone),
                location = COALESCE(EXCLUDED.location, subject_profiles.location),
                summary = COALESCE(EXCLUDED.summary, subject_profiles.summary),
                total_experience_years = COALESCE(EXCLUDED.total_experience_years,
                                                  subject_profiles.total_experience_years),
                match_score = COALESCE(EXCLUDED.match_score, subject_profiles.match_score),
                work_experience = EXCLUDED.work_experience,
                education = EXCLUDED.education,
                certifications = EXCLUDED.certifications,
                languages = EXCLUDED.languages,
                imported_at = now(),
                updated_at = now()
            "#,
        )
        .bind(subject_id)
        .bind(&profile.personal.full_name)
        .bind(&profile.personal.email)
        .bind(&profile.personal.phone)
        .bind(&profile.personal.location)
        .bind(&profile.summary)
        .bind(profile.total_experience_years)
        .bind(match_score.map(|s| s.min(100) as i32))
        .bind(Json(&profile.work_experience))
        .bind(Json(&profile.education))
        .bind(Json(&profile.certifications))
        .bind(Json(&profile.languages))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn clear_profile_scores(&self, subject_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE subject_profiles
            SET match_score = NULL, total_experience_years = NULL, updated_at = now()
            WHERE subject_id = $1
            "#,
        )
        .bind(subject_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn clear_profile_sections(&self, subject_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE subject_profiles
            SET summary = NULL, work_experience = NULL, education = NULL,
                certifications = NULL, languages = NULL, imported_at = NULL,
                updated_at = now()
            WHERE subject_id = $1
            "#,
        )
        .bind(subject_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn replace_skills(
        &self,
        subject_id: Uuid,
        position_id: Uuid,
        source: SkillSource,
        skills: &[CanonicalSkill],
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM skills WHERE subject_id = $1 AND source = $2")
            .bind(subject_id)
            .bind(source.as_str())
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0;
        if !skills.is_empty() {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO skills (id, subject_id, position_id, name, proficiency, \
                 raw_proficiency, years_experience, source, evidence) ",
            );
            qb.push_values(skills, |mut row, skill| {
                row.push_bind(Uuid::new_v4())
                    .push_bind(subject_id)
                    .push_bind(position_id)
                    .push_bind(skill.name.clone())
                    .push_bind(i16::from(skill.proficiency.level()))
                    .push_bind(skill.raw_proficiency.clone())
                    .push_bind(skill.years_experience)
                    .push_bind(source.as_str())
                    .push_bind(skill.evidence.clone());
            });
            inserted = qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn delete_skills(&self, subject_id: Uuid, source: SkillSource) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM skills WHERE subject_id = $1 AND source = $2")
            .bind(subject_id)
            .bind(source.as_str())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn skill_levels(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<SkillLevelRow>, StoreError> {
        Ok(sqlx::query_as::<_, SkillLevelRow>(
            r#"
            SELECT id, proficiency, raw_proficiency
            FROM skills
            WHERE $1::uuid IS NULL OR id > $1
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(limit)
        .fetch_all(self.pool())
        .await?)
    }

    async fn set_skill_proficiency(
        &self,
        skill_id: Uuid,
        proficiency: Proficiency,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE skills SET proficiency = $2, updated_at = now() WHERE id = $1")
            .bind(skill_id)
            .bind(i16::from(proficiency.level()))
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
