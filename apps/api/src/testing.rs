//! In-memory doubles for every storage seam plus a scripted reasoning service.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::analysis::templates::{PromptTemplate, TemplateRepository};
use crate::analysis::StructuredProfile;
use crate::batch::{BatchJobStore, BatchStatus, NewBatchJob};
use crate::config::{Config, IngestionSettings};
use crate::db::StoreError;
use crate::documents::DocumentStore;
use crate::extraction::DocumentFormat;
use crate::ingestion::coordinator::IngestionCoordinator;
use crate::ingestion::metrics::UsageMetric;
use crate::ingestion::status::{IngestionStage, StatusUpdate};
use crate::ingestion::store::{MetricsSink, ProfileStore, SessionStore};
use crate::llm_client::{Attachment, Completion, LlmError, ReasoningService, TokenUsage};
use crate::models::batch::BatchJobRow;
use crate::models::session::SessionRow;
use crate::models::subject::{DocumentRow, RequirementRow, SkillLevelRow, SubjectRow};
use crate::skills::adapter::CanonicalSkill;
use crate::skills::proficiency::Proficiency;
use crate::skills::SkillSource;
use crate::state::{AppState, Stores};

const SCRIPTED_USAGE: TokenUsage = TokenUsage {
    input: 1_200,
    output: 400,
};

/// Replays canned responses in order. Runs out into `LlmError::EmptyContent`.
pub struct ScriptedReasoner {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
    systems: Mutex<Vec<String>>,
    media_types: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedReasoner {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            systems: Mutex::new(Vec::new()),
            media_types: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn systems(&self) -> Vec<String> {
        self.systems.lock().unwrap().clone()
    }

    pub fn attachment_media_types(&self) -> Vec<String> {
        self.media_types.lock().unwrap().clone()
    }

    async fn next(&self, prompt: &str, system: &str) -> Result<Completion, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.systems.lock().unwrap().push(system.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyContent));
        next.map(|text| Completion {
            text,
            usage: SCRIPTED_USAGE,
            duration_ms: 850,
        })
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn complete(&self, prompt: &str, system: &str) -> Result<Completion, LlmError> {
        self.next(prompt, system).await
    }

    async fn transcribe(
        &self,
        attachment: Attachment<'_>,
        prompt: &str,
        system: &str,
    ) -> Result<Completion, LlmError> {
        self.media_types
            .lock()
            .unwrap()
            .push(attachment.media_type.to_string());
        self.next(prompt, system).await
    }
}

#[derive(Default)]
pub struct InMemoryTemplates {
    templates: Mutex<HashMap<(String, String), PromptTemplate>>,
    failing: AtomicBool,
}

impl InMemoryTemplates {
    pub fn insert(&self, tenant_id: &str, kind: &str, template: PromptTemplate) {
        self.templates
            .lock()
            .unwrap()
            .insert((tenant_id.to_string(), kind.to_string()), template);
    }

    pub fn fail_lookups(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplates {
    async fn find_template(
        &self,
        tenant_id: &str,
        kind: &str,
    ) -> Result<Option<PromptTemplate>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("templates offline".into()));
        }
        Ok(self
            .templates
            .lock()
            .unwrap()
            .get(&(tenant_id.to_string(), kind.to_string()))
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemorySessions {
    rows: Mutex<HashMap<(Uuid, Uuid), SessionRow>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_upserts: AtomicBool,
    failing_finishes: AtomicUsize,
}

impl InMemorySessions {
    pub fn all(&self) -> Vec<SessionRow> {
        let mut rows: Vec<_> = self.rows.lock().unwrap().values().cloned().collect();
        rows.sort_by_key(|r| r.updated_at);
        rows
    }

    pub fn for_subject(&self, subject_id: Uuid) -> Vec<SessionRow> {
        self.all()
            .into_iter()
            .filter(|r| r.subject_id == subject_id)
            .collect()
    }

    pub fn get_row(&self, subject_id: Uuid, session_id: Uuid) -> Option<SessionRow> {
        self.rows
            .lock()
            .unwrap()
            .get(&(subject_id, session_id))
            .cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Fails every write, including deletes.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fails only progress upserts; `begin` and `finish` still land.
    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Fails the next `n` terminal writes, then lets them through.
    pub fn fail_next_finishes(&self, n: usize) {
        self.failing_finishes.store(n, Ordering::SeqCst);
    }

    pub fn insert_active(&self, subject_id: Uuid, session_id: Uuid, updated_at: DateTime<Utc>) {
        self.rows.lock().unwrap().insert(
            (subject_id, session_id),
            SessionRow {
                subject_id,
                session_id,
                status: IngestionStage::Analyzing.as_str().to_string(),
                progress: 45,
                message: "Analyzing resume".to_string(),
                metadata: json!({}),
                updated_at,
            },
        );
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("sessions table offline".into()));
        }
        Ok(())
    }
}

fn session_row(update: &StatusUpdate) -> SessionRow {
    SessionRow {
        subject_id: update.subject_id,
        session_id: update.session_id,
        status: update.stage.as_str().to_string(),
        progress: i16::from(update.progress),
        message: update.message.clone(),
        metadata: update.metadata.clone(),
        updated_at: Utc::now(),
    }
}

fn is_active(row: &SessionRow) -> bool {
    row.status != "completed" && row.status != "failed"
}

#[async_trait]
impl SessionStore for InMemorySessions {
    async fn begin(
        &self,
        update: &StatusUpdate,
        stale_before: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        for row in rows.values_mut() {
            if row.subject_id == update.subject_id && is_active(row) && row.updated_at < stale_before {
                row.status = IngestionStage::Failed.as_str().to_string();
                row.message = "Session abandoned".to_string();
                row.updated_at = Utc::now();
            }
        }
        if rows.contains_key(&(update.subject_id, update.session_id)) {
            return Err(StoreError::Duplicate("ingestion_sessions_pkey"));
        }
        if rows
            .values()
            .any(|r| r.subject_id == update.subject_id && is_active(r))
        {
            return Err(StoreError::ActiveSession);
        }
        rows.insert((update.subject_id, update.session_id), session_row(update));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert(&self, update: &StatusUpdate) -> Result<(), StoreError> {
        self.check_writable()?;
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("sessions table offline".into()));
        }
        self.rows
            .lock()
            .unwrap()
            .insert((update.subject_id, update.session_id), session_row(update));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(&self, update: &StatusUpdate) -> Result<(), StoreError> {
        self.check_writable()?;
        let pending = self.failing_finishes.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_finishes.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("sessions table offline".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&(update.subject_id, update.session_id))
            .ok_or_else(|| StoreError::NotFound(format!("session {}", update.session_id)))?;
        *row = session_row(update);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(
        &self,
        subject_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<SessionRow>, StoreError> {
        Ok(self.get_row(subject_id, session_id))
    }

    async fn delete_for_subject(&self, subject_id: Uuid) -> Result<u64, StoreError> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(subject, _), _| *subject != subject_id);
        Ok((before - rows.len()) as u64)
    }
}

/// A stored skill as the in-memory profile store keeps it.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillRow {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub name: String,
    pub proficiency: i16,
    pub raw_proficiency: Option<String>,
    pub years_experience: Option<f32>,
    pub source: String,
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct StoredProfile {
    profile: StructuredProfile,
    match_score: Option<u32>,
}

#[derive(Default)]
struct ProfilesState {
    subjects: HashMap<Uuid, SubjectRow>,
    placeholder: Option<Uuid>,
    requirements: HashMap<Uuid, Vec<RequirementRow>>,
    documents: Vec<DocumentRow>,
    profiles: HashMap<Uuid, StoredProfile>,
    skills: Vec<SkillRow>,
}

#[derive(Default)]
pub struct InMemoryProfiles {
    state: Mutex<ProfilesState>,
}

impl InMemoryProfiles {
    pub fn insert_subject(&self, id: Uuid, tenant_id: Option<&str>) -> SubjectRow {
        let row = SubjectRow {
            id,
            tenant_id: tenant_id.map(str::to_string),
            position_id: None,
            current_document_id: None,
        };
        self.state.lock().unwrap().subjects.insert(id, row.clone());
        row
    }

    pub fn subject_row(&self, id: Uuid) -> Option<SubjectRow> {
        self.state.lock().unwrap().subjects.get(&id).cloned()
    }

    pub fn placeholder_count(&self) -> usize {
        usize::from(self.state.lock().unwrap().placeholder.is_some())
    }

    pub fn add_requirement(&self, position_id: Uuid, skill_name: &str, level: Option<&str>) {
        self.state
            .lock()
            .unwrap()
            .requirements
            .entry(position_id)
            .or_default()
            .push(RequirementRow {
                skill_name: skill_name.to_string(),
                required_level: level.map(str::to_string),
            });
    }

    pub fn insert_skill(&self, subject_id: Uuid, name: &str, level: Proficiency, source: SkillSource) {
        self.insert_raw_skill(subject_id, name, i16::from(level.level()), None, source);
    }

    /// Inserts a row as-is, including off-scale levels left by older writers.
    pub fn insert_raw_skill(
        &self,
        subject_id: Uuid,
        name: &str,
        proficiency: i16,
        raw: Option<&str>,
        source: SkillSource,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().skills.push(SkillRow {
            id,
            subject_id,
            name: name.to_string(),
            proficiency,
            raw_proficiency: raw.map(str::to_string),
            years_experience: None,
            source: source.as_str().to_string(),
            evidence: None,
        });
        id
    }

    pub fn skills(&self, subject_id: Uuid, source: SkillSource) -> Vec<SkillRow> {
        self.state
            .lock()
            .unwrap()
            .skills
            .iter()
            .filter(|s| s.subject_id == subject_id && s.source == source.as_str())
            .cloned()
            .collect()
    }

    pub fn skill_count(&self, subject_id: Uuid, source: SkillSource) -> usize {
        self.skills(subject_id, source).len()
    }

    pub fn proficiency_of(&self, skill_id: Uuid) -> Option<i16> {
        self.state
            .lock()
            .unwrap()
            .skills
            .iter()
            .find(|s| s.id == skill_id)
            .map(|s| s.proficiency)
    }

    pub fn match_score(&self, subject_id: Uuid) -> Option<u32> {
        self.state
            .lock()
            .unwrap()
            .profiles
            .get(&subject_id)
            .and_then(|p| p.match_score)
    }

    pub fn profile(&self, subject_id: Uuid) -> Option<StructuredProfile> {
        self.state
            .lock()
            .unwrap()
            .profiles
            .get(&subject_id)
            .map(|p| p.profile.clone())
    }
}

fn merge_opt<T: Clone>(stored: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        *stored = incoming.clone();
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfiles {
    async fn subject(&self, subject_id: Uuid) -> Result<Option<SubjectRow>, StoreError> {
        Ok(self.subject_row(subject_id))
    }

    async fn ensure_subject(
        &self,
        subject_id: Uuid,
        tenant_id: Option<&str>,
    ) -> Result<SubjectRow, StoreError> {
        let mut state = self.state.lock().unwrap();
        let row = state.subjects.entry(subject_id).or_insert_with(|| SubjectRow {
            id: subject_id,
            tenant_id: None,
            position_id: None,
            current_document_id: None,
        });
        if row.tenant_id.is_none() {
            row.tenant_id = tenant_id.map(str::to_string);
        }
        Ok(row.clone())
    }

    async fn ensure_position(&self, subject_id: Uuid) -> Result<Uuid, StoreError> {
        let mut state = self.state.lock().unwrap();
        let placeholder = *state.placeholder.get_or_insert_with(Uuid::new_v4);
        let subject = state
            .subjects
            .get_mut(&subject_id)
            .ok_or_else(|| StoreError::NotFound(format!("subject {subject_id}")))?;
        Ok(*subject.position_id.get_or_insert(placeholder))
    }

    async fn position_requirements(
        &self,
        position_id: Uuid,
    ) -> Result<Vec<RequirementRow>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .requirements
            .get(&position_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_document(&self, document: &DocumentRow) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.documents.push(document.clone());
        if let Some(subject) = state.subjects.get_mut(&document.subject_id) {
            subject.current_document_id = Some(document.id);
        }
        Ok(())
    }

    async fn current_document(&self, subject_id: Uuid) -> Result<Option<DocumentRow>, StoreError> {
        let state = self.state.lock().unwrap();
        let current = state
            .subjects
            .get(&subject_id)
            .and_then(|s| s.current_document_id);
        Ok(current.and_then(|id| state.documents.iter().find(|d| d.id == id).cloned()))
    }

    async fn documents_for_subject(&self, subject_id: Uuid) -> Result<Vec<DocumentRow>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .documents
            .iter()
            .filter(|d| d.subject_id == subject_id)
            .cloned()
            .collect())
    }

    async fn delete_documents(&self, subject_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(subject) = state.subjects.get_mut(&subject_id) {
            subject.current_document_id = None;
        }
        let before = state.documents.len();
        state.documents.retain(|d| d.subject_id != subject_id);
        Ok((before - state.documents.len()) as u64)
    }

    async fn upsert_profile(
        &self,
        subject_id: Uuid,
        profile: &StructuredProfile,
        match_score: Option<u32>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let stored = state.profiles.entry(subject_id).or_default();
        let p = &mut stored.profile;
        merge_opt(&mut p.personal.full_name, &profile.personal.full_name);
        merge_opt(&mut p.personal.email, &profile.personal.email);
        merge_opt(&mut p.personal.phone, &profile.personal.phone);
        merge_opt(&mut p.personal.location, &profile.personal.location);
        merge_opt(&mut p.summary, &profile.summary);
        merge_opt(&mut p.total_experience_years, &profile.total_experience_years);
        p.work_experience = profile.work_experience.clone();
        p.education = profile.education.clone();
        p.certifications = profile.certifications.clone();
        p.languages = profile.languages.clone();
        merge_opt(&mut stored.match_score, &match_score);
        Ok(())
    }

    async fn clear_profile_scores(&self, subject_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        Ok(match state.profiles.get_mut(&subject_id) {
            Some(stored) => {
                stored.match_score = None;
                stored.profile.total_experience_years = None;
                1
            }
            None => 0,
        })
    }

    async fn clear_profile_sections(&self, subject_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        Ok(match state.profiles.get_mut(&subject_id) {
            Some(stored) => {
                let p = &mut stored.profile;
                p.summary = None;
                p.work_experience.clear();
                p.education.clear();
                p.certifications.clear();
                p.languages.clear();
                1
            }
            None => 0,
        })
    }

    async fn replace_skills(
        &self,
        subject_id: Uuid,
        _position_id: Uuid,
        source: SkillSource,
        skills: &[CanonicalSkill],
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .skills
            .retain(|s| !(s.subject_id == subject_id && s.source == source.as_str()));
        for skill in skills {
            state.skills.push(SkillRow {
                id: Uuid::new_v4(),
                subject_id,
                name: skill.name.clone(),
                proficiency: i16::from(skill.proficiency.level()),
                raw_proficiency: skill.raw_proficiency.clone(),
                years_experience: skill.years_experience,
                source: source.as_str().to_string(),
                evidence: skill.evidence.clone(),
            });
        }
        Ok(skills.len() as u64)
    }

    async fn delete_skills(&self, subject_id: Uuid, source: SkillSource) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let before = state.skills.len();
        state
            .skills
            .retain(|s| !(s.subject_id == subject_id && s.source == source.as_str()));
        Ok((before - state.skills.len()) as u64)
    }

    async fn skill_levels(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<SkillLevelRow>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<SkillLevelRow> = state
            .skills
            .iter()
            .filter(|s| after.map_or(true, |a| s.id > a))
            .map(|s| SkillLevelRow {
                id: s.id,
                proficiency: s.proficiency,
                raw_proficiency: s.raw_proficiency.clone(),
            })
            .collect();
        rows.sort_by_key(|r| r.id);
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn set_skill_proficiency(
        &self,
        skill_id: Uuid,
        proficiency: Proficiency,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let row = state
            .skills
            .iter_mut()
            .find(|s| s.id == skill_id)
            .ok_or_else(|| StoreError::NotFound(format!("skill {skill_id}")))?;
        row.proficiency = i16::from(proficiency.level());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMetrics {
    rows: Mutex<Vec<UsageMetric>>,
}

impl InMemoryMetrics {
    pub fn rows(&self) -> Vec<UsageMetric> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetrics {
    async fn record(&self, metric: &UsageMetric) -> Result<(), StoreError> {
        self.rows.lock().unwrap().push(metric.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDocuments {
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl InMemoryDocuments {
    pub fn insert(&self, key: &str, bytes: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::copy_from_slice(bytes));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocuments {
    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<(), StoreError> {
        self.blobs.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBatchJobs {
    jobs: Mutex<Vec<BatchJobRow>>,
    progress_writes: Mutex<HashMap<Uuid, usize>>,
}

impl InMemoryBatchJobs {
    pub fn progress_writes(&self, job_id: Uuid) -> usize {
        self.progress_writes
            .lock()
            .unwrap()
            .get(&job_id)
            .copied()
            .unwrap_or(0)
    }

    fn update<F: FnOnce(&mut BatchJobRow)>(&self, job_id: Uuid, f: F) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| StoreError::NotFound(format!("batch job {job_id}")))?;
        f(&mut *job);
        job.updated_at = Utc::now();
        Ok(())
    }

    /// Pretends the job's last write happened at `at`.
    pub fn backdate(&self, job_id: Uuid, at: DateTime<Utc>) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.updated_at = at;
        }
    }
}

#[async_trait]
impl BatchJobStore for InMemoryBatchJobs {
    async fn enqueue(&self, job: &NewBatchJob) -> Result<BatchJobRow, StoreError> {
        let row = BatchJobRow {
            id: Uuid::new_v4(),
            tenant_id: job.tenant_id.clone(),
            template_override: job.template_override.clone(),
            subject_ids: job.subject_ids.clone(),
            status: BatchStatus::Queued.as_str().to_string(),
            total: job.subject_ids.len() as i32,
            success_count: 0,
            failure_count: 0,
            last_error: None,
            claimed_by: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            updated_at: Utc::now(),
        };
        self.jobs.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<BatchJobRow>, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut claimed = Vec::new();
        for job in jobs.iter_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }
            if job.status == BatchStatus::Queued.as_str() {
                job.status = BatchStatus::Processing.as_str().to_string();
                job.claimed_by = Some(worker_id.to_string());
                job.started_at = Some(Utc::now());
                job.updated_at = Utc::now();
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn recover_stale(
        &self,
        now: DateTime<Utc>,
        max_processing: chrono::Duration,
    ) -> Result<u64, StoreError> {
        let cutoff = now - max_processing;
        let mut recovered = 0;
        for job in self.jobs.lock().unwrap().iter_mut() {
            if job.status == BatchStatus::Processing.as_str() && job.updated_at <= cutoff {
                job.status = BatchStatus::Queued.as_str().to_string();
                job.claimed_by = None;
                job.started_at = None;
                job.success_count = 0;
                job.failure_count = 0;
                job.last_error = None;
                job.updated_at = now;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn record_progress(
        &self,
        job_id: Uuid,
        success: u32,
        failure: u32,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        *self.progress_writes.lock().unwrap().entry(job_id).or_default() += 1;
        self.update(job_id, |job| {
            job.success_count = success as i32;
            job.failure_count = failure as i32;
            if let Some(e) = last_error {
                job.last_error = Some(e.to_string());
            }
        })
    }

    async fn finish(
        &self,
        job_id: Uuid,
        status: BatchStatus,
        success: u32,
        failure: u32,
    ) -> Result<(), StoreError> {
        self.update(job_id, |job| {
            job.status = status.as_str().to_string();
            job.success_count = success as i32;
            job.failure_count = failure as i32;
            job.completed_at = Some(Utc::now());
        })
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<BatchJobRow>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == job_id)
            .cloned())
    }
}

pub fn canonical_skill(name: &str, proficiency: Proficiency) -> CanonicalSkill {
    CanonicalSkill {
        name: name.to_string(),
        proficiency,
        raw_proficiency: None,
        years_experience: None,
        evidence: None,
    }
}

/// The four doubles the pipeline writes to, kept concrete for assertions.
pub struct TestStores {
    pub profiles: Arc<InMemoryProfiles>,
    pub sessions: Arc<InMemorySessions>,
    pub metrics: Arc<InMemoryMetrics>,
    pub documents: Arc<InMemoryDocuments>,
}

impl TestStores {
    pub fn new() -> Self {
        Self {
            profiles: Arc::new(InMemoryProfiles::default()),
            sessions: Arc::new(InMemorySessions::default()),
            metrics: Arc::new(InMemoryMetrics::default()),
            documents: Arc::new(InMemoryDocuments::default()),
        }
    }

    pub fn profiles_dyn(&self) -> Arc<dyn ProfileStore> {
        self.profiles.clone()
    }

    pub fn sessions_dyn(&self) -> Arc<dyn SessionStore> {
        self.sessions.clone()
    }

    pub fn metrics_dyn(&self) -> Arc<dyn MetricsSink> {
        self.metrics.clone()
    }

    pub fn documents_dyn(&self) -> Arc<dyn DocumentStore> {
        self.documents.clone()
    }

    /// Stores the blob and makes it the subject's current document.
    pub async fn attach_document(&self, subject_id: Uuid, key: &str, bytes: &[u8]) -> Uuid {
        self.documents.insert(key, bytes);
        let id = Uuid::new_v4();
        self.profiles
            .record_document(&DocumentRow {
                id,
                subject_id,
                storage_key: key.to_string(),
                format: DocumentFormat::from_path(key)
                    .map_or("pdf", DocumentFormat::as_str)
                    .to_string(),
                original_filename: key.rsplit('/').next().map(str::to_string),
                size_bytes: bytes.len() as i64,
                uploaded_at: Utc::now(),
            })
            .await
            .unwrap();
        id
    }

    /// A subject that went through one successful run: document, profile,
    /// one cv skill and a completed session.
    pub async fn seed_ingested_subject(&self, key: &str) -> Uuid {
        let subject_id = self.profiles.insert_subject(Uuid::new_v4(), None).id;
        self.attach_document(subject_id, key, b"%PDF-1.4").await;
        let position = self.profiles.ensure_position(subject_id).await.unwrap();
        self.profiles
            .replace_skills(
                subject_id,
                position,
                SkillSource::Cv,
                &[canonical_skill("Rust", Proficiency::Expert)],
            )
            .await
            .unwrap();
        let profile = StructuredProfile {
            summary: Some("Engineer".into()),
            ..Default::default()
        };
        self.profiles
            .upsert_profile(subject_id, &profile, Some(80))
            .await
            .unwrap();
        self.sessions
            .upsert(&StatusUpdate {
                subject_id,
                session_id: Uuid::new_v4(),
                stage: IngestionStage::Completed,
                progress: 100,
                message: "Ingestion completed".into(),
                metadata: json!({"source_tag": "upload"}),
            })
            .await
            .unwrap();
        subject_id
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/test".into(),
        s3_bucket: "test-bucket".into(),
        s3_endpoint: "http://localhost:9000".into(),
        aws_access_key_id: "test".into(),
        aws_secret_access_key: "test".into(),
        anthropic_api_key: "test".into(),
        port: 0,
        rust_log: "debug".into(),
        status_update_cap: 10,
        status_write_timeout_secs: 5,
        stage_timeout_secs: 180,
        min_text_chars: 50,
        max_prompt_chars: 60_000,
        stale_session_minutes: 30,
        max_upload_bytes: 1024,
        batch_worker_enabled: false,
        batch_claim_limit: 10,
        batch_item_delay_ms: 0,
        batch_poll_interval_ms: 10,
        batch_stale_claim_minutes: 30,
        worker_id: "test".into(),
    }
}

/// App state wired entirely to in-memory doubles.
pub fn test_state(reasoner: Arc<ScriptedReasoner>) -> (AppState, TestStores, Arc<InMemoryBatchJobs>) {
    let stores = TestStores::new();
    let batch_jobs = Arc::new(InMemoryBatchJobs::default());
    let templates: Arc<dyn TemplateRepository> = Arc::new(InMemoryTemplates::default());
    let coordinator = Arc::new(IngestionCoordinator::new(
        stores.profiles_dyn(),
        stores.sessions_dyn(),
        stores.metrics_dyn(),
        stores.documents_dyn(),
        templates.clone(),
        reasoner,
        IngestionSettings::default(),
    ));
    let state = AppState {
        config: test_config(),
        stores: Stores {
            profiles: stores.profiles_dyn(),
            sessions: stores.sessions_dyn(),
            metrics: stores.metrics_dyn(),
            templates,
            batch_jobs: batch_jobs.clone(),
            documents: stores.documents_dyn(),
        },
        coordinator,
    };
    (state, stores, batch_jobs)
}
