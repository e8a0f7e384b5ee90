//! Status Tracker: per-run progress records for a polling caller.
//!
//! Writes are upserts keyed on (subject, session). Every write is bounded by a
//! timeout and a small retry budget; a failed write is logged and dropped,
//! never surfaced to the pipeline. Each run has a hard cap on progress writes.
//! The terminal write is exempt from the cap and retried harder: it is what
//! releases the subject's active-session slot.

use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::db::StoreError;
use crate::ingestion::retry::{retry, RetryPolicy};
use crate::ingestion::store::SessionStore;

const WRITE_RETRY: RetryPolicy = RetryPolicy::new(2, Duration::from_millis(200));
const TERMINAL_RETRY: RetryPolicy = RetryPolicy::new(5, Duration::from_millis(500));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStage {
    Started,
    Downloading,
    Extracting,
    Analyzing,
    SkillsExtraction,
    Storing,
    Completed,
    Failed,
}

impl IngestionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Analyzing => "analyzing",
            Self::SkillsExtraction => "skills_extraction",
            Self::Storing => "storing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Progress reported on entering the stage. `Failed` keeps whatever
    /// progress the run had reached.
    pub fn progress(self) -> Option<u8> {
        match self {
            Self::Started => Some(0),
            Self::Downloading => Some(10),
            Self::Extracting => Some(25),
            Self::Analyzing => Some(45),
            Self::SkillsExtraction => Some(70),
            Self::Storing => Some(85),
            Self::Completed => Some(100),
            Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl FromStr for IngestionStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "started" => Self::Started,
            "downloading" => Self::Downloading,
            "extracting" => Self::Extracting,
            "analyzing" => Self::Analyzing,
            "skills_extraction" => Self::SkillsExtraction,
            "storing" => Self::Storing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => return Err(format!("unknown ingestion stage '{other}'")),
        })
    }
}

/// One status write.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub subject_id: Uuid,
    pub session_id: Uuid,
    pub stage: IngestionStage,
    pub progress: u8,
    pub message: String,
    pub metadata: Value,
}

pub struct StatusTracker {
    sessions: Arc<dyn SessionStore>,
    subject_id: Uuid,
    session_id: Uuid,
    metadata: Value,
    cap: u32,
    write_timeout: Duration,
    calls: AtomicU32,
    progress: AtomicU8,
}

impl StatusTracker {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        subject_id: Uuid,
        session_id: Uuid,
        metadata: Value,
        cap: u32,
        write_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            subject_id,
            session_id,
            metadata,
            cap,
            write_timeout,
            calls: AtomicU32::new(0),
            progress: AtomicU8::new(0),
        }
    }

    /// Writes the `started` row. Unlike `report`, the error is returned: the
    /// caller decides whether an active-session conflict is fatal.
    pub async fn begin(&self, stale_before: chrono::DateTime<chrono::Utc>) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let update = self.update(IngestionStage::Started, "Ingestion started");
        match tokio::time::timeout(self.write_timeout, self.sessions.begin(&update, stale_before)).await
        {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.write_timeout.as_secs())),
        }
    }

    /// Reports a stage transition. Returns whether the write landed.
    pub async fn report(&self, stage: IngestionStage, message: &str) -> bool {
        if stage.is_terminal() {
            return self.finish(stage, message).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call > self.cap {
            debug!(
                subject_id = %self.subject_id,
                session_id = %self.session_id,
                stage = stage.as_str(),
                cap = self.cap,
                "status update cap reached, dropping write"
            );
            return false;
        }

        let update = &self.update(stage, message);
        let result = retry(WRITE_RETRY, "status write", move || async move {
            match tokio::time::timeout(self.write_timeout, self.sessions.upsert(update)).await {
                Ok(r) => r,
                Err(_) => Err(StoreError::Timeout(self.write_timeout.as_secs())),
            }
        })
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    subject_id = %self.subject_id,
                    session_id = %self.session_id,
                    stage = stage.as_str(),
                    error = %e,
                    "status write failed, continuing"
                );
                false
            }
        }
    }

    pub async fn complete(&self, message: &str) -> bool {
        self.finish(IngestionStage::Completed, message).await
    }

    pub async fn fail(&self, message: &str) -> bool {
        self.finish(IngestionStage::Failed, message).await
    }

    async fn finish(&self, stage: IngestionStage, message: &str) -> bool {
        let update = &self.update(stage, message);
        let result = retry(TERMINAL_RETRY, "terminal status write", move || async move {
            match tokio::time::timeout(self.write_timeout, self.sessions.finish(update)).await {
                Ok(r) => r,
                Err(_) => Err(StoreError::Timeout(self.write_timeout.as_secs())),
            }
        })
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                // the stale sweep in `begin` is the only way out from here
                error!(
                    subject_id = %self.subject_id,
                    session_id = %self.session_id,
                    stage = stage.as_str(),
                    error = %e,
                    "terminal status write failed, session stays active until swept"
                );
                false
            }
        }
    }

    fn update(&self, stage: IngestionStage, message: &str) -> StatusUpdate {
        let progress = match stage.progress() {
            // non-decreasing within a run
            Some(p) => self.progress.fetch_max(p, Ordering::SeqCst).max(p),
            None => self.progress.load(Ordering::SeqCst),
        };
        let mut metadata = self.metadata.clone();
        if let Value::Object(map) = &mut metadata {
            map.insert("stage".to_string(), Value::String(stage.as_str().to_string()));
        }
        StatusUpdate {
            subject_id: self.subject_id,
            session_id: self.session_id,
            stage,
            progress,
            message: message.to_string(),
            metadata,
        }
    }
}
