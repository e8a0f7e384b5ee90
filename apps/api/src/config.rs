use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or a numeric one is malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub status_update_cap: u32,
    pub status_write_timeout_secs: u64,
    pub stage_timeout_secs: u64,
    pub min_text_chars: usize,
    pub max_prompt_chars: usize,
    pub stale_session_minutes: i64,
    pub max_upload_bytes: usize,
    pub batch_worker_enabled: bool,
    pub batch_claim_limit: i64,
    pub batch_item_delay_ms: u64,
    pub batch_poll_interval_ms: u64,
    pub batch_stale_claim_minutes: i64,
    pub worker_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            status_update_cap: env_or("STATUS_UPDATE_CAP", 10)?,
            status_write_timeout_secs: env_or("STATUS_WRITE_TIMEOUT_SECS", 5)?,
            stage_timeout_secs: env_or("STAGE_TIMEOUT_SECS", 180)?,
            min_text_chars: env_or("MIN_TEXT_CHARS", 50)?,
            max_prompt_chars: env_or("MAX_PROMPT_CHARS", 60_000)?,
            stale_session_minutes: env_or("STALE_SESSION_MINUTES", 30)?,
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            batch_worker_enabled: env_or("BATCH_WORKER_ENABLED", true)?,
            batch_claim_limit: env_or("BATCH_CLAIM_LIMIT", 10)?,
            batch_item_delay_ms: env_or("BATCH_ITEM_DELAY_MS", 2_000)?,
            batch_poll_interval_ms: env_or("BATCH_POLL_INTERVAL_MS", 5_000)?,
            batch_stale_claim_minutes: env_or("BATCH_STALE_CLAIM_MINUTES", 30)?,
            worker_id: std::env::var("WORKER_ID").unwrap_or_else(|_| default_worker_id()),
        })
    }

    pub fn ingestion(&self) -> IngestionSettings {
        IngestionSettings {
            status_update_cap: self.status_update_cap,
            status_write_timeout: Duration::from_secs(self.status_write_timeout_secs),
            stage_timeout: Duration::from_secs(self.stage_timeout_secs),
            min_text_chars: self.min_text_chars,
            max_prompt_chars: self.max_prompt_chars,
            stale_session: chrono::Duration::minutes(self.stale_session_minutes),
        }
    }

    pub fn batch(&self) -> BatchSettings {
        BatchSettings {
            claim_limit: self.batch_claim_limit,
            item_delay: Duration::from_millis(self.batch_item_delay_ms),
            poll_interval: Duration::from_millis(self.batch_poll_interval_ms),
            stale_claim: chrono::Duration::minutes(self.batch_stale_claim_minutes),
            worker_id: self.worker_id.clone(),
        }
    }
}

/// Knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestionSettings {
    /// Hard cap on status writes per run; later writes are dropped.
    pub status_update_cap: u32,
    pub status_write_timeout: Duration,
    /// Deadline for each of download, extract and analyze.
    pub stage_timeout: Duration,
    pub min_text_chars: usize,
    pub max_prompt_chars: usize,
    /// Active sessions untouched for this long no longer block a new run.
    pub stale_session: chrono::Duration,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            status_update_cap: 10,
            status_write_timeout: Duration::from_secs(5),
            stage_timeout: Duration::from_secs(180),
            min_text_chars: 50,
            max_prompt_chars: 60_000,
            stale_session: chrono::Duration::minutes(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub claim_limit: i64,
    /// Pause between two subjects of the same job.
    pub item_delay: Duration,
    pub poll_interval: Duration,
    /// Jobs left in `processing` without a write for this long go back to the queue.
    pub stale_claim: chrono::Duration,
    pub worker_id: String,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            claim_limit: 10,
            item_delay: Duration::from_millis(2_000),
            poll_interval: Duration::from_millis(5_000),
            stale_claim: chrono::Duration::minutes(30),
            worker_id: default_worker_id(),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'"))
}

fn default_worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "ingest".to_string());
    format!("{host}-{}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_rejects_garbage() {
        let err = parse_value::<u64>("STAGE_TIMEOUT_SECS", "ten").unwrap_err();
        assert!(err.to_string().contains("STAGE_TIMEOUT_SECS"));
        assert_eq!(parse_value::<u64>("STAGE_TIMEOUT_SECS", " 90 ").unwrap(), 90);
        assert!(parse_value::<bool>("BATCH_WORKER_ENABLED", "false").is_ok_and(|v| !v));
    }

    #[test]
    fn test_default_settings() {
        let s = IngestionSettings::default();
        assert_eq!(s.status_update_cap, 10);
        assert_eq!(s.status_write_timeout, Duration::from_secs(5));
        assert_eq!(s.min_text_chars, 50);
    }
}
