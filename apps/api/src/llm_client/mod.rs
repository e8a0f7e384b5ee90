/// LLM Client: the single point of entry for all reasoning-service calls.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// Pipeline code depends on the `ReasoningService` trait, never on `LlmClient`.
///
/// Model: claude-sonnet-4-5 (hardcoded: do not make configurable to prevent drift)
use std::time::Instant;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 8192;
const MAX_RETRIES: u32 = 3;

/// USD per million tokens, used for cost estimates in usage metrics.
const INPUT_COST_PER_MTOK: f64 = 3.0;
const OUTPUT_COST_PER_MTOK: f64 = 15.0;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("reasoning service API key is not configured")]
    MissingApiKey,
}

impl LlmError {
    /// HTTP status returned by the provider, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Api { status, .. } => Some(*status),
            LlmError::RateLimited { .. } => Some(429),
            LlmError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Http(e) if e.is_timeout())
    }
}

/// Token counts for one call, or accumulated over several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
    }

    pub fn cost_estimate(&self) -> f64 {
        (self.input as f64 * INPUT_COST_PER_MTOK + self.output as f64 * OUTPUT_COST_PER_MTOK)
            / 1_000_000.0
    }
}

/// The text of a successful call plus what it cost.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    pub duration_ms: u64,
}

/// One successful reasoning-service call, recorded as a usage metric.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmInvocation {
    pub operation: &'static str,
    pub usage: TokenUsage,
    pub duration_ms: u64,
}

impl LlmInvocation {
    pub fn from_completion(operation: &'static str, completion: &Completion) -> Self {
        Self {
            operation,
            usage: completion.usage,
            duration_ms: completion.duration_ms,
        }
    }
}

/// An image passed alongside a prompt.
#[derive(Debug, Clone, Copy)]
pub struct Attachment<'a> {
    pub media_type: &'a str,
    pub bytes: &'a [u8],
}

/// What the pipeline needs from a reasoning service. `LlmClient` is the
/// production implementation; tests script responses.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Text-in, text-out completion.
    async fn complete(&self, prompt: &str, system: &str) -> Result<Completion, LlmError>;

    /// Completion over an attached image (vision input).
    async fn transcribe(
        &self,
        attachment: Attachment<'_>,
        prompt: &str,
        system: &str,
    ) -> Result<Completion, LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    Image { source: Base64Source<'a> },
}

#[derive(Debug, Serialize)]
struct Base64Source<'a> {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// The single LLM client used by the service.
/// Wraps the Anthropic Messages API with retry logic.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Makes a raw call to the Claude API, returning the full response object.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    async fn call(
        &self,
        content: MessageContent<'_>,
        system: &str,
    ) -> Result<LlmResponse, LlmError> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content,
            }],
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}", status);
                debug!("LLM API error body: {}", body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                // Try to parse error message
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let llm_response: LlmResponse = response.json().await?;

            debug!(
                "LLM call succeeded: input_tokens={}, output_tokens={}",
                llm_response.usage.input_tokens, llm_response.usage.output_tokens
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    async fn call_to_completion(
        &self,
        content: MessageContent<'_>,
        system: &str,
    ) -> Result<Completion, LlmError> {
        let started = Instant::now();
        let response = self.call(content, system).await?;
        let text = response
            .text()
            .map(str::to_string)
            .filter(|t| !t.trim().is_empty())
            .ok_or(LlmError::EmptyContent)?;

        Ok(Completion {
            text,
            usage: TokenUsage {
                input: response.usage.input_tokens,
                output: response.usage.output_tokens,
            },
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl ReasoningService for LlmClient {
    async fn complete(&self, prompt: &str, system: &str) -> Result<Completion, LlmError> {
        self.call_to_completion(MessageContent::Text(prompt), system)
            .await
    }

    async fn transcribe(
        &self,
        attachment: Attachment<'_>,
        prompt: &str,
        system: &str,
    ) -> Result<Completion, LlmError> {
        let source = Base64Source {
            source_type: "base64",
            media_type: attachment.media_type,
            data: base64::engine::general_purpose::STANDARD.encode(attachment.bytes),
        };
        let parts = vec![ContentPart::Image { source }, ContentPart::Text { text: prompt }];

        self.call_to_completion(MessageContent::Parts(parts), system)
            .await
    }
}
