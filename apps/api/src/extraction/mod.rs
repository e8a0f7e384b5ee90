//! Text Extraction Engine: turns an uploaded document into enough readable
//! text to analyze.
//!
//! Dispatch by declared format:
//! - plain text: decoded as-is
//! - DOCX: `word/document.xml` flowed into paragraphs
//! - PDF: ordered strategy chain, first result above the readable-text floor wins
//! - images: vision transcription through the reasoning service
//!
//! Every format is held to the same floor (`min_chars` readable characters);
//! near-empty text is an `ExtractionError`, never a silent success.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm_client::prompts::TRANSCRIBE_SYSTEM;
use crate::llm_client::{Attachment, LlmError, LlmInvocation, ReasoningService};

pub mod docx;
pub mod pdf;
pub mod text;

use pdf::PdfExtractor;
use text::{normalize_text, readable_chars};

const IMAGE_TRANSCRIBE_PROMPT: &str = "Transcribe all readable text in this resume image. \
    Return plain text only, one line per visual line, no commentary.";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document is empty")]
    EmptyDocument,

    #[error("failed to read DOCX: {0}")]
    Docx(String),

    #[error("PDF strategy '{strategy}' failed: {message}")]
    Strategy {
        strategy: &'static str,
        message: String,
    },

    #[error(
        "not enough readable text: best strategy '{best_strategy}' produced {best_chars} characters, {min_chars} required"
    )]
    InsufficientText {
        best_strategy: &'static str,
        best_chars: usize,
        min_chars: usize,
    },

    #[error("vision transcription failed: {0}")]
    Vision(#[from] LlmError),

    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Document formats the pipeline accepts, inferred from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    Docx,
    Pdf,
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "txt" | "text" | "md" => Some(Self::PlainText),
            "docx" => Some(Self::Docx),
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Infers the format from a storage key or filename.
    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlainText => "plain_text",
            Self::Docx => "docx",
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::PlainText => "txt",
            Self::Docx => "docx",
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            Self::PlainText => "text/plain",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
        }
    }
}

/// Extracted text plus how it was obtained.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub strategy: &'static str,
    pub readable_chars: usize,
    /// Set when a reasoning-service call produced the text.
    pub invocation: Option<LlmInvocation>,
}

pub struct TextExtractor {
    reasoning: Arc<dyn ReasoningService>,
    pdf: PdfExtractor,
    min_chars: usize,
}

impl TextExtractor {
    pub fn new(reasoning: Arc<dyn ReasoningService>, min_chars: usize) -> Self {
        Self {
            reasoning,
            pdf: PdfExtractor::with_default_chain(min_chars),
            min_chars,
        }
    }

    pub async fn extract(
        &self,
        bytes: Bytes,
        format: DocumentFormat,
    ) -> Result<ExtractedText, ExtractionError> {
        if bytes.is_empty() {
            return Err(ExtractionError::EmptyDocument);
        }

        let extracted = match format {
            DocumentFormat::PlainText => {
                let raw = String::from_utf8_lossy(&bytes);
                self.accept(raw.trim_start_matches('\u{feff}'), "plain_text", None)?
            }
            DocumentFormat::Docx => {
                let raw = run_blocking(move || docx::extract_docx_text(&bytes)).await??;
                self.accept(&raw, "docx", None)?
            }
            DocumentFormat::Pdf => {
                let pdf = self.pdf.clone();
                run_blocking(move || pdf.extract(&bytes)).await??
            }
            image => self.transcribe_image(&bytes, image).await?,
        };

        info!(
            strategy = extracted.strategy,
            readable_chars = extracted.readable_chars,
            "extracted document text"
        );
        Ok(extracted)
    }

    async fn transcribe_image(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<ExtractedText, ExtractionError> {
        let attachment = Attachment {
            media_type: format.media_type(),
            bytes,
        };
        let completion = self
            .reasoning
            .transcribe(attachment, IMAGE_TRANSCRIBE_PROMPT, TRANSCRIBE_SYSTEM)
            .await?;
        let invocation = LlmInvocation::from_completion("transcribe_image", &completion);
        self.accept(&completion.text, "vision", Some(invocation))
    }

    fn accept(
        &self,
        raw: &str,
        strategy: &'static str,
        invocation: Option<LlmInvocation>,
    ) -> Result<ExtractedText, ExtractionError> {
        let text = normalize_text(raw);
        let chars = readable_chars(&text);
        if chars < self.min_chars {
            warn!(strategy, chars, min = self.min_chars, "extracted text below floor");
            return Err(ExtractionError::InsufficientText {
                best_strategy: strategy,
                best_chars: chars,
                min_chars: self.min_chars,
            });
        }
        debug!(strategy, chars, "accepted extracted text");
        Ok(ExtractedText {
            text,
            strategy,
            readable_chars: chars,
            invocation,
        })
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, ExtractionError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExtractionError::Task(e.to_string()))
}
