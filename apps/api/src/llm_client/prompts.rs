// Shared prompt constants.
// Each stage that calls the reasoning service defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// System prompt for plain-text transcription of attached documents.
pub const TRANSCRIBE_SYSTEM: &str = "You are a careful document transcriber. \
    Reproduce the readable text of the attached document as plain text. \
    Keep the reading order of sections. \
    Do NOT summarize, translate, or add commentary.";
