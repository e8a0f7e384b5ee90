//! Helpers for scrubbing error text before it is logged, stored in usage
//! metrics, or returned to a caller.
//!
//! File paths, API keys, bearer tokens and password-like assignments are
//! redacted, and the result is length-capped.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum length of any sanitized message.
pub const MAX_MESSAGE_CHARS: usize = 300;

pub const MSG_FILE_TOO_LARGE: &str = "File too large";
pub const MSG_SUBJECT_REQUIRED: &str = "subject_id is required";
pub const MSG_SUBJECT_ID_INVALID: &str = "subject_id must be a UUID";
pub const MSG_DOCUMENT_REQUIRED: &str = "document_ref is required";
pub const MSG_UNSUPPORTED_FORMAT: &str = "Unsupported document format";
pub const MSG_SOURCE_TAG_INVALID: &str = "source_tag must be 1-64 characters";
pub const MSG_NO_FILE: &str = "No file provided";
pub const MSG_EMPTY_SUBJECT_LIST: &str = "subject_ids must not be empty";
pub const MSG_TOO_MANY_SUBJECTS: &str = "Too many subjects in one batch job";
pub const MSG_SESSION_ID_REUSED: &str = "session_id has already been used";

/// Validation messages that are already user-safe and pass through verbatim.
const SAFE_MESSAGES: &[&str] = &[
    MSG_FILE_TOO_LARGE,
    MSG_SUBJECT_REQUIRED,
    MSG_SUBJECT_ID_INVALID,
    MSG_DOCUMENT_REQUIRED,
    MSG_UNSUPPORTED_FORMAT,
    MSG_SOURCE_TAG_INVALID,
    MSG_NO_FILE,
    MSG_EMPTY_SUBJECT_LIST,
    MSG_TOO_MANY_SUBJECTS,
    MSG_SESSION_ID_REUSED,
];

static RE_API_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(sk-[A-Za-z0-9_\-]{8,}|AKIA[0-9A-Z]{12,}|ghp_[A-Za-z0-9]{12,})").unwrap()
});
static RE_BEARER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._\-~+/=]+").unwrap());
static RE_SECRET_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(password|passwd|pwd|secret|token|api[_-]?key|x-api-key)\b(\s*[:=]\s*)("[^"]*"|'[^']*'|[^\s,;&]+)"#)
        .unwrap()
});
static RE_URL_USERINFO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z][a-z0-9+.\-]*://)[^/\s@]+@").unwrap());
static RE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(^|[\s"'(=])(?:[A-Za-z]:\\|/)(?:[^\s/\\:"']+[/\\])+[^\s/\\:"']*"#).unwrap()
});

/// Redacts secrets and paths from `message` and caps its length.
pub fn sanitize_message(message: &str) -> String {
    let s = RE_URL_USERINFO.replace_all(message, "$1****@");
    let s = RE_API_KEY.replace_all(&s, "[redacted-key]");
    let s = RE_BEARER.replace_all(&s, "Bearer [redacted]");
    let s = RE_SECRET_ASSIGN.replace_all(&s, "$1$2[redacted]");
    let s = RE_PATH.replace_all(&s, "$1[path]");
    truncate_chars(s.trim(), MAX_MESSAGE_CHARS)
}

/// Whether a validation message may be shown to a user verbatim.
pub fn is_safe_message(message: &str) -> bool {
    SAFE_MESSAGES.contains(&message)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
