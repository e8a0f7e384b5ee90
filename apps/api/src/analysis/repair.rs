//! Defensive parsing of model output that should be a JSON object.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RepairError {
    #[error("response contains no JSON object")]
    NoObject,

    #[error("response is not valid JSON: {0}")]
    Invalid(String),
}

/// Which layer produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseLayer {
    Strict,
    Repaired,
}

/// Parses a model response into a JSON object.
///
/// Layer one is a strict parse of the whole response. Layer two strips code
/// fences, takes the span from the first `{` to the last `}`, and retries,
/// tolerating trailing commas.
pub fn parse_model_json(raw: &str) -> Result<(Value, ParseLayer), RepairError> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok((value, ParseLayer::Strict));
    }

    let body = strip_code_fences(raw);
    let span = object_span(body).ok_or(RepairError::NoObject)?;

    let parsed = serde_json::from_str::<Value>(span).or_else(|first| {
        let relaxed = strip_trailing_commas(span);
        serde_json::from_str::<Value>(&relaxed).map_err(|_| first)
    });

    match parsed {
        Ok(value @ Value::Object(_)) => Ok((value, ParseLayer::Repaired)),
        Ok(_) => Err(RepairError::NoObject),
        Err(e) => Err(RepairError::Invalid(e.to_string())),
    }
}

/// Removes a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[start + 3..];
    // skip the language tag on the opening fence line
    let body_start = after_open.find('\n').map_or(0, |i| i + 1);
    let body = &after_open[body_start..];
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Drops commas that directly precede `}` or `]`. Commas inside string
/// literals are kept.
fn strip_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => in_string = true,
            ',' => {
                let rest = chars.clone().find(|c| !c.is_whitespace());
                if matches!(rest, Some('}' | ']')) {
                    continue;
                }
            }
            _ => {}
        }
        out.push(c);
    }
    out
}

fn object_span(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}
