//! Proficiency Normalizer: maps every proficiency encoding seen in the wild onto
//! the canonical 0–3 scale (None / Learning / Using / Expert).
//!
//! The scale's numeric values, identifiers, labels and colors are a public
//! contract. Consumers render skill levels from `SCALE`; do not renumber.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A canonical proficiency level. Serializes as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Proficiency {
    #[default]
    None = 0,
    Learning = 1,
    Using = 2,
    Expert = 3,
}

impl Proficiency {
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn id(self) -> &'static str {
        match self {
            Proficiency::None => "none",
            Proficiency::Learning => "learning",
            Proficiency::Using => "using",
            Proficiency::Expert => "expert",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Proficiency::None => "None",
            Proficiency::Learning => "Learning",
            Proficiency::Using => "Using",
            Proficiency::Expert => "Expert",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Proficiency::None => "#9CA3AF",
            Proficiency::Learning => "#F59E0B",
            Proficiency::Using => "#3B82F6",
            Proficiency::Expert => "#10B981",
        }
    }

    /// Clamps and rounds a value that is already on the canonical scale.
    /// Used for stored rows that carry no raw encoding.
    pub fn from_canonical(value: f64) -> Self {
        if !value.is_finite() {
            return Proficiency::None;
        }
        match value.round().clamp(0.0, 3.0) as u8 {
            3 => Proficiency::Expert,
            2 => Proficiency::Using,
            1 => Proficiency::Learning,
            _ => Proficiency::None,
        }
    }
}

impl From<Proficiency> for u8 {
    fn from(p: Proficiency) -> Self {
        p as u8
    }
}

impl TryFrom<u8> for Proficiency {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Proficiency::None),
            1 => Ok(Proficiency::Learning),
            2 => Ok(Proficiency::Using),
            3 => Ok(Proficiency::Expert),
            other => Err(format!("proficiency {other} is outside the 0-3 scale")),
        }
    }
}

/// One entry of the public scale definition.
#[derive(Debug, Clone, Serialize)]
pub struct ScaleEntry {
    pub level: u8,
    pub id: &'static str,
    pub label: &'static str,
    pub color: &'static str,
}

pub const SCALE: [Proficiency; 4] = [
    Proficiency::None,
    Proficiency::Learning,
    Proficiency::Using,
    Proficiency::Expert,
];

pub fn scale_definition() -> Vec<ScaleEntry> {
    SCALE
        .iter()
        .map(|p| ScaleEntry {
            level: p.level(),
            id: p.id(),
            label: p.label(),
            color: p.color(),
        })
        .collect()
}

const EXPERT_TERMS: &[&str] = &[
    "expert",
    "advanced",
    "senior",
    "master",
    "mastery",
    "specialist",
    "fluent",
    "native",
    "excellent",
];

const USING_TERMS: &[&str] = &[
    "using",
    "intermediate",
    "proficient",
    "competent",
    "experienced",
    "mid",
    "mid-level",
    "good",
    "working",
];

const LEARNING_TERMS: &[&str] = &[
    "learning",
    "beginner",
    "junior",
    "novice",
    "basic",
    "familiar",
    "elementary",
    "entry",
    "entry-level",
];

const NONE_TERMS: &[&str] = &["none", "", "n/a", "na", "unknown", "not applicable"];

/// Maps any raw proficiency encoding to the canonical scale. Total: every input
/// yields a level.
///
/// - null, booleans, arrays, objects → None
/// - numbers ≤ 5 are read on a 0–5 scale, numbers above 5 as a percentage
/// - numeric strings ("4", "85%") are read as numbers
/// - other strings are matched case-insensitively against a fixed vocabulary
pub fn canonicalize(raw: &Value) -> Proficiency {
    match raw {
        Value::Number(n) => n.as_f64().map(canonicalize_number).unwrap_or_default(),
        Value::String(s) => canonicalize_str(s),
        _ => Proficiency::None,
    }
}

/// Requirement-context variant: a position requirement is never "None".
pub fn canonicalize_requirement(raw: &Value) -> Proficiency {
    canonicalize(raw).max(Proficiency::Learning)
}

pub fn canonicalize_number(value: f64) -> Proficiency {
    if !value.is_finite() || value <= 0.0 {
        return Proficiency::None;
    }
    if value <= 5.0 {
        return if value >= 4.0 {
            Proficiency::Expert
        } else if value >= 3.0 {
            Proficiency::Using
        } else if value >= 1.0 {
            Proficiency::Learning
        } else {
            Proficiency::None
        };
    }
    // Anything above 100 is treated as a saturated percentage.
    let pct = value.min(100.0);
    if pct >= 75.0 {
        Proficiency::Expert
    } else if pct >= 50.0 {
        Proficiency::Using
    } else if pct >= 25.0 {
        Proficiency::Learning
    } else {
        Proficiency::None
    }
}

pub fn canonicalize_str(raw: &str) -> Proficiency {
    let term = raw.trim().to_lowercase();

    let numeric = term.trim_end_matches('%').trim();
    if let Ok(n) = numeric.parse::<f64>() {
        return canonicalize_number(n);
    }

    if let Some(level) = match_term(&term) {
        return level;
    }
    // "Advanced level", "expert (5 yrs)"
    term.split(|c: char| !c.is_alphanumeric() && c != '-' && c != '/')
        .find(|w| !w.is_empty())
        .and_then(match_term)
        .unwrap_or(Proficiency::None)
}

fn match_term(term: &str) -> Option<Proficiency> {
    if EXPERT_TERMS.contains(&term) {
        Some(Proficiency::Expert)
    } else if USING_TERMS.contains(&term) {
        Some(Proficiency::Using)
    } else if LEARNING_TERMS.contains(&term) {
        Some(Proficiency::Learning)
    } else if NONE_TERMS.contains(&term) {
        Some(Proficiency::None)
    } else {
        None
    }
}
