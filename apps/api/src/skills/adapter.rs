//! Skill alias adapter: the single place where producer-specific skill shapes
//! (`name`/`skill_name`, `level`/`proficiency_level`, bare strings, name→level
//! maps, categorized groups) are resolved into one internal record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::skills::proficiency::{canonicalize, Proficiency};

const NAME_KEYS: &[&str] = &["name", "skill_name", "skill", "title"];
const LEVEL_KEYS: &[&str] = &["level", "proficiency_level", "proficiency", "rating", "score"];
const YEARS_KEYS: &[&str] = &[
    "years",
    "years_of_experience",
    "years_experience",
    "experience_years",
];
const EVIDENCE_KEYS: &[&str] = &["evidence", "context", "source_text"];

const MAX_SKILL_NAME_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterError {
    #[error("skill entry has conflicting values for aliased field '{field}'")]
    AmbiguousAlias { field: &'static str },

    #[error("skill entry has no name")]
    MissingName,

    #[error("unsupported skill entry shape")]
    UnsupportedShape,
}

/// A skill as produced by the analysis stage, aliases resolved but the
/// proficiency still in its raw encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSkill {
    pub name: String,
    pub level: Value,
    pub years: Option<f32>,
    pub evidence: Option<String>,
}

/// The canonical skill record written to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSkill {
    pub name: String,
    pub proficiency: Proficiency,
    /// Original encoding, kept so historical rows can be re-standardized.
    pub raw_proficiency: Option<String>,
    pub years_experience: Option<f32>,
    pub evidence: Option<String>,
}

impl RawSkill {
    /// Resolves one skill object. Keys are expected to be snake_case already.
    pub fn from_object(obj: &serde_json::Map<String, Value>) -> Result<Self, AdapterError> {
        let name = resolve_alias(obj, NAME_KEYS, "name")?
            .and_then(|v| v.as_str().map(clean_name))
            .filter(|n| !n.is_empty())
            .ok_or(AdapterError::MissingName)?;
        let level = resolve_alias(obj, LEVEL_KEYS, "level")?
            .cloned()
            .unwrap_or(Value::Null);
        let years = resolve_alias(obj, YEARS_KEYS, "years")?.and_then(value_as_years);
        let evidence = resolve_alias(obj, EVIDENCE_KEYS, "evidence")?
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            name,
            level,
            years,
            evidence,
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, AdapterError> {
        match value {
            Value::String(s) => {
                let name = clean_name(s);
                if name.is_empty() {
                    return Err(AdapterError::MissingName);
                }
                Ok(Self {
                    name,
                    level: Value::Null,
                    years: None,
                    evidence: None,
                })
            }
            Value::Object(obj) => Self::from_object(obj),
            _ => Err(AdapterError::UnsupportedShape),
        }
    }

    pub fn canonical(&self) -> CanonicalSkill {
        CanonicalSkill {
            name: self.name.clone(),
            proficiency: canonicalize(&self.level),
            raw_proficiency: raw_encoding(&self.level),
            years_experience: self.years,
            evidence: self.evidence.clone(),
        }
    }
}

/// Resolves every skill in the `skills` section of a normalized profile.
///
/// Accepts an array of strings/objects, a `{name: level}` map, or a map of
/// category → array. Entries that fail to resolve are returned separately so
/// the caller can log them; they never abort the run.
pub fn resolve_skills(section: &Value) -> (Vec<RawSkill>, Vec<AdapterError>) {
    let mut skills = Vec::new();
    let mut rejected = Vec::new();

    let mut push = |result: Result<RawSkill, AdapterError>| match result {
        Ok(skill) => skills.push(skill),
        Err(e) => rejected.push(e),
    };

    match section {
        Value::Array(items) => {
            for item in items {
                push(RawSkill::from_value(item));
            }
        }
        Value::Object(map) if looks_like_single_skill(map) => {
            push(RawSkill::from_object(map));
        }
        Value::Object(map) => {
            for (key, value) in map {
                match value {
                    // category → list
                    Value::Array(items) => {
                        for item in items {
                            push(RawSkill::from_value(item));
                        }
                    }
                    // name → level
                    Value::Number(_) | Value::String(_) | Value::Null => {
                        let name = clean_name(key);
                        if name.is_empty() {
                            push(Err(AdapterError::MissingName));
                        } else {
                            push(Ok(RawSkill {
                                name,
                                level: value.clone(),
                                years: None,
                                evidence: None,
                            }));
                        }
                    }
                    Value::Object(obj) => {
                        let mut obj = obj.clone();
                        obj.entry("name".to_string())
                            .or_insert_with(|| Value::String(key.clone()));
                        push(RawSkill::from_object(&obj));
                    }
                    Value::Bool(_) => push(Err(AdapterError::UnsupportedShape)),
                }
            }
        }
        Value::Null => {}
        _ => push(Err(AdapterError::UnsupportedShape)),
    }

    (skills, rejected)
}

/// Canonicalizes and de-duplicates skills by case-insensitive name. The highest
/// proficiency wins; years and evidence are filled from the first entry that
/// carries them. Output keeps first-seen order.
pub fn canonicalize_skills(raw: &[RawSkill]) -> Vec<CanonicalSkill> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<CanonicalSkill> = Vec::new();

    for skill in raw {
        let candidate = skill.canonical();
        let key = candidate.name.to_lowercase();
        match index.get(&key) {
            Some(&i) => {
                let existing = &mut out[i];
                if candidate.proficiency > existing.proficiency {
                    existing.proficiency = candidate.proficiency;
                    existing.raw_proficiency = candidate.raw_proficiency;
                }
                if existing.years_experience.is_none() {
                    existing.years_experience = candidate.years_experience;
                }
                if existing.evidence.is_none() {
                    existing.evidence = candidate.evidence;
                }
            }
            None => {
                index.insert(key, out.len());
                out.push(candidate);
            }
        }
    }

    out
}

fn looks_like_single_skill(map: &serde_json::Map<String, Value>) -> bool {
    NAME_KEYS.iter().any(|k| map.get(*k).is_some_and(Value::is_string))
        && map.values().all(|v| !v.is_array())
}

/// Returns the value behind whichever alias is present. Two aliases carrying
/// different non-empty values is an error rather than a guess.
fn resolve_alias<'a>(
    obj: &'a serde_json::Map<String, Value>,
    aliases: &[&str],
    field: &'static str,
) -> Result<Option<&'a Value>, AdapterError> {
    let mut found: Option<&Value> = None;
    for alias in aliases {
        let Some(value) = obj.get(*alias) else {
            continue;
        };
        if is_blank(value) {
            continue;
        }
        match found {
            Some(prev) if !same_value(prev, value) => {
                return Err(AdapterError::AmbiguousAlias { field });
            }
            Some(_) => {}
            None => found = Some(value),
        }
    }
    Ok(found)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.trim().eq_ignore_ascii_case(y.trim()),
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn value_as_years(value: &Value) -> Option<f32> {
    let years = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            digits.parse::<f64>().ok()?
        }
        _ => return None,
    };
    (years.is_finite() && years >= 0.0 && years < 80.0).then_some(years as f32)
}

fn raw_encoding(level: &Value) -> Option<String> {
    match level {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn clean_name(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == ',' || c == ';' || c == '-' || c == '•');
    trimmed.trim().chars().take(MAX_SKILL_NAME_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_aliases_resolve_to_one_record() {
        let a = RawSkill::from_value(&json!({"name": "Rust", "level": "expert"})).unwrap();
        let b = RawSkill::from_value(&json!({"skill_name": "Rust", "proficiency_level": "expert"}))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_agreeing_duplicate_aliases_are_accepted() {
        let skill =
            RawSkill::from_value(&json!({"name": "Go", "skill_name": "go", "level": 3})).unwrap();
        assert_eq!(skill.name, "Go");
    }

    #[test]
    fn test_conflicting_aliases_are_rejected() {
        let err = RawSkill::from_value(&json!({"name": "Go", "skill_name": "Rust"})).unwrap_err();
        assert_eq!(err, AdapterError::AmbiguousAlias { field: "name" });

        let err = RawSkill::from_value(&json!({"name": "Go", "level": 2, "proficiency_level": 4}))
            .unwrap_err();
        assert_eq!(err, AdapterError::AmbiguousAlias { field: "level" });
    }

    #[test]
    fn test_missing_name_is_rejected() {
        assert_eq!(
            RawSkill::from_value(&json!({"level": 3})).unwrap_err(),
            AdapterError::MissingName
        );
        assert_eq!(
            RawSkill::from_value(&json!("   ")).unwrap_err(),
            AdapterError::MissingName
        );
    }

    #[test]
    fn test_resolve_skills_accepts_mixed_array() {
        let (skills, rejected) = resolve_skills(&json!([
            "Docker",
            {"name": "Python", "level": 4, "years": "5 years"},
            42
        ]));
        assert_eq!(skills.len(), 2);
        assert_eq!(rejected, vec![AdapterError::UnsupportedShape]);
        assert_eq!(skills[1].years, Some(5.0));
    }

    #[test]
    fn test_resolve_skills_accepts_name_to_level_map() {
        let (skills, rejected) = resolve_skills(&json!({"Rust": "advanced", "SQL": 60}));
        assert!(rejected.is_empty());
        let names: Vec<_> = skills.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Rust"));
        assert!(names.contains(&"SQL"));
    }

    #[test]
    fn test_resolve_skills_accepts_categorized_groups() {
        let (skills, _) = resolve_skills(&json!({
            "technical": [{"name": "Kubernetes", "level": "intermediate"}],
            "soft": ["Mentoring"]
        }));
        assert_eq!(skills.len(), 2);
    }

    #[test]
    fn test_canonicalize_skills_dedups_case_insensitively() {
        let raw = vec![
            RawSkill {
                name: "rust".into(),
                level: json!("learning"),
                years: None,
                evidence: Some("side project".into()),
            },
            RawSkill {
                name: "Rust".into(),
                level: json!("expert"),
                years: Some(4.0),
                evidence: None,
            },
        ];
        let skills = canonicalize_skills(&raw);
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "rust");
        assert_eq!(skills[0].proficiency, Proficiency::Expert);
        assert_eq!(skills[0].raw_proficiency.as_deref(), Some("expert"));
        assert_eq!(skills[0].years_experience, Some(4.0));
        assert_eq!(skills[0].evidence.as_deref(), Some("side project"));
    }

    #[test]
    fn test_canonical_keeps_raw_encoding() {
        let skill = RawSkill {
            name: "SQL".into(),
            level: json!(85),
            years: None,
            evidence: None,
        };
        let c = skill.canonical();
        assert_eq!(c.proficiency, Proficiency::Expert);
        assert_eq!(c.raw_proficiency.as_deref(), Some("85"));
    }
}
