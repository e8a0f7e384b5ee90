//! Key and shape normalization for model output.
//!
//! Keys are rewritten to snake_case and top-level section aliases are folded
//! into one canonical name, so nothing downstream special-cases model quirks.
//! Entries are then coerced into the fixed work/education shapes.

use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::analysis::{EducationEntry, PersonalInfo, StructuredProfile, WorkEntry};
use crate::skills::adapter::{resolve_skills, AdapterError};

static RE_YEARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*\+?\s*(?:years?|yrs?)\b").unwrap());
static RE_MONTHS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(?:months?|mos?)\b").unwrap());
static RE_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());
static RE_ONGOING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(present|current|now|today|ongoing)\b").unwrap());
static RE_DEGREE_IN_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.+?)\s+in\s+(.+)$").unwrap());

pub const DURATION_BUCKETS: [&str; 6] = [
    "Less than 1 year",
    "1-2 years",
    "3-5 years",
    "5-10 years",
    "10+ years",
    "Unknown",
];

const SECTION_ALIASES: &[(&str, &[&str])] = &[
    (
        "work_experience",
        &[
            "experience",
            "work_history",
            "employment",
            "employment_history",
            "professional_experience",
            "work",
            "jobs",
        ],
    ),
    (
        "education",
        &["education_history", "academic_background", "studies", "academics"],
    ),
    (
        "skills",
        &["skill_set", "skillset", "technical_skills", "competencies", "soft_skills"],
    ),
    ("certifications", &["certificates", "licenses", "certification"]),
    ("languages", &["spoken_languages", "language_skills"]),
    ("summary", &["professional_summary", "about", "objective", "bio"]),
    (
        "personal_info",
        &[
            "personal",
            "personal_information",
            "contact",
            "contact_info",
            "contact_information",
            "candidate",
        ],
    ),
    (
        "total_experience_years",
        &[
            "years_of_experience",
            "total_years_experience",
            "total_experience",
            "experience_years",
        ],
    ),
];

/// Single-key wrappers some responses put around the profile.
const WRAPPER_KEYS: &[&str] = &["profile", "resume", "data", "result", "cv"];

const DEGREE_ABBREVIATIONS: &[&str] = &[
    "ba", "bs", "bsc", "beng", "bba", "btech", "bcom", "ma", "ms", "msc", "meng", "mba", "mtech",
    "mphil", "phd", "dphil", "llb", "llm", "md", "associate", "diploma",
];

// ────────────────────────────────────────────────────────────────────────────
// Keys
// ────────────────────────────────────────────────────────────────────────────

/// `fieldOfStudy` → `field_of_study`, `Work Experience` → `work_experience`.
pub fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev: Option<char> = None;

    for c in key.trim().chars() {
        if c == ' ' || c == '-' || c == '.' || c == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        } else if c.is_uppercase() {
            let after_lower = prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit());
            if after_lower && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }

    out.trim_end_matches('_').to_string()
}

/// Rewrites every object key to snake_case, unwraps a single wrapper key, and
/// folds top-level section aliases into their canonical names.
pub fn normalize_keys(value: Value) -> Value {
    let mut value = snake_case_keys(value);

    let wrapped = match &mut value {
        Value::Object(map) if map.len() == 1 => map
            .iter()
            .next()
            .filter(|(k, v)| WRAPPER_KEYS.contains(&k.as_str()) && v.is_object())
            .map(|(k, _)| k.clone())
            .and_then(|k| map.remove(&k)),
        _ => None,
    };
    if let Some(inner) = wrapped {
        value = inner;
    }

    if let Value::Object(map) = &mut value {
        fold_aliases(map);
    }
    value
}

/// Rewrites every key to snake_case. When two spellings collapse to one name
/// the one already in snake_case wins, unless its value is null.
fn snake_case_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let (canonical, respelled): (Vec<_>, Vec<_>) =
                map.into_iter().partition(|(k, _)| to_snake_case(k) == *k);
            let mut out = Map::with_capacity(canonical.len() + respelled.len());
            for (k, v) in canonical.into_iter().chain(respelled) {
                let key = to_snake_case(&k);
                let v = snake_case_keys(v);
                match out.get_mut(&key) {
                    None => {
                        out.insert(key, v);
                    }
                    Some(existing) if existing.is_null() => *existing = v,
                    Some(existing) => {
                        if !v.is_null() && *existing != v {
                            warn!(key = %key, dropped = %k, "conflicting values for one key, keeping the first");
                        }
                    }
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(snake_case_keys).collect()),
        other => other,
    }
}

fn fold_aliases(map: &mut Map<String, Value>) {
    for (canonical, aliases) in SECTION_ALIASES {
        for alias in *aliases {
            let Some(value) = map.remove(*alias) else {
                continue;
            };
            match map.get_mut(*canonical) {
                None | Some(Value::Null) => {
                    map.insert(canonical.to_string(), value);
                }
                Some(Value::Array(existing)) => {
                    if let Value::Array(more) = value {
                        existing.extend(more);
                    }
                }
                Some(_) => {}
            }
        }
    }
}

/// True when the normalized object lacks a usable work or education array.
pub fn missing_sections(value: &Value) -> bool {
    !value.get("work_experience").is_some_and(Value::is_array)
        || !value.get("education").is_some_and(Value::is_array)
}

/// Copies `work_experience` / `education` from `sections` into `target` where
/// the target lacks them.
pub fn merge_sections(target: &mut Value, sections: &Value) {
    let Value::Object(map) = target else {
        return;
    };
    for key in ["work_experience", "education"] {
        let present = map.get(key).is_some_and(Value::is_array);
        if !present {
            if let Some(arr @ Value::Array(_)) = sections.get(key) {
                map.insert(key.to_string(), arr.clone());
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shapes
// ────────────────────────────────────────────────────────────────────────────

/// Builds the typed profile from a key-normalized object. Skill entries that
/// fail alias resolution are returned alongside.
pub fn build_profile(value: &Value) -> (StructuredProfile, Vec<AdapterError>) {
    let (skills, rejected) = value
        .get("skills")
        .map(resolve_skills)
        .unwrap_or_default();

    let profile = StructuredProfile {
        personal: personal_info(value),
        summary: value.get("summary").and_then(clean_str),
        work_experience: array_of(value, "work_experience")
            .filter_map(work_entry)
            .collect(),
        education: array_of(value, "education")
            .filter_map(education_entry)
            .collect(),
        certifications: array_of(value, "certifications")
            .filter_map(|v| labelled(v, &["name", "title", "certification"], &["issuer", "authority"]))
            .collect(),
        languages: array_of(value, "languages")
            .filter_map(|v| labelled(v, &["language", "name"], &["proficiency", "level", "fluency"]))
            .collect(),
        skills,
        total_experience_years: value.get("total_experience_years").and_then(as_f32),
    };

    (profile, rejected)
}

fn personal_info(value: &Value) -> PersonalInfo {
    let empty = Map::new();
    let nested = value
        .get("personal_info")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let top = value.as_object().unwrap_or(&empty);

    let lookup = |keys: &[&str]| first_str(nested, keys).or_else(|| first_str(top, keys));

    PersonalInfo {
        full_name: lookup(&["full_name", "name", "candidate_name"]),
        email: lookup(&["email", "email_address"]),
        phone: lookup(&["phone", "phone_number", "mobile", "telephone"]),
        location: lookup(&["location", "address", "city"]),
    }
}

fn work_entry(value: &Value) -> Option<WorkEntry> {
    let obj = value.as_object()?;
    let title = first_str(obj, &["title", "job_title", "position", "role"]);
    let company = first_str(
        obj,
        &["company", "company_name", "organization", "organisation", "employer"],
    );
    if title.is_none() && company.is_none() {
        return None;
    }

    let duration_raw = first_str(obj, &["duration", "dates", "period", "date_range", "tenure"])
        .or_else(|| {
            let start = first_str(obj, &["start_date", "from", "start"])?;
            let end = first_str(obj, &["end_date", "to", "end"]).unwrap_or_else(|| "Present".into());
            Some(format!("{start} - {end}"))
        });
    let duration = duration_raw
        .as_deref()
        .map(duration_bucket)
        .unwrap_or("Unknown")
        .to_string();

    Some(WorkEntry {
        title: title.unwrap_or_default(),
        company: company.unwrap_or_default(),
        duration,
        duration_raw,
        description: first_str(obj, &["description", "summary", "details"]),
        responsibilities: string_list(obj, &["responsibilities", "duties"]),
        achievements: string_list(obj, &["achievements", "accomplishments", "highlights"]),
        technologies: string_list(obj, &["technologies", "tech_stack", "tools", "skills_used"]),
    })
}

fn education_entry(value: &Value) -> Option<EducationEntry> {
    let obj = value.as_object()?;
    let degree_raw = first_str(obj, &["degree", "qualification", "title"]).unwrap_or_default();
    let institution = first_str(obj, &["institution", "school", "university", "college"])
        .unwrap_or_default();
    if degree_raw.is_empty() && institution.is_empty() {
        return None;
    }

    let field = first_str(
        obj,
        &["field_of_study", "field", "major", "specialization", "subject"],
    );
    let (degree, field_of_study) = match field {
        Some(f) => (degree_raw, f),
        None => {
            let (d, f) = split_degree_field(&degree_raw);
            (d, f.unwrap_or_default())
        }
    };

    Some(EducationEntry {
        degree,
        field_of_study,
        institution,
        year: first_str(
            obj,
            &["year", "graduation_year", "end_date", "date", "graduation_date"],
        ),
    })
}

/// Splits a combined "degree + field" string.
///
/// "MSc Artificial Intelligence" → ("MSc", "Artificial Intelligence"),
/// "Bachelor of Science in Physics" → ("Bachelor of Science", "Physics").
pub fn split_degree_field(raw: &str) -> (String, Option<String>) {
    let raw = raw.trim();

    if let Some(caps) = RE_DEGREE_IN_FIELD.captures(raw) {
        return (caps[1].trim().to_string(), Some(caps[2].trim().to_string()));
    }

    if let Some((head, tail)) = raw.split_once(',') {
        let lower = head.to_lowercase();
        if is_degree_abbreviation(head) || lower.contains("bachelor") || lower.contains("master") {
            return (head.trim().to_string(), Some(tail.trim().to_string()));
        }
    }

    if let Some((head, tail)) = raw.split_once(char::is_whitespace) {
        let tail = tail.trim();
        if is_degree_abbreviation(head) && !tail.is_empty() && !tail.starts_with("of ") {
            return (head.to_string(), Some(tail.to_string()));
        }
    }

    (raw.to_string(), None)
}

fn is_degree_abbreviation(token: &str) -> bool {
    let t: String = token
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    DEGREE_ABBREVIATIONS.contains(&t.as_str())
}

/// Maps a free-text duration onto one of `DURATION_BUCKETS`.
pub fn duration_bucket(raw: &str) -> &'static str {
    duration_bucket_at(raw, chrono::Utc::now().year())
}

pub fn duration_bucket_at(raw: &str, current_year: i32) -> &'static str {
    if let Some(bucket) = DURATION_BUCKETS.iter().find(|b| b.eq_ignore_ascii_case(raw.trim())) {
        return *bucket;
    }

    let mut years: Option<f64> = None;

    let stated_years: f64 = RE_YEARS
        .captures_iter(raw)
        .filter_map(|c| c[1].parse::<f64>().ok())
        .sum();
    let stated_months: f64 = RE_MONTHS
        .captures_iter(raw)
        .filter_map(|c| c[1].parse::<f64>().ok())
        .sum();
    if stated_years > 0.0 || stated_months > 0.0 {
        years = Some(stated_years + stated_months / 12.0);
    }

    if years.is_none() {
        let found: Vec<i32> = RE_YEAR
            .find_iter(raw)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        years = match found.as_slice() {
            [start, .., end] => Some((end - start) as f64),
            [start] if RE_ONGOING.is_match(raw) => Some((current_year - start) as f64),
            _ => None,
        };
    }

    match years {
        None => "Unknown",
        Some(y) if y < 0.0 => "Unknown",
        Some(y) if y < 1.0 => "Less than 1 year",
        Some(y) if y < 3.0 => "1-2 years",
        Some(y) if y <= 5.0 => "3-5 years",
        Some(y) if y < 10.0 => "5-10 years",
        Some(_) => "10+ years",
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Value helpers
// ────────────────────────────────────────────────────────────────────────────

fn array_of<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .into_iter()
        .flatten()
}

fn clean_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| obj.get(*k).and_then(clean_str))
}

fn string_list(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let Some(value) = keys.iter().find_map(|k| obj.get(*k)) else {
        return Vec::new();
    };
    match value {
        Value::Array(items) => items.iter().filter_map(clean_str).collect(),
        Value::String(s) => s
            .split([',', ';', '\n'])
            .map(|p| p.trim().trim_start_matches(['-', '•', '*']).trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// A string, or an object rendered as "name (qualifier)".
fn labelled(value: &Value, name_keys: &[&str], qualifier_keys: &[&str]) -> Option<String> {
    match value {
        Value::Object(obj) => {
            let name = first_str(obj, name_keys)?;
            Some(match first_str(obj, qualifier_keys) {
                Some(q) => format!("{name} ({q})"),
                None => name,
            })
        }
        other => clean_str(other),
    }
}

fn as_f32(value: &Value) -> Option<f32> {
    let years: Option<f32> = match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s
            .trim()
            .trim_end_matches('+')
            .trim_end_matches("years")
            .trim()
            .parse()
            .ok(),
        _ => None,
    };
    years.filter(|y| y.is_finite() && *y >= 0.0)
}
