use std::collections::HashMap;

use serde_json::Value;

use crate::skills::adapter::CanonicalSkill;
use crate::skills::proficiency::{canonicalize_requirement, Proficiency};

/// A skill requirement attached to a position, as stored.
#[derive(Debug, Clone)]
pub struct PositionRequirement {
    pub skill_name: String,
    pub required_level: Value,
}

/// Percentage (0–100) of requirements met at or above the required level.
/// `None` when the position has no requirements.
pub fn match_score(requirements: &[PositionRequirement], skills: &[CanonicalSkill]) -> Option<u32> {
    if requirements.is_empty() {
        return None;
    }

    let held: HashMap<String, Proficiency> = skills
        .iter()
        .map(|s| (s.name.to_lowercase(), s.proficiency))
        .collect();

    let met = requirements
        .iter()
        .filter(|r| {
            let required = canonicalize_requirement(&r.required_level);
            held.get(&r.skill_name.trim().to_lowercase())
                .is_some_and(|level| *level >= required)
        })
        .count();

    Some(((met as f64 / requirements.len() as f64) * 100.0).round() as u32)
}
