pub mod adapter;
pub mod handlers;
pub mod matching;
pub mod proficiency;
pub mod standardize;

use serde::{Deserialize, Serialize};

/// Where a skill row came from. Replace-by-source only ever touches one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillSource {
    Cv,
    Verified,
    Manual,
}

impl SkillSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SkillSource::Cv => "cv",
            SkillSource::Verified => "verified",
            SkillSource::Manual => "manual",
        }
    }
}
