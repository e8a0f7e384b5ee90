//! Rewrites stored skill rows onto the canonical scale. Rows that kept their
//! raw encoding are re-derived from it; the rest are clamped into range.

use serde::Serialize;
use tracing::info;

use crate::db::StoreError;
use crate::ingestion::store::ProfileStore;
use crate::skills::proficiency::{canonicalize_str, Proficiency};

const PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StandardizeReport {
    pub scanned: u64,
    pub updated: u64,
}

pub async fn standardize_existing(profiles: &dyn ProfileStore) -> Result<StandardizeReport, StoreError> {
    let mut report = StandardizeReport::default();
    let mut after = None;

    loop {
        let page = profiles.skill_levels(after, PAGE_SIZE).await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id);

        for row in &page {
            report.scanned += 1;
            let target = match row.raw_proficiency.as_deref() {
                Some(raw) => canonicalize_str(raw),
                None => Proficiency::from_canonical(f64::from(row.proficiency)),
            };
            if i16::from(target.level()) != row.proficiency {
                profiles.set_skill_proficiency(row.id, target).await?;
                report.updated += 1;
            }
        }

        if (page.len() as i64) < PAGE_SIZE {
            break;
        }
    }

    info!(
        scanned = report.scanned,
        updated = report.updated,
        "standardized existing skills"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::SkillSource;
    use crate::testing::InMemoryProfiles;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_rewrites_only_rows_off_scale() {
        let profiles = InMemoryProfiles::default();
        let subject = Uuid::new_v4();
        let pct = profiles.insert_raw_skill(subject, "Rust", 85, Some("85"), SkillSource::Cv);
        let word = profiles.insert_raw_skill(subject, "Go", 1, Some("Advanced"), SkillSource::Cv);
        let legacy = profiles.insert_raw_skill(subject, "SQL", 7, None, SkillSource::Manual);
        let fine = profiles.insert_raw_skill(subject, "Bash", 2, Some("using"), SkillSource::Verified);

        let report = standardize_existing(&profiles).await.unwrap();

        assert_eq!(report, StandardizeReport { scanned: 4, updated: 3 });
        assert_eq!(profiles.proficiency_of(pct), Some(3));
        assert_eq!(profiles.proficiency_of(word), Some(3));
        assert_eq!(profiles.proficiency_of(legacy), Some(3));
        assert_eq!(profiles.proficiency_of(fine), Some(2));
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let profiles = InMemoryProfiles::default();
        let subject = Uuid::new_v4();
        for i in 0..3 {
            profiles.insert_raw_skill(subject, &format!("skill-{i}"), -4, None, SkillSource::Cv);
        }
        standardize_existing(&profiles).await.unwrap();
        let again = standardize_existing(&profiles).await.unwrap();
        assert_eq!(again, StandardizeReport { scanned: 3, updated: 0 });
    }
}
