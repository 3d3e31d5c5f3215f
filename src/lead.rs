//! Lead qualification.
//!
//! | Signal | Points |
//! |--------|--------|
//! | Strong / Moderate case | 3 / 2 |
//! | Statute valid / nearing expiration | 2 / 1 |
//! | Phone or email on file | 2 |
//! | Name on file | 1 |
//! | Dollar estimate available | 1 |
//!
//! `>= 7` Hot, `>= 5` Qualified, `>= 3` Warm, otherwise Cold.

use regex::Regex;
use std::sync::LazyLock;

use crate::assess::is_truthy;
use crate::models::{CaseAssessment, CaseStrength, Details, LeadLabel, LeadScore, StatuteStatus};

static DOLLAR_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\d+").expect("valid regex"));

pub fn score_lead(assessment: &CaseAssessment, user_info: &Details) -> LeadScore {
    let has = |field: &str| user_info.get(field).is_some_and(is_truthy);

    let mut score = 0;
    score += match assessment.strength {
        CaseStrength::Strong => 3,
        CaseStrength::Moderate => 2,
        CaseStrength::Weak => 0,
    };
    score += match assessment.statute_status {
        StatuteStatus::Valid => 2,
        StatuteStatus::NearingExpiration => 1,
        StatuteStatus::Expired | StatuteStatus::Unknown => 0,
    };
    if has("phone") || has("email") {
        score += 2;
    }
    if has("name") {
        score += 1;
    }
    if DOLLAR_AMOUNT.is_match(&assessment.estimated_value) {
        score += 1;
    }

    LeadScore {
        label: label_for(score),
        score,
    }
}

fn label_for(score: i32) -> LeadLabel {
    match score {
        s if s >= 7 => LeadLabel::Hot,
        s if s >= 5 => LeadLabel::Qualified,
        s if s >= 3 => LeadLabel::Warm,
        _ => LeadLabel::Cold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assessment(strength: CaseStrength, statute: StatuteStatus, value: &str) -> CaseAssessment {
        CaseAssessment {
            strength,
            estimated_value: value.to_string(),
            statute_status: statute,
            summary: String::new(),
        }
    }

    fn info(value: serde_json::Value) -> Details {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_hot_lead() {
        let a = assessment(CaseStrength::Strong, StatuteStatus::Valid, "Estimated $15,000");
        let lead = score_lead(&a, &info(json!({ "phone": "555-1234", "name": "Jane" })));
        assert_eq!(lead.score, 9);
        assert_eq!(lead.label, LeadLabel::Hot);
    }

    #[test]
    fn test_cold_lead_without_anything() {
        let a = assessment(CaseStrength::Weak, StatuteStatus::Unknown, "Unknown");
        let lead = score_lead(&a, &Details::new());
        assert_eq!(lead.score, 0);
        assert_eq!(lead.label, LeadLabel::Cold);
    }

    #[test]
    fn test_thresholds() {
        // Moderate (2) + nearing (1) = 3 → Warm
        let a = assessment(CaseStrength::Moderate, StatuteStatus::NearingExpiration, "Unknown");
        assert_eq!(score_lead(&a, &Details::new()).label, LeadLabel::Warm);

        // + email (2) = 5 → Qualified
        let lead = score_lead(&a, &info(json!({ "email": "a@b.com" })));
        assert_eq!(lead.score, 5);
        assert_eq!(lead.label, LeadLabel::Qualified);

        // phone and email together still count once
        let lead = score_lead(&a, &info(json!({ "email": "a@b.com", "phone": "1" })));
        assert_eq!(lead.score, 5);
    }

    #[test]
    fn test_empty_contact_fields_do_not_count() {
        let a = assessment(CaseStrength::Weak, StatuteStatus::Expired, "Estimated $2,000");
        let lead = score_lead(&a, &info(json!({ "phone": "", "name": null })));
        assert_eq!(lead.score, 1);
        assert_eq!(lead.label, LeadLabel::Cold);
    }
}
