//! Static legal knowledge: case types, process descriptions, required
//! documents, timelines, fees, statutes of limitation, and the attorney
//! roster.
//!
//! Lookups take an `Option<CaseType>` so callers holding an unrecognized case
//! type string still get the generic answer.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static CAR_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(cars?|vehicle|truck|collision|rear[- ]end(ed)?|crash(ed)?|driver|motorcycle)\b")
        .expect("valid regex")
});
static FALL_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(slip(s|ped)?|fell|fall(s|ing)?|trip(s|ped)?|wet floor|stairs|icy)\b")
        .expect("valid regex")
});
static INJURY_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(injur\w*|hurt|accidents?|bitten|negligen\w*)\b").expect("valid regex")
});

/// Practice areas the intake bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseType {
    PersonalInjury,
    CarAccident,
    SlipAndFall,
}

impl CaseType {
    pub const ALL: [CaseType; 3] = [
        CaseType::PersonalInjury,
        CaseType::CarAccident,
        CaseType::SlipAndFall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseType::PersonalInjury => "personal_injury",
            CaseType::CarAccident => "car_accident",
            CaseType::SlipAndFall => "slip_and_fall",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s.trim())
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CaseType::PersonalInjury => "Personal Injury",
            CaseType::CarAccident => "Car Accident",
            CaseType::SlipAndFall => "Slip and Fall",
        }
    }

    /// Keyword guess at the case type of a free-text description.
    pub fn detect(message: &str) -> Option<Self> {
        if CAR_WORDS.is_match(message) {
            Some(CaseType::CarAccident)
        } else if FALL_WORDS.is_match(message) {
            Some(CaseType::SlipAndFall)
        } else if INJURY_WORDS.is_match(message) {
            Some(CaseType::PersonalInjury)
        } else {
            None
        }
    }
}

impl std::fmt::Display for CaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn process_info(case_type: Option<CaseType>) -> &'static str {
    match case_type {
        Some(CaseType::PersonalInjury) => {
            "Personal injury cases typically involve proving liability, documenting injuries, and negotiating with insurers. The process may include investigation, medical treatment, settlement talks, and possibly litigation."
        }
        Some(CaseType::CarAccident) => {
            "Car accident claims require police reports, medical records, and often involve dealing with insurance companies. Timely documentation is crucial."
        }
        Some(CaseType::SlipAndFall) => {
            "Slip and fall cases require evidence of unsafe conditions, witness statements, and prompt reporting to property owners."
        }
        None => "Legal process information is not available for this case type.",
    }
}

pub fn required_documents(case_type: Option<CaseType>) -> &'static [&'static str] {
    match case_type {
        Some(CaseType::PersonalInjury) => &[
            "Police report",
            "Medical records",
            "Photos of injuries",
            "Insurance info",
        ],
        Some(CaseType::CarAccident) => &["Accident report", "Insurance card", "Repair estimates"],
        Some(CaseType::SlipAndFall) => &["Incident report", "Photos of scene", "Witness contacts"],
        None => &["Please provide any relevant documents you have, such as reports, photos, or medical records."],
    }
}

pub fn timeline(case_type: Option<CaseType>) -> &'static str {
    match case_type {
        Some(CaseType::PersonalInjury) => {
            "Most cases resolve in 6-18 months, but timelines vary based on complexity and negotiations."
        }
        Some(CaseType::CarAccident) => {
            "Car accident claims may resolve in a few months if liability is clear, or take longer if disputed."
        }
        Some(CaseType::SlipAndFall) => {
            "Slip and fall cases can take 6-24 months depending on evidence and negotiations."
        }
        None => {
            "Timeline varies depending on case details. Most cases resolve within 6-24 months."
        }
    }
}

/// Fee information is the same for every practice area.
pub fn fee_info(_case_type: Option<CaseType>) -> &'static str {
    "Most personal injury attorneys work on a contingency fee basis (typically 33-40% of recovery). No upfront fees in most cases."
}

pub fn statute_text(case_type: Option<CaseType>) -> &'static str {
    match case_type {
        Some(CaseType::PersonalInjury) | None => "3 years from date of injury (varies by state)",
        Some(CaseType::CarAccident) => "3 years from date of accident (varies by state)",
        Some(CaseType::SlipAndFall) => "3 years from date of incident (varies by state)",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attorney {
    pub name: String,
    pub case_types: Vec<CaseType>,
    pub location: String,
}

impl Attorney {
    fn new(name: &str, case_types: &[CaseType], location: &str) -> Self {
        Self {
            name: name.to_string(),
            case_types: case_types.to_vec(),
            location: location.to_string(),
        }
    }

    fn handles(&self, case_type: CaseType) -> bool {
        self.case_types.contains(&case_type)
    }
}

/// Pairs a case with an attorney, preferring a local match.
#[derive(Debug, Clone)]
pub struct AttorneyMatcher {
    roster: Vec<Attorney>,
}

impl AttorneyMatcher {
    pub fn new(roster: Vec<Attorney>) -> Self {
        Self { roster }
    }

    /// Local match first, then any attorney for the case type, then a
    /// placeholder.
    pub fn match_attorney(&self, case_type: CaseType, location: &str) -> Attorney {
        self.roster
            .iter()
            .find(|a| a.handles(case_type) && a.location == location)
            .or_else(|| self.roster.iter().find(|a| a.handles(case_type)))
            .cloned()
            .unwrap_or_else(|| Attorney::new("Any Available Attorney", &[case_type], location))
    }
}

impl Default for AttorneyMatcher {
    fn default() -> Self {
        Self::new(vec![
            Attorney::new(
                "Jane Smith",
                &[CaseType::PersonalInjury, CaseType::CarAccident],
                "NY",
            ),
            Attorney::new("John Doe", &[CaseType::SlipAndFall], "NY"),
            Attorney::new("Maria Garcia", &[CaseType::PersonalInjury], "CA"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for ct in CaseType::ALL {
            assert_eq!(CaseType::parse(ct.as_str()), Some(ct));
        }
        assert_eq!(CaseType::parse("maritime"), None);
    }

    #[test]
    fn test_detect() {
        assert_eq!(
            CaseType::detect("I was rear-ended at a light"),
            Some(CaseType::CarAccident)
        );
        assert_eq!(
            CaseType::detect("I slipped on a wet floor at the store"),
            Some(CaseType::SlipAndFall)
        );
        assert_eq!(
            CaseType::detect("I got hurt at work"),
            Some(CaseType::PersonalInjury)
        );
        assert_eq!(
            CaseType::detect("I fell and needed medical care"),
            Some(CaseType::SlipAndFall)
        );
        assert_eq!(CaseType::detect("what are your hours"), None);
    }

    #[test]
    fn test_unknown_case_type_falls_back() {
        assert!(process_info(None).contains("not available"));
        assert_eq!(required_documents(None).len(), 1);
        assert!(timeline(None).contains("6-24 months"));
    }

    #[test]
    fn test_attorney_matching() {
        let matcher = AttorneyMatcher::default();
        assert_eq!(
            matcher.match_attorney(CaseType::PersonalInjury, "CA").name,
            "Maria Garcia"
        );
        assert_eq!(
            matcher.match_attorney(CaseType::SlipAndFall, "NY").name,
            "John Doe"
        );
        // No CA slip-and-fall attorney: fall back to any location.
        assert_eq!(
            matcher.match_attorney(CaseType::SlipAndFall, "CA").name,
            "John Doe"
        );
        let empty = AttorneyMatcher::new(Vec::new());
        let placeholder = empty.match_attorney(CaseType::CarAccident, "TX");
        assert_eq!(placeholder.name, "Any Available Attorney");
        assert_eq!(placeholder.location, "TX");
    }
}
