//! Case assessment and damage estimation.
//!
//! Both scorers are pure functions of a `caseDetails` map. Missing or
//! mistyped fields contribute nothing; neither function can fail.
//!
//! # Strength points
//!
//! | Field | Points |
//! |-------|--------|
//! | `injuryType` | 2 |
//! | `incidentDate` | 2 |
//! | `liabilityAdmitted` | 2 |
//! | `medicalTreatment` | 1 |
//! | `witnesses` | 1 |
//! | `damages` | 1 |
//! | `insurance` | 1 |
//!
//! `>= 7` is Strong, `>= 4` Moderate, anything else Weak.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::models::{CaseAssessment, CaseStrength, DamageEstimate, Details, StatuteStatus};

static SEVERE_INJURY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)fracture|broken|surgery|hospital").expect("valid regex"));
static MINOR_INJURY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)soft tissue|bruise|sprain").expect("valid regex"));

const SEVERE_INJURY_BONUS: f64 = 10_000.0;
const MINOR_INJURY_BONUS: f64 = 2_000.0;

const STRENGTH_POINTS: [(&str, u32); 7] = [
    ("injuryType", 2),
    ("incidentDate", 2),
    ("liabilityAdmitted", 2),
    ("medicalTreatment", 1),
    ("witnesses", 1),
    ("damages", 1),
    ("insurance", 1),
];

const DAYS_PER_YEAR: f64 = 365.25;
const STATUTE_YEARS: f64 = 3.0;
const STATUTE_WARNING_YEARS: f64 = 2.5;

/// Evaluate `details` as of `now`.
pub fn assess_case(details: &Details, now: DateTime<Utc>) -> CaseAssessment {
    let strength = assess_strength(details);
    let estimated_value = estimate_value(details);
    let statute_status = check_statute(details, now);
    let summary = format!(
        "Case Strength: {}. Estimated Value: {}. Statute of Limitations: {}.",
        strength.as_str(),
        estimated_value,
        statute_status.as_str()
    );
    CaseAssessment {
        strength,
        estimated_value,
        statute_status,
        summary,
    }
}

pub fn assess_strength(details: &Details) -> CaseStrength {
    let score: u32 = STRENGTH_POINTS
        .iter()
        .filter(|(field, _)| details.get(*field).is_some_and(is_truthy))
        .map(|(_, points)| points)
        .sum();

    if score >= 7 {
        CaseStrength::Strong
    } else if score >= 4 {
        CaseStrength::Moderate
    } else {
        CaseStrength::Weak
    }
}

/// `"Estimated $N"` from numeric damages, lost wages, and an injury bonus,
/// or `"Unknown"` when nothing adds up to a positive amount.
pub fn estimate_value(details: &Details) -> String {
    let mut base = number(details, "damages").unwrap_or(0.0);
    if let Some(injury) = text(details, "injuryType") {
        if SEVERE_INJURY.is_match(injury) {
            base += SEVERE_INJURY_BONUS;
        }
        if MINOR_INJURY.is_match(injury) {
            base += MINOR_INJURY_BONUS;
        }
    }
    base += number(details, "lostWages").unwrap_or(0.0);

    if base > 0.0 {
        format!("Estimated ${}", format_amount(base))
    } else {
        "Unknown".to_string()
    }
}

pub fn check_statute(details: &Details, now: DateTime<Utc>) -> StatuteStatus {
    let Some(value) = details.get("incidentDate").filter(|v| is_truthy(v)) else {
        return StatuteStatus::Unknown;
    };
    let Some(incident) = parse_date(value) else {
        return StatuteStatus::Unknown;
    };

    let elapsed_days = (now - incident).num_milliseconds() as f64 / 86_400_000.0;
    let years = elapsed_days / DAYS_PER_YEAR;
    if years > STATUTE_YEARS {
        StatuteStatus::Expired
    } else if years > STATUTE_WARNING_YEARS {
        StatuteStatus::NearingExpiration
    } else {
        StatuteStatus::Valid
    }
}

/// Itemized damages: medical bills, lost wages, and pain and suffering as a
/// multiple of medical bills (3x severe, 1.5x minor, 1x otherwise).
pub fn calculate_damages(details: &Details) -> DamageEstimate {
    let medical = number(details, "medicalBills").unwrap_or(0.0);
    let wages = number(details, "lostWages").unwrap_or(0.0);

    let multiplier = match text(details, "injuryType") {
        Some(injury) if SEVERE_INJURY.is_match(injury) => 3.0,
        Some(injury) if MINOR_INJURY.is_match(injury) => 1.5,
        _ => 1.0,
    };
    let pain_and_suffering = medical * multiplier;
    let total = medical + wages + pain_and_suffering;

    DamageEstimate {
        medical,
        wages,
        pain_and_suffering,
        total,
        breakdown: format!(
            "Medical: ${}, Wages: ${}, Pain/Suffering: ${}",
            plain_number(medical),
            plain_number(wages),
            plain_number(pain_and_suffering)
        ),
    }
}

/// JavaScript-style truthiness: `null`, `false`, `0`, and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn number(details: &Details, field: &str) -> Option<f64> {
    details.get(field).and_then(Value::as_f64)
}

fn text<'a>(details: &'a Details, field: &str) -> Option<&'a str> {
    details.get(field).and_then(Value::as_str)
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS`,
/// `MM/DD/YYYY`, or epoch milliseconds.
fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Some(dt.and_utc());
            }
            ["%Y-%m-%d", "%m/%d/%Y"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        }
        _ => None,
    }
}

/// en-US grouping with up to three fraction digits: `15000` → `15,000`,
/// `1234.5` → `1,234.5`.
pub fn format_amount(amount: f64) -> String {
    let rounded = (amount * 1000.0).round() / 1000.0;
    let whole = rounded.trunc();
    let digits = format!("{:.0}", whole.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        grouped.insert(0, '-');
    }

    let fraction = (rounded - whole).abs();
    if fraction > 0.0 {
        let frac = format!("{:.3}", fraction);
        let frac = frac.trim_end_matches('0');
        if let Some(rest) = frac.strip_prefix('0') {
            grouped.push_str(rest);
        }
    }
    grouped
}

/// Whole numbers without a decimal point, others as-is.
fn plain_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}
