//! Entity extraction from free-text messages.
//!
//! The [`Extractor`] trait is the extension point the dispatcher uses to
//! grow a session's `caseDetails` and `userInfo` and to decide its
//! conversation stage. Two implementations ship:
//!
//! - [`PassthroughExtractor`]: returns inputs unchanged and always reports
//!   the `initial` stage.
//! - [`HeuristicExtractor`]: regex and keyword pulls of contact details,
//!   injury descriptions, dates, dollar amounts, and yes/no case facts.
//!
//! Extractors only add fields; a value already present is never replaced.

use anyhow::Result;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

use crate::assess::is_truthy;
use crate::models::{ConversationStage, Details, IntentResult, Session};

pub trait Extractor: Send + Sync {
    fn extract_case_details(
        &self,
        message: &str,
        intent: &IntentResult,
        previous: &Details,
    ) -> Result<Details>;

    fn extract_user_info(
        &self,
        message: &str,
        intent: &IntentResult,
        previous: &Details,
    ) -> Result<Details>;

    /// Stage for `session`, which already carries this turn's extracted details.
    fn determine_stage(&self, intent: &IntentResult, session: &Session)
        -> Result<ConversationStage>;
}

/// No extraction: details pass through and the stage stays `initial`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughExtractor;

impl Extractor for PassthroughExtractor {
    fn extract_case_details(&self, _: &str, _: &IntentResult, previous: &Details) -> Result<Details> {
        Ok(previous.clone())
    }

    fn extract_user_info(&self, _: &str, _: &IntentResult, previous: &Details) -> Result<Details> {
        Ok(previous.clone())
    }

    fn determine_stage(&self, _: &IntentResult, _: &Session) -> Result<ConversationStage> {
        Ok(ConversationStage::Initial)
    }
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}")
        .expect("valid regex")
});
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\(?\d{3}\)?[\s.-]?)?\d{3}[\s.-]\d{4}\b").expect("valid regex")
});
static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:\bmy name is)\s+([A-Za-z][A-Za-z'-]+(?:\s+[A-Z][A-Za-z'-]+)?)")
        .expect("valid regex")
});
static AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s?(\d[\d,]*(?:\.\d+)?)").expect("valid regex"));
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("valid regex"));
static US_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}/\d{1,2}/\d{4})\b").expect("valid regex"));

/// Injury phrases, most specific first.
const INJURIES: &[&str] = &[
    "head injury",
    "concussion",
    "fracture",
    "broken",
    "surgery",
    "whiplash",
    "soft tissue",
    "back pain",
    "neck pain",
    "sprain",
    "bruise",
];

const MEDICAL: &[&str] = &[
    "hospital",
    "doctor",
    "emergency room",
    "urgent care",
    "physical therapy",
    "surgery",
    "treated",
    "chiropractor",
];
const WITNESSES: &[&str] = &["witness", "saw it", "someone saw", "bystander"];
const INSURANCE: &[&str] = &["insurance", "insurer", "insured", "adjuster"];
const LIABILITY: &[&str] = &[
    "admitted fault",
    "admitted it was",
    "their fault",
    "his fault",
    "her fault",
    "got a ticket",
    "was ticketed",
    "was cited",
];

/// Regex and keyword based extraction.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    fn amount_field(lower: &str) -> &'static str {
        if lower.contains("wage") || lower.contains("missed work") {
            "lostWages"
        } else if lower.contains("medical bill") || lower.contains("hospital bill") {
            "medicalBills"
        } else {
            "damages"
        }
    }
}

fn insert_missing(details: &mut Details, key: &str, value: Value) {
    if !details.get(key).is_some_and(is_truthy) {
        details.insert(key.to_string(), value);
    }
}

fn mentions(lower: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| lower.contains(p))
}

impl Extractor for HeuristicExtractor {
    fn extract_case_details(
        &self,
        message: &str,
        _intent: &IntentResult,
        previous: &Details,
    ) -> Result<Details> {
        let lower = message.to_lowercase();
        let mut details = previous.clone();

        if let Some(injury) = INJURIES.iter().find(|i| lower.contains(*i)) {
            insert_missing(&mut details, "injuryType", json!(injury));
        }

        let date = ISO_DATE
            .captures(message)
            .or_else(|| US_DATE.captures(message))
            .map(|c| c[1].to_string());
        if let Some(date) = date {
            insert_missing(&mut details, "incidentDate", json!(date));
        }

        if let Some(caps) = AMOUNT.captures(message) {
            let digits = caps[1].replace(',', "");
            if let Ok(amount) = digits.parse::<f64>() {
                insert_missing(&mut details, Self::amount_field(&lower), json!(amount));
            }
        }

        for (key, phrases) in [
            ("medicalTreatment", MEDICAL),
            ("witnesses", WITNESSES),
            ("insurance", INSURANCE),
            ("liabilityAdmitted", LIABILITY),
        ] {
            if mentions(&lower, phrases) {
                insert_missing(&mut details, key, json!(true));
            }
        }

        Ok(details)
    }

    fn extract_user_info(
        &self,
        message: &str,
        _intent: &IntentResult,
        previous: &Details,
    ) -> Result<Details> {
        let mut info = previous.clone();

        if let Some(email) = EMAIL.find(message) {
            insert_missing(&mut info, "email", json!(email.as_str()));
        }
        // Strip emails and dates first so their digits are not read as a phone number.
        let scrubbed = EMAIL.replace_all(message, " ");
        let scrubbed = ISO_DATE.replace_all(&scrubbed, " ");
        let scrubbed = US_DATE.replace_all(&scrubbed, " ");
        if let Some(phone) = PHONE.find(&scrubbed) {
            insert_missing(&mut info, "phone", json!(phone.as_str().trim()));
        }
        if let Some(caps) = NAME.captures(message) {
            insert_missing(&mut info, "name", json!(caps[1].trim()));
        }

        Ok(info)
    }

    fn determine_stage(&self, _intent: &IntentResult, session: &Session) -> Result<ConversationStage> {
        let has = |map: &Details, key: &str| map.get(key).is_some_and(is_truthy);
        let details = &session.case_details;
        let info = &session.user_info;

        let assessed = has(details, "injuryType") && has(details, "incidentDate");
        let contact = has(info, "phone") || has(info, "email");

        Ok(if assessed && contact {
            ConversationStage::Qualified
        } else if assessed {
            ConversationStage::Assessed
        } else if !details.is_empty() {
            ConversationStage::GatheringDetails
        } else {
            ConversationStage::Initial
        })
    }
}

/// Build the extractor named by `extraction.mode`.
pub fn create_extractor(mode: &str) -> Result<Box<dyn Extractor>> {
    match mode {
        "passthrough" => Ok(Box::new(PassthroughExtractor)),
        "heuristic" => Ok(Box::new(HeuristicExtractor)),
        other => anyhow::bail!("Unknown extraction mode: {}", other),
    }
}
