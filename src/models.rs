//! Core data models used throughout lex-intake.
//!
//! These types represent the sessions, conversation turns, classification
//! results, and scorer outputs that flow through the intake pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form JSON object used for `caseDetails` and `userInfo`.
///
/// Kept as a JSON map so scorers can tell numeric values (`damages: 5000`)
/// apart from text (`damages: "a lot"`).
pub type Details = Map<String, Value>;

/// Intent labels understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Greeting,
    CaseInquiry,
    InjuryDetails,
    IncidentInfo,
    DamagesInquiry,
    TimelineQuestion,
    FeeInquiry,
    ConsultationRequest,
    DocumentQuestion,
    StatuteInquiry,
    GeneralLegal,
    /// Produced only when message processing fails.
    Error,
}

impl Intent {
    /// Every intent, in declaration order.
    pub const ALL: [Intent; 12] = [
        Intent::Greeting,
        Intent::CaseInquiry,
        Intent::InjuryDetails,
        Intent::IncidentInfo,
        Intent::DamagesInquiry,
        Intent::TimelineQuestion,
        Intent::FeeInquiry,
        Intent::ConsultationRequest,
        Intent::DocumentQuestion,
        Intent::StatuteInquiry,
        Intent::GeneralLegal,
        Intent::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "GREETING",
            Intent::CaseInquiry => "CASE_INQUIRY",
            Intent::InjuryDetails => "INJURY_DETAILS",
            Intent::IncidentInfo => "INCIDENT_INFO",
            Intent::DamagesInquiry => "DAMAGES_INQUIRY",
            Intent::TimelineQuestion => "TIMELINE_QUESTION",
            Intent::FeeInquiry => "FEE_INQUIRY",
            Intent::ConsultationRequest => "CONSULTATION_REQUEST",
            Intent::DocumentQuestion => "DOCUMENT_QUESTION",
            Intent::StatuteInquiry => "STATUTE_INQUIRY",
            Intent::GeneralLegal => "GENERAL_LEGAL",
            Intent::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an [`IntentResult`] was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Pattern,
    Keyword,
    Fallback,
}

/// Output of the intent classifier for a single message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentResult {
    #[serde(rename = "type")]
    pub intent: Intent,
    pub confidence: f64,
    pub method: MatchMethod,
    /// Source of the regex that matched (pattern phase only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Keywords found in the message (keyword phase only).
    #[serde(rename = "matchedKeywords", skip_serializing_if = "Vec::is_empty")]
    pub matched_keywords: Vec<String>,
}

/// Where a conversation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    #[default]
    Initial,
    GatheringDetails,
    Assessed,
    Qualified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in a session's conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub message: String,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Conversation state for a single visitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity: DateTime<Utc>,
    pub conversation_stage: ConversationStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_intent: Option<Intent>,
    pub case_details: Details,
    pub user_info: Details,
    pub conversation_history: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_score: Option<i32>,
}

impl Session {
    /// A fresh session in the `initial` stage with no details or history.
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at: now,
            last_activity: now,
            conversation_stage: ConversationStage::Initial,
            last_intent: None,
            case_details: Details::new(),
            user_info: Details::new(),
            conversation_history: Vec::new(),
            lead_score: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStrength {
    Strong,
    Moderate,
    Weak,
}

impl CaseStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStrength::Strong => "Strong",
            CaseStrength::Moderate => "Moderate",
            CaseStrength::Weak => "Weak",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatuteStatus {
    Valid,
    #[serde(rename = "Nearing expiration")]
    NearingExpiration,
    Expired,
    Unknown,
}

impl StatuteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatuteStatus::Valid => "Valid",
            StatuteStatus::NearingExpiration => "Nearing expiration",
            StatuteStatus::Expired => "Expired",
            StatuteStatus::Unknown => "Unknown",
        }
    }
}

/// Heuristic evaluation of a prospective case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseAssessment {
    pub strength: CaseStrength,
    pub estimated_value: String,
    pub statute_status: StatuteStatus,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadLabel {
    Hot,
    Qualified,
    Warm,
    Cold,
}

/// Qualification of a prospective client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadScore {
    pub label: LeadLabel,
    pub score: i32,
}

/// Itemized damages estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageEstimate {
    pub medical: f64,
    pub wages: f64,
    pub pain_and_suffering: f64,
    pub total: f64,
    pub breakdown: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_serializes_screaming_snake() {
        let json = serde_json::to_string(&Intent::ConsultationRequest).unwrap();
        assert_eq!(json, "\"CONSULTATION_REQUEST\"");
        for intent in Intent::ALL {
            let json = serde_json::to_value(intent).unwrap();
            assert_eq!(json.as_str(), Some(intent.as_str()));
        }
    }

    #[test]
    fn test_statute_status_wire_name() {
        let json = serde_json::to_string(&StatuteStatus::NearingExpiration).unwrap();
        assert_eq!(json, "\"Nearing expiration\"");
    }

    #[test]
    fn test_new_session_is_empty() {
        let now = Utc::now();
        let session = Session::new("abc", now);
        assert_eq!(session.conversation_stage, ConversationStage::Initial);
        assert!(session.case_details.is_empty());
        assert!(session.user_info.is_empty());
        assert!(session.conversation_history.is_empty());
        assert_eq!(session.created_at, session.last_activity);
    }
}
