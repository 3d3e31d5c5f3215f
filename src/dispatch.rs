//! Message processing: classify, update session state, dispatch to a
//! handler, and assemble the reply.
//!
//! # Architecture
//!
//! ```text
//! message ──▶ IntentClassifier ──▶ Extractor ──▶ HandlerTable ──▶ ChatOutcome
//!                                    │               │
//!                               caseDetails     assess / score / LLM
//!                               userInfo
//! ```
//!
//! Every [`Intent`] has a built-in handler. Callers can replace any of them
//! with their own [`IntentHandler`] via [`HandlerTable::register`].
//!
//! # Failure
//!
//! If the extractor or handler returns an error or panics,
//! [`MessageProcessor::process_message`] returns a fixed apology with intent `ERROR`, confidence `0.1`, and the
//! session exactly as it was passed in. Nothing from the failed turn is kept.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::assess::{assess_case, calculate_damages};
use crate::clients::ClientConfig;
use crate::config::{Config, Environment};
use crate::extract::{create_extractor, Extractor, PassthroughExtractor};
use crate::intent::IntentClassifier;
use crate::knowledge::{self, AttorneyMatcher, CaseType};
use crate::lead::score_lead;
use crate::llm::{
    create_completer, parse_structured, with_fallback, Answer, AnswerSource, Completer,
    CompletionOptions, DisabledCompleter, LlmError,
};
use crate::models::{
    CaseAssessment, Intent, IntentResult, LeadScore, Role, Session, StatuteStatus, Turn,
};
use crate::session::{Clock, SystemClock};

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Reply sent when processing a message fails.
pub const ERROR_RESPONSE: &str = "I apologize, but I'm experiencing technical difficulties. Please contact our office directly for immediate legal assistance.";

/// Confidence reported with [`ERROR_RESPONSE`].
pub const ERROR_CONFIDENCE: f64 = 0.1;

/// Confidence assumed when a handler does not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Everything a handler may look at while producing a reply.
pub struct HandlerContext<'a> {
    pub message: &'a str,
    pub intent: &'a IntentResult,
    /// The session with this turn's user message already appended.
    pub session: &'a Session,
    pub client: &'a ClientConfig,
    pub now: DateTime<Utc>,
    completer: &'a dyn Completer,
    attorneys: &'a AttorneyMatcher,
}

impl<'a> HandlerContext<'a> {
    /// Assessment of the session's case details as of now.
    pub fn assess(&self) -> CaseAssessment {
        assess_case(&self.session.case_details, self.now)
    }

    /// Best guess at the case type: stored `caseType`, then this message,
    /// then earlier user messages, newest first.
    pub fn case_type(&self) -> Option<CaseType> {
        self.session
            .case_details
            .get("caseType")
            .and_then(|v| v.as_str())
            .and_then(CaseType::parse)
            .or_else(|| CaseType::detect(self.message))
            .or_else(|| {
                self.session
                    .conversation_history
                    .iter()
                    .rev()
                    .filter(|t| t.role == Role::User)
                    .find_map(|t| CaseType::detect(&t.message))
            })
    }

    /// [`case_type`](Self::case_type), or the client's first supported type.
    pub fn case_type_or_default(&self) -> CaseType {
        self.case_type()
            .or_else(|| self.client.case_types().first().copied())
            .unwrap_or(CaseType::PersonalInjury)
    }

    pub fn completer(&self) -> &dyn Completer {
        self.completer
    }

    pub fn attorneys(&self) -> &AttorneyMatcher {
        self.attorneys
    }
}

/// What a handler contributes to the outcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerReply {
    pub response: String,
    pub confidence: Option<f64>,
    pub case_type: Option<CaseType>,
    pub case_assessment: Option<CaseAssessment>,
    pub lead_score: Option<LeadScore>,
    pub next_questions: Vec<String>,
    pub suggested_actions: Vec<String>,
}

impl HandlerReply {
    fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            ..Default::default()
        }
    }
}

/// Produces a reply for one intent.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerReply>;
}

/// Intent → handler lookup.
pub struct HandlerTable {
    handlers: HashMap<Intent, Arc<dyn IntentHandler>>,
    default: Arc<dyn IntentHandler>,
}

impl HandlerTable {
    /// An empty table: every intent goes to the general-legal handler.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            default: Arc::new(BuiltinHandler(Intent::GeneralLegal)),
        }
    }

    /// A table with the built-in handler registered for every intent.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        for intent in Intent::ALL {
            table.register(intent, Arc::new(BuiltinHandler(intent)));
        }
        table
    }

    /// Register `handler` for `intent`, replacing any existing one.
    pub fn register(&mut self, intent: Intent, handler: Arc<dyn IntentHandler>) {
        self.handlers.insert(intent, handler);
    }

    /// The handler for `intent`, or the default.
    pub fn find(&self, intent: Intent) -> &Arc<dyn IntentHandler> {
        self.handlers.get(&intent).unwrap_or(&self.default)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Result of processing one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOutcome {
    pub response: String,
    pub confidence: f64,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_type: Option<CaseType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_assessment: Option<CaseAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_score: Option<LeadScore>,
    pub next_questions: Vec<String>,
    pub suggested_actions: Vec<String>,
    #[serde(rename = "sessionData")]
    pub session: Session,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatOutcome {
    fn failure(session: Session, error: Option<String>) -> Self {
        Self {
            response: ERROR_RESPONSE.to_string(),
            confidence: ERROR_CONFIDENCE,
            intent: Intent::Error,
            case_type: None,
            case_assessment: None,
            lead_score: None,
            next_questions: Vec::new(),
            suggested_actions: Vec::new(),
            session,
            error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.intent == Intent::Error
    }
}

/// Classifies messages, threads session state through handlers, and
/// assembles replies.
pub struct MessageProcessor {
    classifier: IntentClassifier,
    handlers: HandlerTable,
    extractor: Arc<dyn Extractor>,
    completer: Arc<dyn Completer>,
    attorneys: AttorneyMatcher,
    clock: Arc<dyn Clock>,
    environment: Environment,
}

impl MessageProcessor {
    /// Legal rules, built-in handlers, pass-through extraction, no model.
    pub fn new() -> Result<Self> {
        Ok(Self {
            classifier: IntentClassifier::legal()?,
            handlers: HandlerTable::with_builtins(),
            extractor: Arc::new(PassthroughExtractor),
            completer: Arc::new(DisabledCompleter),
            attorneys: AttorneyMatcher::default(),
            clock: Arc::new(SystemClock),
            environment: Environment::default(),
        })
    }

    /// Build from configuration: model provider, extraction mode, environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        let completer: Arc<dyn Completer> = Arc::from(create_completer(&config.llm)?);
        let extractor: Arc<dyn Extractor> = Arc::from(create_extractor(&config.extraction.mode)?);
        Ok(Self::new()?
            .with_completer(completer)
            .with_extractor(extractor)
            .with_environment(config.server.environment))
    }

    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_completer(mut self, completer: Arc<dyn Completer>) -> Self {
        self.completer = completer;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_attorneys(mut self, attorneys: AttorneyMatcher) -> Self {
        self.attorneys = attorneys;
        self
    }

    pub fn register_handler(&mut self, intent: Intent, handler: Arc<dyn IntentHandler>) {
        self.handlers.register(intent, handler);
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Process one message. Never fails: errors become an `ERROR` outcome
    /// carrying the untouched input session.
    pub async fn process_message(
        &self,
        message: &str,
        session: &Session,
        client: &ClientConfig,
    ) -> ChatOutcome {
        let result = AssertUnwindSafe(self.try_process(message, session, client))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!("handler panicked: {}", panic_message(panic.as_ref())))
            });

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "message processing failed");
                let detail = self
                    .environment
                    .exposes_errors()
                    .then(|| format!("{:#}", e));
                ChatOutcome::failure(session.clone(), detail)
            }
        }
    }

    async fn try_process(
        &self,
        message: &str,
        session: &Session,
        client: &ClientConfig,
    ) -> Result<ChatOutcome> {
        let intent = self.classifier.detect(message);
        tracing::debug!(
            session_id = %session.id,
            intent = %intent.intent,
            confidence = intent.confidence,
            method = ?intent.method,
            "detected intent"
        );

        let now = self.clock.now();
        let mut updated = session.clone();
        updated.last_intent = Some(intent.intent);
        updated.case_details =
            self.extractor
                .extract_case_details(message, &intent, &session.case_details)?;
        updated.user_info = self
            .extractor
            .extract_user_info(message, &intent, &session.user_info)?;
        updated.conversation_history.push(Turn {
            role: Role::User,
            message: message.to_string(),
            intent: intent.intent,
            confidence: Some(intent.confidence),
            timestamp: now,
        });
        updated.conversation_stage = self.extractor.determine_stage(&intent, &updated)?;

        let reply = {
            let ctx = HandlerContext {
                message,
                intent: &intent,
                session: &updated,
                client,
                now,
                completer: self.completer.as_ref(),
                attorneys: &self.attorneys,
            };
            self.handlers.find(intent.intent).handle(&ctx).await?
        };

        let confidence = reply.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        updated.conversation_history.push(Turn {
            role: Role::Assistant,
            message: reply.response.clone(),
            intent: intent.intent,
            confidence: Some(confidence),
            timestamp: self.clock.now(),
        });
        if let Some(lead) = &reply.lead_score {
            updated.lead_score = Some(lead.score);
        }
        if let Some(case_type) = reply.case_type {
            updated
                .case_details
                .entry("caseType")
                .or_insert_with(|| case_type.as_str().into());
        }

        Ok(ChatOutcome {
            response: reply.response,
            confidence,
            intent: intent.intent,
            case_type: reply.case_type,
            case_assessment: reply.case_assessment,
            lead_score: reply.lead_score,
            next_questions: reply.next_questions,
            suggested_actions: reply.suggested_actions,
            session: updated,
            error: None,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in handlers
// ═══════════════════════════════════════════════════════════════════════

/// The stock handler for one intent.
pub struct BuiltinHandler(pub Intent);

#[async_trait]
impl IntentHandler for BuiltinHandler {
    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerReply> {
        Ok(match self.0 {
            Intent::Greeting => greeting(ctx),
            Intent::CaseInquiry => case_inquiry(ctx).await,
            Intent::InjuryDetails => injury_details(ctx),
            Intent::IncidentInfo => incident_info(ctx),
            Intent::DamagesInquiry => damages_inquiry(ctx),
            Intent::TimelineQuestion => timeline_question(ctx),
            Intent::FeeInquiry => fee_inquiry(ctx),
            Intent::ConsultationRequest => consultation_request(ctx),
            Intent::DocumentQuestion => document_question(ctx),
            Intent::StatuteInquiry => statute_inquiry(ctx),
            Intent::GeneralLegal | Intent::Error => general_legal(ctx).await,
        })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn greeting(ctx: &HandlerContext<'_>) -> HandlerReply {
    HandlerReply {
        confidence: Some(0.95),
        next_questions: strings(&[
            "Were you injured in an accident?",
            "Would you like to schedule a free consultation?",
            "Do you have questions about our fees?",
        ]),
        ..HandlerReply::text(ctx.client.greeting.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseAnalysisWire {
    case_type: String,
}

/// Case type from the model, falling back to keyword detection.
async fn analyze_case_type(ctx: &HandlerContext<'_>) -> Answer<CaseType> {
    let supported: Vec<&str> = CaseType::ALL.iter().map(|c| c.as_str()).collect();
    let prompt = format!(
        "Classify this legal intake message into one case type. Respond only with JSON of the form {{\"caseType\": \"...\"}} using one of: {}.\n\nMessage: \"{}\"",
        supported.join(", "),
        ctx.message
    );
    let options = CompletionOptions {
        max_tokens: Some(60),
        temperature: Some(0.0),
        ..CompletionOptions::with_system("You are a legal intake classifier.")
    };

    let result = match ctx.completer.complete(&prompt, &options).await {
        Ok(text) => parse_structured::<CaseAnalysisWire>(&text).and_then(|wire| {
            CaseType::parse(&wire.case_type)
                .ok_or_else(|| LlmError::Malformed(format!("unknown case type: {}", wire.case_type)))
        }),
        Err(e) => Err(e),
    };

    with_fallback(result, || ctx.case_type_or_default())
}

async fn case_inquiry(ctx: &HandlerContext<'_>) -> HandlerReply {
    // A stored case type wins over a fresh guess.
    let case_type = match ctx
        .session
        .case_details
        .get("caseType")
        .and_then(|v| v.as_str())
        .and_then(CaseType::parse)
    {
        Some(stored) => stored,
        None => analyze_case_type(ctx).await.value,
    };
    let assessment = ctx.assess();
    let lead = score_lead(&assessment, &ctx.session.user_info);

    let response = format!(
        "I'm sorry to hear about what happened. It sounds like this may be a {} matter. {}\n\n{}\n\nTo evaluate your case, I'd like to learn a few more details.",
        case_type.display_name().to_lowercase(),
        knowledge::process_info(Some(case_type)),
        assessment.summary
    );

    HandlerReply {
        response,
        confidence: Some(0.9),
        case_type: Some(case_type),
        case_assessment: Some(assessment),
        lead_score: Some(lead),
        next_questions: strings(&[
            "When did the incident happen?",
            "What injuries did you sustain?",
            "Did you receive medical treatment?",
            "Were there any witnesses?",
        ]),
        suggested_actions: Vec::new(),
    }
}

fn injury_details(ctx: &HandlerContext<'_>) -> HandlerReply {
    let assessment = ctx.assess();
    let response = format!(
        "Thank you for sharing details about your injuries. Documenting your medical treatment is one of the most important steps in an injury claim, so please keep copies of all medical records, bills, and notes from your doctors.\n\n{}",
        assessment.summary
    );
    HandlerReply {
        confidence: Some(0.85),
        case_assessment: Some(assessment),
        next_questions: strings(&[
            "Have you received medical treatment for your injuries?",
            "Are you still undergoing treatment?",
            "Have you missed work because of your injuries?",
        ]),
        ..HandlerReply::text(response)
    }
}

fn statute_sentence(status: StatuteStatus) -> &'static str {
    match status {
        StatuteStatus::Valid => {
            "Based on the date you provided, you appear to be within the statute of limitations."
        }
        StatuteStatus::NearingExpiration => {
            "Your case may be nearing the statute of limitations deadline. We recommend speaking with an attorney as soon as possible."
        }
        StatuteStatus::Expired => {
            "Based on the date you provided, the statute of limitations may have expired. Exceptions sometimes apply, so an attorney should still review your situation."
        }
        StatuteStatus::Unknown => {
            "Knowing exactly when the incident happened helps us check the filing deadline. Could you share the date of the incident?"
        }
    }
}

fn incident_info(ctx: &HandlerContext<'_>) -> HandlerReply {
    let assessment = ctx.assess();
    let response = format!(
        "Thank you for the details about the incident. {}",
        statute_sentence(assessment.statute_status)
    );
    HandlerReply {
        case_assessment: Some(assessment),
        next_questions: strings(&[
            "Where did the incident take place?",
            "Was a police or incident report filed?",
        ]),
        ..HandlerReply::text(response)
    }
}

fn damages_inquiry(ctx: &HandlerContext<'_>) -> HandlerReply {
    let assessment = ctx.assess();
    let damages = calculate_damages(&ctx.session.case_details);

    let mut response = String::from(
        "Compensation in injury cases can cover medical expenses, lost wages, and pain and suffering.",
    );
    if assessment.estimated_value != "Unknown" {
        response.push_str(&format!(
            " Based on what you've shared, your case is {}.",
            assessment.estimated_value.replacen("Estimated", "estimated at", 1)
        ));
    }
    if damages.total > 0.0 {
        response.push_str(&format!(" Breakdown: {}.", damages.breakdown));
    }
    response.push_str(" Every case is different, and the final value depends on the evidence.");

    HandlerReply {
        case_assessment: Some(assessment),
        next_questions: strings(&[
            "What are your medical bills so far?",
            "Have you lost income because of your injuries?",
        ]),
        suggested_actions: strings(&["Gather medical bills", "Document lost wages"]),
        ..HandlerReply::text(response)
    }
}

fn timeline_question(ctx: &HandlerContext<'_>) -> HandlerReply {
    let case_type = ctx.case_type();
    HandlerReply {
        case_type,
        ..HandlerReply::text(format!(
            "{} We'll keep you informed at every step.",
            knowledge::timeline(case_type)
        ))
    }
}

fn fee_inquiry(ctx: &HandlerContext<'_>) -> HandlerReply {
    let response = format!(
        "{} Our fee structure: {}",
        knowledge::fee_info(ctx.case_type()),
        ctx.client.fee_structure
    );
    HandlerReply {
        confidence: Some(0.9),
        suggested_actions: strings(&["Schedule a free consultation"]),
        ..HandlerReply::text(response)
    }
}

fn document_question(ctx: &HandlerContext<'_>) -> HandlerReply {
    let case_type = ctx.case_type();
    let list = knowledge::required_documents(case_type)
        .iter()
        .map(|d| format!("• {}", d))
        .collect::<Vec<_>>()
        .join("\n");
    HandlerReply {
        case_type,
        ..HandlerReply::text(format!(
            "Here are the documents that will help us review your case:\n{}",
            list
        ))
    }
}

fn consultation_request(ctx: &HandlerContext<'_>) -> HandlerReply {
    let case_type = ctx.case_type_or_default();
    let attorney = ctx.attorneys.match_attorney(case_type, &ctx.client.location);
    let assessment = ctx.assess();
    let lead = score_lead(&assessment, &ctx.session.user_info);

    let mut response = format!(
        "I'd be happy to set up a free consultation with {}.",
        attorney.name
    );
    let contact = ctx.client.contact_line();
    if !contact.is_empty() {
        response.push_str(&format!(" You can also {} to schedule directly.", contact));
    }
    response.push_str(" To get started, please share your name and the best phone number or email to reach you.");

    HandlerReply {
        response,
        confidence: Some(0.9),
        case_type: Some(case_type),
        case_assessment: Some(assessment),
        lead_score: Some(lead),
        next_questions: Vec::new(),
        suggested_actions: strings(&["Book consultation", "Call office"]),
    }
}

fn statute_inquiry(ctx: &HandlerContext<'_>) -> HandlerReply {
    let case_type = ctx.case_type();
    let assessment = ctx.assess();
    let name = case_type
        .map(|c| c.display_name().to_lowercase())
        .unwrap_or_else(|| "personal injury".to_string());
    let response = format!(
        "The statute of limitations for {} cases is generally {}. {}",
        name,
        knowledge::statute_text(case_type),
        statute_sentence(assessment.statute_status)
    );
    HandlerReply {
        case_type,
        case_assessment: Some(assessment),
        ..HandlerReply::text(response)
    }
}

async fn general_legal(ctx: &HandlerContext<'_>) -> HandlerReply {
    let system = format!(
        "You are {}, an intake assistant for a personal injury law firm. Answer briefly and helpfully. Do not give legal advice; suggest a free consultation for case-specific questions.",
        ctx.client.chatbot_name
    );
    let result = ctx
        .completer
        .complete(ctx.message, &CompletionOptions::with_system(system))
        .await;

    let answer = with_fallback(result, || {
        let areas = ctx
            .client
            .case_types()
            .iter()
            .map(|c| c.display_name().to_lowercase())
            .collect::<Vec<_>>()
            .join(", ");
        let mut text = format!(
            "Thank you for your question. I can help with {} cases, including fees, timelines, and the documents you'll need.",
            if areas.is_empty() { "personal injury".to_string() } else { areas }
        );
        let contact = ctx.client.contact_line();
        if !contact.is_empty() {
            text.push_str(&format!(" For specific legal advice, please {}.", contact));
        }
        text
    });

    let confidence = match answer.source {
        AnswerSource::Model => 0.7,
        AnswerSource::Fallback => 0.5,
    };
    HandlerReply {
        confidence: Some(confidence),
        ..HandlerReply::text(answer.value)
    }
}
