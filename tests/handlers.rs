//! Extension points: custom handlers, extractors, classifiers, and completers
//! plugged into a `MessageProcessor` through the public API.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use lex_intake::clients::ClientConfig;
use lex_intake::dispatch::{
    HandlerContext, HandlerReply, IntentHandler, MessageProcessor, DEFAULT_CONFIDENCE,
    ERROR_CONFIDENCE,
};
use lex_intake::extract::Extractor;
use lex_intake::intent::{IntentClassifier, IntentRule};
use lex_intake::knowledge::{Attorney, AttorneyMatcher, CaseType};
use lex_intake::llm::{Completer, CompletionOptions, LlmError};
use lex_intake::models::{ConversationStage, Details, Intent, IntentResult, Session};
use lex_intake::session::ManualClock;

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-03-10T15:30:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn processor() -> MessageProcessor {
    MessageProcessor::new()
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(now())))
}

/// Echoes the bot name and the detected case type.
struct SignatureHandler;

#[async_trait]
impl IntentHandler for SignatureHandler {
    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerReply> {
        let case_type = ctx.case_type();
        Ok(HandlerReply {
            response: format!(
                "{} here. Case type: {}",
                ctx.client.chatbot_name,
                case_type.map(|c| c.as_str()).unwrap_or("none")
            ),
            case_type,
            ..Default::default()
        })
    }
}

/// Names the matched attorney and the model that would draft the reply.
struct RosterHandler;

#[async_trait]
impl IntentHandler for RosterHandler {
    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerReply> {
        let case_type = ctx.case_type_or_default();
        let attorney = ctx.attorneys().match_attorney(case_type, &ctx.client.location);
        Ok(HandlerReply {
            response: format!("{} via {}", attorney.name, ctx.completer().model_name()),
            case_type: Some(case_type),
            ..Default::default()
        })
    }
}

fn roster() -> AttorneyMatcher {
    AttorneyMatcher::new(vec![Attorney {
        name: "Ana Ruiz".into(),
        case_types: vec![CaseType::SlipAndFall],
        location: "NY".into(),
    }])
}

/// Tags every turn and jumps straight to `qualified`.
struct TaggingExtractor;

impl Extractor for TaggingExtractor {
    fn extract_case_details(
        &self,
        message: &str,
        _intent: &IntentResult,
        previous: &Details,
    ) -> Result<Details> {
        let mut details = previous.clone();
        details.insert("lastMessageLength".into(), json!(message.len()));
        Ok(details)
    }

    fn extract_user_info(
        &self,
        _message: &str,
        _intent: &IntentResult,
        previous: &Details,
    ) -> Result<Details> {
        let mut info = previous.clone();
        info.insert("channel".into(), json!("web"));
        Ok(info)
    }

    fn determine_stage(&self, _intent: &IntentResult, _session: &Session) -> Result<ConversationStage> {
        Ok(ConversationStage::Qualified)
    }
}

struct BrokenExtractor;

impl Extractor for BrokenExtractor {
    fn extract_case_details(&self, _: &str, _: &IntentResult, _: &Details) -> Result<Details> {
        anyhow::bail!("extractor unavailable")
    }

    fn extract_user_info(&self, _: &str, _: &IntentResult, previous: &Details) -> Result<Details> {
        Ok(previous.clone())
    }

    fn determine_stage(&self, _: &IntentResult, _: &Session) -> Result<ConversationStage> {
        Ok(ConversationStage::Initial)
    }
}

struct CannedCompleter(&'static str);

#[async_trait]
impl Completer for CannedCompleter {
    fn model_name(&self) -> &str {
        "canned"
    }

    async fn complete(&self, _prompt: &str, options: &CompletionOptions) -> Result<String, LlmError> {
        assert!(options.system.is_some());
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn test_custom_handler_replaces_builtin() {
    let mut processor = processor();
    processor.register_handler(Intent::TimelineQuestion, Arc::new(SignatureHandler));

    let outcome = processor
        .process_message(
            "How long does a slip and fall usually take?",
            &Session::new("h1", now()),
            &ClientConfig::default(),
        )
        .await;

    assert_eq!(outcome.intent, Intent::TimelineQuestion);
    assert_eq!(
        outcome.response,
        "Law Firm AI Assistant here. Case type: slip_and_fall"
    );
    assert_eq!(outcome.confidence, DEFAULT_CONFIDENCE);
    assert_eq!(outcome.case_type, Some(CaseType::SlipAndFall));
    assert_eq!(
        outcome.session.case_details["caseType"],
        json!("slip_and_fall")
    );
}

#[tokio::test]
async fn test_custom_extractor_drives_session_state() {
    let processor = processor().with_extractor(Arc::new(TaggingExtractor));

    let outcome = processor
        .process_message("hello", &Session::new("h2", now()), &ClientConfig::default())
        .await;

    assert_eq!(outcome.session.conversation_stage, ConversationStage::Qualified);
    assert_eq!(outcome.session.case_details["lastMessageLength"], json!(5));
    assert_eq!(outcome.session.user_info["channel"], json!("web"));
}

#[tokio::test]
async fn test_extractor_failure_discards_turn() {
    let processor = processor().with_extractor(Arc::new(BrokenExtractor));

    let mut session = Session::new("h3", now());
    session.user_info.insert("name".into(), json!("Robin"));

    let outcome = processor
        .process_message("I was injured at work", &session, &ClientConfig::default())
        .await;

    assert_eq!(outcome.intent, Intent::Error);
    assert_eq!(outcome.confidence, ERROR_CONFIDENCE);
    assert_eq!(outcome.session, session);
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn test_custom_classifier() {
    let rules = vec![IntentRule::new(
        Intent::ConsultationRequest,
        &[r"^book\b"],
        &["appointment"],
        0.5,
    )
    .unwrap()];
    let processor = processor().with_classifier(IntentClassifier::new(rules, Intent::Greeting));

    let booked = processor
        .process_message("Book me in", &Session::new("h4", now()), &ClientConfig::default())
        .await;
    assert_eq!(booked.intent, Intent::ConsultationRequest);
    assert!(booked.response.contains("Jane Smith"));

    let fallback = processor
        .process_message("what are your fees", &Session::new("h5", now()), &ClientConfig::default())
        .await;
    assert_eq!(fallback.intent, Intent::Greeting);
    assert_eq!(fallback.session.conversation_history[0].confidence, Some(0.3));
}

#[tokio::test]
async fn test_custom_completer_answers_general_questions() {
    let processor =
        processor().with_completer(Arc::new(CannedCompleter("Our office is open 9 to 5.")));

    let outcome = processor
        .process_message(
            "Are you open on weekends?",
            &Session::new("h6", now()),
            &ClientConfig::default(),
        )
        .await;

    assert_eq!(outcome.intent, Intent::GeneralLegal);
    assert_eq!(outcome.response, "Our office is open 9 to 5.");
}

#[tokio::test]
async fn test_custom_roster_reaches_consultation_handlers() {
    let mut processor = processor().with_attorneys(roster());

    let booked = processor
        .process_message(
            "Can I schedule a consultation about my slip and fall?",
            &Session::new("h8", now()),
            &ClientConfig::default(),
        )
        .await;
    assert_eq!(booked.intent, Intent::ConsultationRequest);
    assert!(booked.response.contains("Ana Ruiz"));

    processor.register_handler(Intent::ConsultationRequest, Arc::new(RosterHandler));
    let custom = processor
        .process_message(
            "Can I schedule a consultation about my slip and fall?",
            &Session::new("h9", now()),
            &ClientConfig::default(),
        )
        .await;
    assert_eq!(custom.response, "Ana Ruiz via disabled");
}
