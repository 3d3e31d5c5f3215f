//! Rule-based intent classification.
//!
//! An [`IntentClassifier`] holds an ordered table of [`IntentRule`]s. Each
//! message is matched in two phases:
//!
//! 1. **Pattern phase**: rules in declaration order, each rule's regexes in
//!    declaration order. The first regex that matches wins with confidence
//!    `base + 0.1`.
//! 2. **Keyword phase**: only reached when no regex matched. The *first*
//!    rule (in declaration order) with at least one keyword contained in the
//!    message wins with confidence `base × matched / total`. This is not a
//!    best-match search: an earlier rule with one hit beats a later rule with
//!    five.
//!
//! When neither phase matches, the classifier returns its fallback intent
//! with confidence `0.3`.
//!
//! Classification is pure and total: every message gets a result.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

use crate::models::{Intent, IntentResult, MatchMethod};

/// Confidence assigned when no rule matches.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Bonus added to a rule's base weight on a regex match.
const PATTERN_BONUS: f64 = 0.1;

/// A compiled regex together with its source text.
#[derive(Debug, Clone)]
struct Pattern {
    source: String,
    regex: Regex,
}

/// One row of the classification table.
#[derive(Debug, Clone)]
pub struct IntentRule {
    pub intent: Intent,
    patterns: Vec<Pattern>,
    pub keywords: Vec<String>,
    /// Base weight, not a probability.
    pub confidence: f64,
}

impl IntentRule {
    /// Compile a rule. Patterns are matched case-insensitively.
    pub fn new(intent: Intent, patterns: &[&str], keywords: &[&str], confidence: f64) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|source| {
                let regex = RegexBuilder::new(source)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("invalid pattern for {}: {}", intent, source))?;
                Ok(Pattern {
                    source: source.to_string(),
                    regex,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            intent,
            patterns,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            confidence,
        })
    }
}

/// Ordered rule table plus fallback label.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
    fallback: Intent,
}

impl IntentClassifier {
    pub fn new(rules: Vec<IntentRule>, fallback: Intent) -> Self {
        Self { rules, fallback }
    }

    /// The law-firm rule table with `GENERAL_LEGAL` as fallback.
    pub fn legal() -> Result<Self> {
        Ok(Self::new(legal_rules()?, Intent::GeneralLegal))
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    /// Classify a message.
    pub fn detect(&self, message: &str) -> IntentResult {
        let normalized = message.trim().to_lowercase();

        for rule in &self.rules {
            for pattern in &rule.patterns {
                if pattern.regex.is_match(&normalized) {
                    return IntentResult {
                        intent: rule.intent,
                        confidence: rule.confidence + PATTERN_BONUS,
                        method: MatchMethod::Pattern,
                        pattern: Some(pattern.source.clone()),
                        matched_keywords: Vec::new(),
                    };
                }
            }
        }

        for rule in &self.rules {
            if rule.keywords.is_empty() {
                continue;
            }
            let matched: Vec<String> = rule
                .keywords
                .iter()
                .filter(|k| normalized.contains(k.as_str()))
                .cloned()
                .collect();
            if !matched.is_empty() {
                let confidence =
                    rule.confidence * (matched.len() as f64 / rule.keywords.len() as f64);
                return IntentResult {
                    intent: rule.intent,
                    confidence,
                    method: MatchMethod::Keyword,
                    pattern: None,
                    matched_keywords: matched,
                };
            }
        }

        IntentResult {
            intent: self.fallback,
            confidence: FALLBACK_CONFIDENCE,
            method: MatchMethod::Fallback,
            pattern: None,
            matched_keywords: Vec::new(),
        }
    }
}

/// Build the personal-injury intake rules, in priority order.
pub fn legal_rules() -> Result<Vec<IntentRule>> {
    Ok(vec![
        IntentRule::new(
            Intent::Greeting,
            &[
                r"^(hi|hello|hey|good morning|good afternoon)",
                r"^(help|assist|support)",
            ],
            &["hello", "hi", "hey", "help", "assist"],
            0.9,
        )?,
        IntentRule::new(
            Intent::CaseInquiry,
            &[
                r"(injured|hurt|accident|incident)",
                r"(case|claim|lawsuit|legal action)",
                r"(happened to me|what happened)",
            ],
            &["injured", "accident", "case", "lawsuit", "incident", "hurt", "happened"],
            0.9,
        )?,
        IntentRule::new(
            Intent::InjuryDetails,
            &[
                r"(broke|broken|fractured)",
                r"(back pain|neck pain|head injury)",
                r"(surgery|hospital|medical)",
            ],
            &["broke", "broken", "pain", "surgery", "hospital", "medical", "injury", "hurt"],
            0.8,
        )?,
        IntentRule::new(
            Intent::IncidentInfo,
            &[
                r"(when|date|time|ago)",
                r"(happened|occurred|took place)",
                r"(last week|last month|yesterday)",
            ],
            &["when", "date", "happened", "occurred", "ago", "time"],
            0.8,
        )?,
        IntentRule::new(
            Intent::DamagesInquiry,
            &[
                r"(compensation|money|payment|settlement)",
                r"(worth|value|damages|recover)",
                r"(medical bills|lost wages)",
            ],
            &["compensation", "money", "settlement", "damages", "bills", "wages"],
            0.8,
        )?,
        IntentRule::new(
            Intent::TimelineQuestion,
            &[r"(how long|timeline|process|take)", r"(when will|how soon)"],
            &["how long", "timeline", "process", "when will", "how soon"],
            0.7,
        )?,
        IntentRule::new(
            Intent::FeeInquiry,
            &[
                r"(cost|fee|price|charge|expensive)",
                r"(contingency|percentage|upfront)",
                r"(pay|payment|afford)",
            ],
            &["cost", "fee", "price", "contingency", "pay", "afford"],
            0.8,
        )?,
        IntentRule::new(
            Intent::ConsultationRequest,
            &[
                r"(consultation|appointment|meeting|speak)",
                r"(schedule|book|arrange)",
                r"(attorney|lawyer)",
            ],
            &["consultation", "appointment", "schedule", "attorney", "lawyer", "meeting"],
            0.9,
        )?,
        IntentRule::new(
            Intent::DocumentQuestion,
            &[
                r"(documents|paperwork|records|reports)",
                r"(police report|medical records)",
                r"(need|required|bring)",
            ],
            &["documents", "paperwork", "records", "police report", "medical"],
            0.7,
        )?,
        IntentRule::new(
            Intent::StatuteInquiry,
            &[
                r"(statute|limitation|deadline|time limit)",
                r"(too late|expired|still time)",
            ],
            &["statute", "limitation", "deadline", "time limit", "too late"],
            0.8,
        )?,
    ])
}
