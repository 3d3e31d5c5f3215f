//! # Lex Intake
//!
//! A conversational intake assistant for personal-injury law firms.
//!
//! Each incoming message is classified into a legal intent by an ordered
//! rule table, threaded through a per-visitor session with a 30-minute idle
//! expiry, and answered by an intent handler that can assess the case,
//! estimate its value, check the statute of limitations, and score the
//! visitor as a lead. A language model can enrich some replies; every
//! model-backed step has a deterministic fallback, so the bot runs fully
//! offline.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   HTTP   │──▶│  Session   │──▶│  Classifier  │──▶│   Handlers   │
//! │  (axum)  │   │   Store    │   │ (regex+kw)   │   │ assess/lead  │
//! └──────────┘   └────────────┘   └──────────────┘   └──────┬───────┘
//!                                                           │
//!                                                    ┌──────▼──────┐
//!                                                    │ LLM (opt.)  │
//!                                                    └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lexi classify "I was hurt in a car accident"
//! lexi chat "How much does a consultation cost?" --client smith-injury-law
//! lexi serve --config ./config/lexi.toml
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Core data types |
//! | [`intent`] | Rule-based intent classification |
//! | [`session`] | Session store with idle expiry |
//! | [`assess`] | Case strength, value, statute, and damages |
//! | [`lead`] | Lead scoring |
//! | [`knowledge`] | Case types, legal reference text, attorney matching |
//! | [`extract`] | Detail extraction and conversation staging |
//! | [`llm`] | Language-model completion with fallback |
//! | [`dispatch`] | Message processing and intent handlers |
//! | [`clients`] | Per-firm chatbot settings |
//! | [`config`] | TOML configuration parsing |
//! | [`server`] | HTTP server |

pub mod assess;
pub mod clients;
pub mod config;
pub mod dispatch;
pub mod extract;
pub mod intent;
pub mod knowledge;
pub mod lead;
pub mod llm;
pub mod models;
pub mod server;
pub mod session;
