//! # Lex Intake CLI (`lexi`)
//!
//! Runs the intake chatbot server and offers offline tools for trying the
//! classifier and scorers from a shell.
//!
//! ## Usage
//!
//! ```bash
//! lexi --config ./config/lexi.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexi serve` | Start the HTTP server |
//! | `lexi chat "<message>"` | Process one message against a fresh session |
//! | `lexi classify "<message>"` | Print the detected intent |
//! | `lexi assess <file>` | Assess case details read from a JSON file |
//! | `lexi clients` | List configured clients |
//!
//! JSON output goes to stdout; logs go to stderr and follow `RUST_LOG`.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use lex_intake::assess::{assess_case, calculate_damages};
use lex_intake::clients::ClientDirectory;
use lex_intake::config::{self, Config};
use lex_intake::dispatch::MessageProcessor;
use lex_intake::intent::IntentClassifier;
use lex_intake::lead::score_lead;
use lex_intake::models::{CaseAssessment, DamageEstimate, Details, LeadScore, Session};
use lex_intake::server;

/// Lex Intake: a conversational intake assistant for personal-injury firms.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "lexi",
    about = "Lex Intake: conversational client intake for personal-injury law firms",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lexi.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Process one message against a fresh session and print the outcome.
    Chat {
        message: String,

        /// Client id; unknown ids fall back to `default`.
        #[arg(long)]
        client: Option<String>,
    },

    /// Print the intent detected for a message.
    Classify { message: String },

    /// Assess case details from a JSON file.
    ///
    /// The file holds `{"caseDetails": {...}, "userInfo": {...}}`; both keys
    /// are optional.
    Assess { file: PathBuf },

    /// List configured clients.
    Clients,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AssessInput {
    #[serde(default)]
    case_details: Details,
    #[serde(default)]
    user_info: Details,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssessOutput {
    case_assessment: CaseAssessment,
    lead_score: LeadScore,
    damages: DamageEstimate,
}

/// Load `path`, or fall back to defaults when it does not exist.
fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Chat { message, client } => {
            let processor = MessageProcessor::from_config(&cfg)?;
            let clients = ClientDirectory::new(cfg.clients.clone());
            let client = clients.resolve(client.as_deref());
            let session = Session::new(
                uuid::Uuid::new_v4().to_string(),
                processor.clock().now(),
            );
            let outcome = processor.process_message(&message, &session, client).await;
            print_json(&outcome)?;
        }
        Commands::Classify { message } => {
            let classifier = IntentClassifier::legal()?;
            print_json(&classifier.detect(&message))?;
        }
        Commands::Assess { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let input: AssessInput = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", file.display()))?;

            let case_assessment = assess_case(&input.case_details, Utc::now());
            let lead_score = score_lead(&case_assessment, &input.user_info);
            let damages = calculate_damages(&input.case_details);
            print_json(&AssessOutput {
                case_assessment,
                lead_score,
                damages,
            })?;
        }
        Commands::Clients => {
            let clients = ClientDirectory::new(cfg.clients.clone());
            println!("{:<20} {:<36} CASE TYPES", "ID", "CHATBOT");
            for (id, client) in clients.iter() {
                println!(
                    "{:<20} {:<36} {}",
                    id,
                    client.chatbot_name,
                    client.supported_case_types.join(", ")
                );
            }
        }
    }

    Ok(())
}
