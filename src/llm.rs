//! Language-model completion with explicit fallback.
//!
//! Defines the [`Completer`] trait and concrete implementations:
//! - **[`DisabledCompleter`]**: always fails with [`LlmError::Disabled`].
//!   Used when `llm.provider = "disabled"`.
//! - **[`OpenAiCompleter`]**: calls the OpenAI chat completions API with
//!   timeout, retry, and backoff.
//!
//! Every model-backed feature pairs the model call with a deterministic
//! heuristic. [`with_fallback`] makes that choice visible in the return type:
//! an [`Answer`] records whether its value came from the model or from the
//! fallback.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model is disabled")]
    Disabled,
    #[error("{0} environment variable not set")]
    MissingApiKey(String),
    #[error("model API error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("malformed model output: {0}")]
    Malformed(String),
    #[error("model returned no content")]
    Empty,
}

impl LlmError {
    /// Whether this error is the expected result of running without a model.
    pub fn is_disabled(&self) -> bool {
        matches!(self, LlmError::Disabled)
    }
}

/// Per-call generation settings.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub system: Option<String>,
    /// Overrides `llm.max_tokens` when set.
    pub max_tokens: Option<u32>,
    /// Overrides `llm.temperature` when set.
    pub temperature: Option<f32>,
}

impl CompletionOptions {
    pub fn with_system(system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..Default::default()
        }
    }
}

/// A text-completion capability.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Identifier for logs (e.g. `"gpt-3.5-turbo"`).
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str, options: &CompletionOptions)
        -> Result<String, LlmError>;
}

// ============ Fallback ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Model,
    Fallback,
}

/// A value plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer<T> {
    pub value: T,
    pub source: AnswerSource,
}

/// Take the model's result, or run `fallback` if the model failed.
///
/// Failures other than [`LlmError::Disabled`] are logged at `warn`.
pub fn with_fallback<T>(result: Result<T, LlmError>, fallback: impl FnOnce() -> T) -> Answer<T> {
    match result {
        Ok(value) => Answer {
            value,
            source: AnswerSource::Model,
        },
        Err(e) => {
            if e.is_disabled() {
                tracing::debug!("language model disabled, using fallback");
            } else {
                tracing::warn!(error = %e, "language model call failed, using fallback");
            }
            Answer {
                value: fallback(),
                source: AnswerSource::Fallback,
            }
        }
    }
}

/// Decode a JSON object from model output, tolerating Markdown code fences
/// and leading prose.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let candidate = match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced,
    };

    serde_json::from_str(candidate).map_err(|e| LlmError::Malformed(e.to_string()))
}

// ============ Disabled ============

pub struct DisabledCompleter;

#[async_trait]
impl Completer for DisabledCompleter {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

// ============ OpenAI ============

/// Completer backed by `POST {base_url}/chat/completions`.
pub struct OpenAiCompleter {
    client: reqwest::Client,
    api_key: String,
    config: LlmConfig,
}

impl OpenAiCompleter {
    /// # Errors
    ///
    /// Returns an error if the API key variable is unset or the HTTP client
    /// cannot be built.
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::MissingApiKey(config.api_key_env.clone()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            config: config.clone(),
        })
    }

    fn request_body(&self, prompt: &str, options: &CompletionOptions) -> serde_json::Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));

        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": options.max_tokens.unwrap_or(self.config.max_tokens),
            "temperature": options.temperature.unwrap_or(self.config.temperature),
        })
    }
}

#[async_trait]
impl Completer for OpenAiCompleter {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = self.request_body(prompt, options);

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| LlmError::Malformed(e.to_string()))?;
                        return parse_chat_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = LlmError::Http {
                        status: status.as_u16(),
                        body: body_text,
                    };

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(LlmError::Transport(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| LlmError::Transport("completion failed after retries".into())))
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, LlmError> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| LlmError::Malformed("missing choices[0].message.content".into()))?;

    let content = content.trim();
    if content.is_empty() {
        return Err(LlmError::Empty);
    }
    Ok(content.to_string())
}

/// Create the appropriate [`Completer`] based on configuration.
///
/// | Config Value | Completer |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledCompleter`] |
/// | `"openai"` | [`OpenAiCompleter`] |
pub fn create_completer(config: &LlmConfig) -> anyhow::Result<Box<dyn Completer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledCompleter)),
        "openai" => Ok(Box::new(OpenAiCompleter::new(config)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}
