//! HTTP transport for the intake chatbot.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Process one message within a session |
//! | `GET`  | `/clients/{client_id}/config` | Public view of a client's settings |
//! | `GET`  | `/health` | Health check (version and live session count) |
//!
//! # Error Contract
//!
//! Request errors use a structured body:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404).
//!
//! A failed or timed-out `/chat` turn is a 500 whose body still carries a
//! user-facing `response`. The `error` field is only present when
//! `server.environment = "development"`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the chat widget can be
//! embedded on any firm's site.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::clients::ClientDirectory;
use crate::config::{Config, Environment};
use crate::dispatch::{MessageProcessor, ERROR_RESPONSE};
use crate::knowledge::CaseType;
use crate::models::{CaseAssessment, Intent, LeadScore, Session};
use crate::session::{InMemorySessionStore, SessionPatch, SessionStore};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    processor: Arc<MessageProcessor>,
    sessions: Arc<dyn SessionStore>,
    clients: Arc<ClientDirectory>,
    request_timeout: Duration,
    environment: Environment,
}

impl AppState {
    pub fn new(
        processor: MessageProcessor,
        sessions: Arc<dyn SessionStore>,
        clients: ClientDirectory,
    ) -> Self {
        Self {
            processor: Arc::new(processor),
            sessions,
            clients: Arc::new(clients),
            request_timeout: Duration::from_secs(45),
            environment: Environment::default(),
        }
    }

    /// State wired from configuration: processor, in-memory store with the
    /// configured TTL, and the client directory.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let processor = MessageProcessor::from_config(config)?;
        let ttl = i64::try_from(config.session.ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| anyhow::anyhow!("session.ttl_secs out of range"))?;
        let sessions = Arc::new(InMemorySessionStore::new(ttl, processor.clock().clone()));
        let clients = ClientDirectory::new(config.clients.clone());

        Ok(Self::new(processor, sessions, clients)
            .with_request_timeout(Duration::from_secs(config.server.request_timeout_secs))
            .with_environment(config.server.environment))
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }
}

/// The application router with CORS applied.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/clients/{client_id}/config", get(handle_client_config))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until the process is terminated.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

/// Starts the HTTP server on `[server].bind`.
///
/// Used by `lexi serve`. Returns an error if the configuration cannot be
/// wired up or the address cannot be bound.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let listener = TcpListener::bind(&config.server.bind).await?;

    tracing::info!(
        bind = %config.server.bind,
        clients = state.clients.len(),
        llm = %config.llm.provider,
        extraction = %config.extraction.mode,
        "chat server listening"
    );

    serve(listener, state).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Request error that converts into the structured error body.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    /// Stored sessions, including expired ones not yet evicted.
    sessions: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.sessions.len().await,
    })
}

// ============ GET /clients/{client_id}/config ============

#[derive(Serialize)]
struct ClientConfigResponse {
    client_id: String,
    chatbot_name: String,
    supported_case_types: Vec<String>,
    has_contact: bool,
}

async fn handle_client_config(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<ClientConfigResponse>, AppError> {
    let client = state
        .clients
        .get(&client_id)
        .ok_or_else(|| not_found(format!("no client configured with id: {}", client_id)))?;

    Ok(Json(ClientConfigResponse {
        chatbot_name: client.chatbot_name.clone(),
        supported_case_types: client.supported_case_types.clone(),
        has_contact: client.contact.is_some(),
        client_id,
    }))
}

// ============ POST /chat ============

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "clientId")]
    client_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ChatMetadata {
    intent: Intent,
    confidence: f64,
    #[serde(rename = "caseType", skip_serializing_if = "Option::is_none")]
    case_type: Option<CaseType>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    session_id: String,
    #[serde(rename = "leadScore", skip_serializing_if = "Option::is_none")]
    lead_score: Option<LeadScore>,
    #[serde(rename = "caseAssessment", skip_serializing_if = "Option::is_none")]
    case_assessment: Option<CaseAssessment>,
    #[serde(rename = "nextQuestions")]
    next_questions: Vec<String>,
    metadata: ChatMetadata,
}

#[derive(Serialize)]
struct ChatFailure {
    response: String,
    session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn chat_failure(session_id: String, error: Option<String>) -> Response {
    let body = ChatFailure {
        response: ERROR_RESPONSE.to_string(),
        session_id,
        error,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Handler for `POST /chat`.
///
/// Loads (or starts) the session, runs the message through the processor
/// under the request timeout, and persists the resulting session. Failed
/// turns leave the stored session untouched.
async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;

    let message = request
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| bad_request("message must not be empty"))?;

    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let client = state.clients.resolve(request.client_id.as_deref());

    let session = match state.sessions.get(&session_id).await {
        Some(session) => session,
        None => Session::new(session_id.clone(), state.processor.clock().now()),
    };

    let processed = tokio::time::timeout(
        state.request_timeout,
        state.processor.process_message(&message, &session, client),
    )
    .await;

    let outcome = match processed {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(
                session_id = %session_id,
                timeout_secs = state.request_timeout.as_secs(),
                "chat request timed out"
            );
            let detail = state
                .environment
                .exposes_errors()
                .then(|| format!("request timed out after {:?}", state.request_timeout));
            return Ok(chat_failure(session_id, detail));
        }
    };

    if outcome.is_error() {
        return Ok(chat_failure(session_id, outcome.error));
    }

    state
        .sessions
        .update(&session_id, SessionPatch::from_session(outcome.session))
        .await;

    tracing::info!(
        session_id = %session_id,
        intent = %outcome.intent,
        confidence = outcome.confidence,
        "chat turn processed"
    );

    let body = ChatResponse {
        response: outcome.response,
        session_id,
        lead_score: outcome.lead_score,
        case_assessment: outcome.case_assessment,
        next_questions: outcome.next_questions,
        metadata: ChatMetadata {
            intent: outcome.intent,
            confidence: outcome.confidence,
            case_type: outcome.case_type,
        },
    };
    Ok(Json(body).into_response())
}
