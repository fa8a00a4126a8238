//! REST endpoints and error → status mapping.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::warn;
use uuid::Uuid;

use crate::dealflow::{DealflowAgent, ProposalCopy, StatusClassification};
use crate::error::{DatabaseError, DealflowError, Error, IntentError, KnowledgeError, LlmError, ScheduleError};
use crate::intent::{IntentClassification, IntentClassifier};
use crate::knowledge::{IngestionResult, KnowledgeAgent, KnowledgeAnswer};
use crate::router::{Router as MessageRouter, RouterReply};
use crate::schedule::ParsedSchedule;
use crate::store::{Database, LeadRecord};

/// Ledger operation names for direct agent calls.
const NEWLEAD_OPERATION: &str = "newlead";
const INGEST_OPERATION: &str = "ingest";

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<IntentClassifier>,
    pub knowledge: Arc<KnowledgeAgent>,
    pub dealflow: Arc<DealflowAgent>,
    pub orchestrator: Arc<MessageRouter>,
    pub db: Arc<dyn Database>,
}

/// Build the service router.
pub fn build_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/classify", post(classify))
        .route("/agent-a/ingest", post(ingest))
        .route("/agent-a/ask", post(ask))
        .route("/agent-a/followup-parse", post(followup_parse))
        .route("/agent-b/newlead", post(newlead))
        .route("/agent-b/proposal-copy", post(proposal_copy))
        .route("/agent-b/nextstep-parse", post(nextstep_parse))
        .route("/agent-b/status-classify", post(status_classify))
        .route("/webhook/message", post(webhook_message))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Error mapping ───────────────────────────────────────────────────

/// JSON-bodied error response with a status derived from the error kind.
pub struct ApiError(Error);

impl<E> From<E> for ApiError
where
    Error: From<E>,
{
    fn from(e: E) -> Self {
        ApiError(Error::from(e))
    }
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Intent(IntentError::EmptyMessage) => StatusCode::BAD_REQUEST,
        Error::Knowledge(KnowledgeError::EmptyQuery)
        | Error::Knowledge(KnowledgeError::EmptyDocument { .. }) => StatusCode::BAD_REQUEST,
        Error::Schedule(ScheduleError::NoTemporalSignal)
        | Error::Schedule(ScheduleError::InvalidTime(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Dealflow(DealflowError::EmptyLead) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Dealflow(DealflowError::LeadNotFound { .. })
        | Error::Database(DatabaseError::NotFound { .. }) => StatusCode::NOT_FOUND,
        Error::Llm(LlmError::CircuitOpen { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Llm(LlmError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ── Request / response bodies ───────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    message: String,
    #[serde(default)]
    has_attachments: bool,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    document_id: String,
    title: String,
    text: String,
    #[serde(default)]
    request_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    #[serde(flatten)]
    result: IngestionResult,
    request_id: String,
    replayed: bool,
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Debug, Deserialize)]
struct RawTextRequest {
    raw: String,
}

#[derive(Debug, Deserialize)]
struct NewLeadRequest {
    raw: String,
    #[serde(default)]
    request_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewLeadResponse {
    lead: LeadRecord,
    request_id: String,
    replayed: bool,
}

#[derive(Debug, Deserialize)]
struct WebhookRequest {
    user: String,
    text: String,
    #[serde(default)]
    has_attachments: bool,
    #[serde(default)]
    request_id: Option<String>,
}

// ── Handlers ────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn classify(
    State(state): State<AppState>,
    Json(body): Json<ClassifyRequest>,
) -> Result<Json<IntentClassification>, ApiError> {
    let classification = state
        .classifier
        .classify(&body.message, body.has_attachments, body.context.as_deref())
        .await?;
    Ok(Json(classification))
}

/// Idempotent: a repeated `request_id` replays the recorded result instead
/// of re-chunking and re-embedding.
async fn ingest(
    State(state): State<AppState>,
    Json(body): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let request_id = body
        .request_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Some(outcome) = state.db.recorded_effect(&request_id, INGEST_OPERATION).await? {
        let result: IngestionResult = serde_json::from_str(&outcome).map_err(LlmError::from)?;
        return Ok(Json(IngestResponse {
            result,
            request_id,
            replayed: true,
        }));
    }

    let result = state
        .knowledge
        .ingest(&body.document_id, &body.title, &body.text)
        .await?;
    let outcome = serde_json::to_string(&result).map_err(LlmError::from)?;
    state
        .db
        .record_effect(&request_id, INGEST_OPERATION, &outcome)
        .await?;

    Ok(Json(IngestResponse {
        result,
        request_id,
        replayed: false,
    }))
}

async fn ask(
    State(state): State<AppState>,
    Json(body): Json<AskRequest>,
) -> Result<Json<KnowledgeAnswer>, ApiError> {
    let answer = state.knowledge.ask(&body.question).await?;
    Ok(Json(answer))
}

async fn followup_parse(
    Json(body): Json<RawTextRequest>,
) -> Result<Json<ParsedSchedule>, ApiError> {
    let parsed = crate::schedule::parse_schedule(&body.raw, chrono::Utc::now())?;
    Ok(Json(parsed))
}

/// Idempotent: a repeated `request_id` replays the recorded lead instead of
/// inserting another row.
async fn newlead(
    State(state): State<AppState>,
    Json(body): Json<NewLeadRequest>,
) -> Result<Json<NewLeadResponse>, ApiError> {
    let request_id = body
        .request_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Some(outcome) = state.db.recorded_effect(&request_id, NEWLEAD_OPERATION).await? {
        let lead: LeadRecord = serde_json::from_str(&outcome).map_err(LlmError::from)?;
        return Ok(Json(NewLeadResponse {
            lead,
            request_id,
            replayed: true,
        }));
    }

    let lead = state.dealflow.new_lead(&body.raw, &request_id).await?;
    let outcome = serde_json::to_string(&lead).map_err(LlmError::from)?;
    state
        .db
        .record_effect(&request_id, NEWLEAD_OPERATION, &outcome)
        .await?;

    Ok(Json(NewLeadResponse {
        lead,
        request_id,
        replayed: false,
    }))
}

async fn proposal_copy(
    State(state): State<AppState>,
    Json(body): Json<RawTextRequest>,
) -> Result<Json<ProposalCopy>, ApiError> {
    Ok(Json(state.dealflow.proposal_copy(&body.raw).await?))
}

async fn nextstep_parse(
    State(state): State<AppState>,
    Json(body): Json<RawTextRequest>,
) -> Result<Json<ParsedSchedule>, ApiError> {
    Ok(Json(state.dealflow.nextstep_parse(&body.raw)?))
}

async fn status_classify(
    State(state): State<AppState>,
    Json(body): Json<RawTextRequest>,
) -> Result<Json<StatusClassification>, ApiError> {
    Ok(Json(state.dealflow.status_classify(&body.raw)))
}

async fn webhook_message(
    State(state): State<AppState>,
    Json(body): Json<WebhookRequest>,
) -> Result<Json<RouterReply>, ApiError> {
    let request_id = body
        .request_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let reply = state
        .orchestrator
        .handle_message(&body.user, &body.text, body.has_attachments, &request_id)
        .await?;
    Ok(Json(reply))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_errors_map_to_422() {
        assert_eq!(
            status_for(&Error::Schedule(ScheduleError::NoTemporalSignal)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&Error::Dealflow(DealflowError::EmptyLead)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn bad_input_maps_to_400() {
        assert_eq!(
            status_for(&Error::Intent(IntentError::EmptyMessage)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::Knowledge(KnowledgeError::EmptyQuery)),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn availability_errors_map_to_retryable_statuses() {
        assert_eq!(
            status_for(&Error::Llm(LlmError::CircuitOpen {
                provider: "openai".into()
            })),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&Error::Llm(LlmError::RateLimited {
                provider: "openai".into(),
                retry_after: None
            })),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
