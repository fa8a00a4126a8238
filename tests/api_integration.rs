//! End-to-end tests driving the HTTP router with an in-memory database and
//! scripted LLM responses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use revenue_copilot::api::{AppState, build_router};
use revenue_copilot::dealflow::DealflowAgent;
use revenue_copilot::error::LlmError;
use revenue_copilot::intent::IntentClassifier;
use revenue_copilot::knowledge::KnowledgeAgent;
use revenue_copilot::knowledge::chunker::Chunker;
use revenue_copilot::llm::{
    CompletionRequest, CompletionResponse, Embedder, LlmProvider,
};
use revenue_copilot::router::Router;
use revenue_copilot::store::{Database, LibSqlBackend};

/// Provider that pops scripted responses in call order and fails once the
/// script runs out.
struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(content) => Ok(CompletionResponse {
                content,
                input_tokens: 10,
                output_tokens: 10,
            }),
            None => Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "script exhausted".into(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let vocabulary = ["refund", "pricing", "onboarding"];
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                vocabulary
                    .iter()
                    .map(|word| if lower.contains(word) { 1.0 } else { 0.01 })
                    .collect()
            })
            .collect())
    }
}

async fn app(script: &[&str]) -> axum::Router {
    let llm = ScriptedLlm::new(script);
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());

    let knowledge = Arc::new(KnowledgeAgent::new(
        llm.clone(),
        Arc::new(KeywordEmbedder),
        db.clone(),
        Chunker::new(1000, 200),
        5,
        0.3,
    ));
    let dealflow = Arc::new(DealflowAgent::new(llm.clone(), db.clone()));
    let orchestrator = Arc::new(Router::new(
        IntentClassifier::new(llm.clone()),
        knowledge.clone(),
        dealflow.clone(),
        db.clone(),
    ));

    build_router(AppState {
        classifier: Arc::new(IntentClassifier::new(llm)),
        knowledge,
        dealflow,
        orchestrator,
        db,
    })
}

async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app(&[]).await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ingest_then_ask_round_trip() {
    let app = app(&["Refunds are honored within 30 days [1]."]).await;

    let (status, body) = post_json(
        &app,
        "/agent-a/ingest",
        json!({
            "document_id": "policies",
            "title": "Company policies",
            "text": format!(
                "Refund policy: customers may request a refund within 30 days. {}",
                "More detail. ".repeat(20)
            ),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["chunk_count"].as_u64().unwrap() >= 1);

    let (status, body) = post_json(
        &app,
        "/agent-a/ask",
        json!({"question": "What is the refund policy?"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["answer"].as_str().unwrap().contains("30 days"));
    assert_eq!(body["citations"][0]["document_id"], "policies");
}

#[tokio::test]
async fn empty_question_is_400() {
    let app = app(&[]).await;
    let (status, body) = post_json(&app, "/agent-a/ask", json!({"question": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn newlead_is_idempotent_per_request_id() {
    // LLM script is empty: the regex fallback parses the lead.
    let app = app(&[]).await;
    let body = json!({
        "raw": "John Smith from Acme Corp wants a PoC demo, budget is around $10k",
        "request_id": "req-42",
    });

    let (status, first) = post_json(&app, "/agent-b/newlead", body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["replayed"], false);
    assert_eq!(first["lead"]["name"], "John Smith");
    assert_eq!(first["lead"]["normalized_company_domain"], "acme.com");

    let (status, second) = post_json(&app, "/agent-b/newlead", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["replayed"], true);
    assert_eq!(second["lead"]["id"], first["lead"]["id"]);
}

#[tokio::test]
async fn unextractable_lead_is_422() {
    let app = app(&[]).await;
    let (status, _) = post_json(
        &app,
        "/agent-b/newlead",
        json!({"raw": "nice weather today"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn nextstep_parse_happy_path_and_422() {
    let app = app(&[]).await;

    let (status, body) = post_json(
        &app,
        "/agent-b/nextstep-parse",
        json!({"raw": "Schedule demo next Wednesday at 11am with the technical team"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Business demo");
    assert_eq!(body["attendees"][0], "technical team");

    let (status, body) = post_json(
        &app,
        "/agent-b/nextstep-parse",
        json!({"raw": "let's sync up sometime"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("temporal"));
}

#[tokio::test]
async fn status_classify_is_deterministic() {
    let app = app(&[]).await;
    let (status, body) = post_json(
        &app,
        "/agent-b/status-classify",
        json!({"raw": "We lost the Initech deal, they went with a competitor"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["label"], "lost");
    assert_eq!(body["reason_category"], "competition");
}

#[tokio::test]
async fn proposal_copy_falls_back_to_template() {
    // Two LLM calls (lead parse, proposal), both unusable as structured
    // output, so the deterministic template must answer.
    let app = app(&["not json", "no sections here"]).await;
    let (status, body) = post_json(
        &app,
        "/agent-b/proposal-copy",
        json!({"raw": "Draft a proposal for John Smith at Acme Corp"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["title"].as_str().unwrap().contains("Acme Corp"));
    let bullets = body["bullet_points"].as_array().unwrap();
    assert!(bullets.len() >= 3);
}

#[tokio::test]
async fn classify_endpoint_uses_rules_for_attachments() {
    let app = app(&[]).await;
    let (status, body) = post_json(
        &app,
        "/classify",
        json!({"message": "see attached pricing sheet", "has_attachments": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent"], "knowledge_qa");
    assert!((body["confidence"].as_f64().unwrap() - 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn webhook_message_replays_on_duplicate_delivery() {
    let classification = r#"{"intent": "lead_capture", "confidence": 0.9, "reasoning": "lead"}"#;
    let lead_json = r#"{"name": "Jane Doe", "company": "Globex", "intent": "pilot"}"#;
    let app = app(&[classification, lead_json]).await;

    let body = json!({
        "user": "+15550001111",
        "text": "Jane Doe from Globex wants a pilot",
        "request_id": "whatsapp-msg-1",
    });

    let (status, first) = post_json(&app, "/webhook/message", body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["intent"], "lead_capture");
    assert_eq!(first["replayed"], false);

    // The script is exhausted; a second delivery must be served from the
    // effects ledger without touching the LLM.
    let (status, second) = post_json(&app, "/webhook/message", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["replayed"], true);
    assert_eq!(second["reply"], first["reply"]);
}

#[tokio::test]
async fn webhook_smalltalk_without_llm() {
    let app = app(&[]).await;
    let (status, body) = post_json(
        &app,
        "/webhook/message",
        json!({"user": "alice", "text": "hello!"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent"], "smalltalk");
    assert!(body["reply"].as_str().unwrap().contains("knowledge base"));
}
