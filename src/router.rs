//! Conversation orchestrator.
//!
//! One inbound message flows through the effects ledger, the intent
//! classifier, and the agent matching the intent. Every turn is appended to
//! the conversation log, including failed ones. A request id that was
//! already completed is replayed from the ledger without re-running side
//! effects.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::dealflow::{DealflowAgent, ParsedLead};
use crate::error::{Error, Result};
use crate::intent::{Intent, IntentClassification, IntentClassifier};
use crate::knowledge::{Citation, KnowledgeAgent};
use crate::store::{ConversationRow, Database};

/// Ledger operation name for orchestrated messages.
const MESSAGE_OPERATION: &str = "message";

/// How many prior turns are fed to the classifier as context.
const CONTEXT_TURNS: usize = 3;

const SMALLTALK_REPLY: &str = "Hello! I can answer questions from the knowledge base, \
    capture new leads, draft proposals, schedule next steps, and track deal status. \
    What can I do for you?";

const UNKNOWN_REPLY: &str = "I'm not sure what you need. You can ask a knowledge \
    question, share a new lead, request a proposal, schedule a next step, or give \
    me a deal status update.";

static COMPANY_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Za-z0-9&]+\b").unwrap());

/// Sentence-leading words that look like company tokens but never are.
const COMPANY_STOPWORDS: &[&str] = &["We", "I", "The", "They", "It", "Our", "Deal", "Update"];

/// Best-effort company mention for status updates that skip prepositions
/// ("We lost Acme - budget cut"). The sentence-initial token is ignored.
fn guess_status_company(text: &str) -> Option<String> {
    COMPANY_TOKEN_RE
        .find_iter(text)
        .filter(|m| m.start() != 0)
        .map(|m| m.as_str())
        .find(|token| !COMPANY_STOPWORDS.contains(token))
        .map(str::to_string)
}

/// Outcome of one orchestrated message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterReply {
    pub request_id: String,
    pub intent: String,
    pub confidence: f32,
    pub reply: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// True when this outcome was served from the effects ledger.
    #[serde(default)]
    pub replayed: bool,
}

/// Intent-routed message orchestrator.
pub struct Router {
    classifier: IntentClassifier,
    knowledge: Arc<KnowledgeAgent>,
    dealflow: Arc<DealflowAgent>,
    db: Arc<dyn Database>,
}

impl Router {
    pub fn new(
        classifier: IntentClassifier,
        knowledge: Arc<KnowledgeAgent>,
        dealflow: Arc<DealflowAgent>,
        db: Arc<dyn Database>,
    ) -> Self {
        Self {
            classifier,
            knowledge,
            dealflow,
            db,
        }
    }

    /// Handle one inbound message end to end.
    #[instrument(skip(self, text))]
    pub async fn handle_message(
        &self,
        user: &str,
        text: &str,
        has_attachments: bool,
        request_id: &str,
    ) -> Result<RouterReply> {
        if let Some(outcome) = self
            .db
            .recorded_effect(request_id, MESSAGE_OPERATION)
            .await
            .map_err(Error::from)?
        {
            info!(request_id, "Replaying recorded outcome");
            let mut reply: RouterReply = serde_json::from_str(&outcome)
                .map_err(crate::error::LlmError::from)
                .map_err(Error::from)?;
            reply.replayed = true;
            return Ok(reply);
        }

        let context = self.recent_context(user).await?;
        let classification = self
            .classifier
            .classify(text, has_attachments, context.as_deref())
            .await?;

        info!(
            intent = classification.intent.label(),
            confidence = classification.confidence,
            "Classified message"
        );

        let dispatched = self.dispatch(text, request_id, &classification).await;

        let (output, citations, turn_error) = match &dispatched {
            Ok((reply, citations)) => (reply.clone(), citations.clone(), None),
            Err(e) => (String::new(), Vec::new(), Some(e.to_string())),
        };

        self.db
            .append_conversation(&ConversationRow {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                user: user.to_string(),
                intent: classification.intent.label().to_string(),
                input: text.to_string(),
                output,
                confidence: classification.confidence,
                citations: citations.clone(),
                error: turn_error,
            })
            .await
            .map_err(Error::from)?;

        let (reply_text, citations) = match dispatched {
            Ok(parts) => parts,
            Err(e) => {
                error!(intent = classification.intent.label(), error = %e, "Dispatch failed");
                return Err(e);
            }
        };

        let reply = RouterReply {
            request_id: request_id.to_string(),
            intent: classification.intent.label().to_string(),
            confidence: classification.confidence,
            reply: reply_text,
            citations,
            replayed: false,
        };

        let outcome = serde_json::to_string(&reply)
            .map_err(crate::error::LlmError::from)
            .map_err(Error::from)?;
        self.db
            .record_effect(request_id, MESSAGE_OPERATION, &outcome)
            .await
            .map_err(Error::from)?;

        Ok(reply)
    }

    async fn dispatch(
        &self,
        text: &str,
        request_id: &str,
        classification: &IntentClassification,
    ) -> Result<(String, Vec<Citation>)> {
        match classification.intent {
            Intent::KnowledgeQa => {
                let answer = self.knowledge.ask(text).await?;
                Ok((answer.answer, answer.citations))
            }
            Intent::LeadCapture => {
                let record = self.dealflow.new_lead(text, request_id).await?;
                Ok((
                    format!(
                        "Captured lead: {} at {} (quality {:.0}%).",
                        record.name,
                        record.company,
                        record.quality_score * 100.0
                    ),
                    Vec::new(),
                ))
            }
            Intent::ProposalRequest => {
                let parsed = self.proposal_context(classification).await?;
                let copy = self.dealflow.proposal_for(&parsed).await?;
                let bullets = copy
                    .bullet_points
                    .iter()
                    .map(|b| format!("- {b}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok((
                    format!("{}\n\n{}\n\n{}", copy.title, copy.summary_blurb, bullets),
                    Vec::new(),
                ))
            }
            Intent::NextStep => {
                let schedule = self.dealflow.nextstep_parse(text)?;
                let attendees = if schedule.attendees.is_empty() {
                    String::new()
                } else {
                    format!(" with {}", schedule.attendees.join(", "))
                };
                Ok((
                    format!(
                        "{}{} from {} to {}.",
                        schedule.title,
                        attendees,
                        schedule.start.format("%Y-%m-%d %H:%M UTC"),
                        schedule.end.format("%H:%M UTC")
                    ),
                    Vec::new(),
                ))
            }
            Intent::StatusUpdate => {
                let company = classification
                    .entities
                    .organizations
                    .first()
                    .cloned()
                    .or_else(|| guess_status_company(text));
                let Some(company) = company else {
                    return Ok((
                        "Which company is this status update about?".to_string(),
                        Vec::new(),
                    ));
                };
                let (status, updated) =
                    self.dealflow.apply_status_update(text, &company).await?;
                let applied = match updated {
                    Some(record) => format!("Updated {} to {}.", record.company, record.status.as_str()),
                    None => format!("No lead on file for {company}; classification recorded."),
                };
                Ok((
                    format!(
                        "{applied} ({:?}, reason: {:?})",
                        status.label, status.reason_category
                    ),
                    Vec::new(),
                ))
            }
            Intent::Smalltalk => Ok((SMALLTALK_REPLY.to_string(), Vec::new())),
            Intent::Unknown => Ok((UNKNOWN_REPLY.to_string(), Vec::new())),
        }
    }

    /// Lead fields for proposal generation: prefer the stored lead for an
    /// organization the message mentions, else fall back to entities.
    async fn proposal_context(
        &self,
        classification: &IntentClassification,
    ) -> Result<ParsedLead> {
        let entities = &classification.entities;

        if let Some(company) = entities.organizations.first() {
            if let Some(record) = self
                .db
                .latest_lead_for_company(company)
                .await
                .map_err(Error::from)?
            {
                return Ok(ParsedLead {
                    name: Some(record.name),
                    company: Some(record.company),
                    intent: Some(record.intent),
                    budget: record.budget,
                    notes: record.notes,
                });
            }
        }

        Ok(ParsedLead {
            name: entities.names.first().cloned(),
            company: entities.organizations.first().cloned(),
            intent: None,
            budget: entities.budget_amounts.first().cloned(),
            notes: None,
        })
    }

    async fn recent_context(&self, user: &str) -> Result<Option<String>> {
        let rows = self
            .db
            .recent_conversations(user, CONTEXT_TURNS)
            .await
            .map_err(Error::from)?;
        if rows.is_empty() {
            return Ok(None);
        }
        let joined = rows
            .iter()
            .rev()
            .map(|row| format!("[{}] {}", row.intent, row.input))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Some(joined))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;
    use crate::knowledge::chunker::Chunker;
    use crate::llm::{CompletionRequest, CompletionResponse, Embedder, LlmProvider};
    use crate::store::{LeadStatus, LibSqlBackend};

    /// Provider that pops scripted responses in call order.
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
        ) -> std::result::Result<CompletionResponse, LlmError> {
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

    struct ZeroEmbedder;

    #[async_trait]
    impl Embedder for ZeroEmbedder {
        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    async fn router_with(llm: Arc<ScriptedLlm>) -> (Router, Arc<LibSqlBackend>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let knowledge = Arc::new(KnowledgeAgent::new(
            llm.clone(),
            Arc::new(ZeroEmbedder),
            db.clone(),
            Chunker::new(1000, 200),
            5,
            0.3,
        ));
        let dealflow = Arc::new(DealflowAgent::new(llm.clone(), db.clone()));
        let router = Router::new(
            IntentClassifier::new(llm),
            knowledge,
            dealflow,
            db.clone(),
        );
        (router, db)
    }

    #[tokio::test]
    async fn smalltalk_skips_llm_and_logs_turn() {
        // Empty script: the rules engine must decide without the LLM.
        let (router, db) = router_with(ScriptedLlm::new(&[])).await;

        let reply = router
            .handle_message("alice", "hello!", false, "req-1")
            .await
            .unwrap();
        assert_eq!(reply.intent, "smalltalk");
        assert!(!reply.replayed);

        let rows = db.recent_conversations("alice", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].intent, "smalltalk");
        assert!(rows[0].error.is_none());
    }

    #[tokio::test]
    async fn duplicate_request_is_replayed_without_side_effects() {
        let classification =
            r#"{"intent": "lead_capture", "confidence": 0.9, "reasoning": "lead"}"#;
        let lead_json = r#"{"name": "John Smith", "company": "Acme Corp", "intent": "PoC"}"#;
        // Script covers only the first delivery; the duplicate must not
        // reach the LLM at all.
        let (router, db) = router_with(ScriptedLlm::new(&[classification, lead_json])).await;

        let first = router
            .handle_message("bob", "John Smith from Acme Corp wants a PoC", false, "req-7")
            .await
            .unwrap();
        assert!(!first.replayed);

        let second = router
            .handle_message("bob", "John Smith from Acme Corp wants a PoC", false, "req-7")
            .await
            .unwrap();
        assert!(second.replayed);
        assert_eq!(second.reply, first.reply);

        // Exactly one lead, one log row.
        assert!(db.latest_lead_for_company("Acme Corp").await.unwrap().is_some());
        assert_eq!(db.recent_conversations("bob", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_dispatch_is_logged_with_error() {
        let classification =
            r#"{"intent": "next_step", "confidence": 0.85, "reasoning": "scheduling"}"#;
        let (router, db) = router_with(ScriptedLlm::new(&[classification])).await;

        let result = router
            .handle_message("carol", "let's sync up sometime", false, "req-9")
            .await;
        assert!(result.is_err());

        let rows = db.recent_conversations("carol", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].error.is_some());
        assert!(rows[0].output.is_empty());

        // Failed turns leave no ledger entry, so a retry re-runs.
        assert!(db.recorded_effect("req-9", "message").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_update_routes_to_dealflow() {
        let lead_classification =
            r#"{"intent": "lead_capture", "confidence": 0.9, "reasoning": "lead"}"#;
        let lead_json = r#"{"name": "Jane Doe", "company": "Globex", "intent": "pilot"}"#;
        let status_classification =
            r#"{"intent": "status_update", "confidence": 0.88, "reasoning": "deal won"}"#;
        let (router, db) = router_with(ScriptedLlm::new(&[
            lead_classification,
            lead_json,
            status_classification,
        ]))
        .await;

        router
            .handle_message("dave", "Jane Doe from Globex wants a pilot", false, "req-a")
            .await
            .unwrap();
        let reply = router
            .handle_message("dave", "We won the deal at Globex on price", false, "req-b")
            .await
            .unwrap();
        assert_eq!(reply.intent, "status_update");
        assert!(reply.reply.contains("won"));

        let lead = db.latest_lead_for_company("Globex").await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Won);
    }

    #[tokio::test]
    async fn status_update_without_preposition_still_finds_company() {
        let lead_classification =
            r#"{"intent": "lead_capture", "confidence": 0.9, "reasoning": "lead"}"#;
        let lead_json = r#"{"name": "John Smith", "company": "Acme", "intent": "PoC"}"#;
        let status_classification =
            r#"{"intent": "status_update", "confidence": 0.88, "reasoning": "deal lost"}"#;
        let (router, db) = router_with(ScriptedLlm::new(&[
            lead_classification,
            lead_json,
            status_classification,
        ]))
        .await;

        router
            .handle_message("frank", "John Smith from Acme wants a PoC", false, "req-d")
            .await
            .unwrap();
        let reply = router
            .handle_message("frank", "We lost Acme - budget cut", false, "req-e")
            .await
            .unwrap();
        assert_eq!(reply.intent, "status_update");
        assert!(reply.reply.contains("Acme"));

        let lead = db.latest_lead_for_company("Acme").await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Lost);
    }

    #[tokio::test]
    async fn unknown_intent_asks_for_clarification() {
        let classification =
            r#"{"intent": "unknown", "confidence": 0.3, "reasoning": "unclear"}"#;
        let (router, _db) = router_with(ScriptedLlm::new(&[classification])).await;

        let reply = router
            .handle_message("erin", "what do you reckon?", false, "req-c")
            .await
            .unwrap();
        assert_eq!(reply.intent, "unknown");
        assert!(reply.reply.contains("not sure"));
    }
}
