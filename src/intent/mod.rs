//! Intent classification for inbound messages.
//!
//! Routes each message to one of seven intents. Attachments and bare
//! greetings are decided by the rules engine without an LLM call; everything
//! else goes through a strict-JSON LLM prompt. Classification never fails
//! outright: an LLM transport or parse failure degrades to `unknown` at
//! confidence 0.1 so the orchestrator can ask the user to rephrase.

pub mod entities;
pub mod rules;

pub use entities::ExtractedEntities;
pub use rules::IntentRules;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::IntentError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Max tokens for the classification call (kept tight, it runs on every message).
const CLASSIFY_MAX_TOKENS: u64 = 500;

/// Temperature for classification (deterministic-ish).
const CLASSIFY_TEMPERATURE: f64 = 0.0;

/// Primary intent of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    KnowledgeQa,
    LeadCapture,
    ProposalRequest,
    NextStep,
    StatusUpdate,
    Smalltalk,
    Unknown,
}

impl Intent {
    /// Wire label, also used in the conversation log.
    pub fn label(&self) -> &'static str {
        match self {
            Intent::KnowledgeQa => "knowledge_qa",
            Intent::LeadCapture => "lead_capture",
            Intent::ProposalRequest => "proposal_request",
            Intent::NextStep => "next_step",
            Intent::StatusUpdate => "status_update",
            Intent::Smalltalk => "smalltalk",
            Intent::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for Intent {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "knowledge_qa" => Intent::KnowledgeQa,
            "lead_capture" => Intent::LeadCapture,
            "proposal_request" => Intent::ProposalRequest,
            "next_step" => Intent::NextStep,
            "status_update" => Intent::StatusUpdate,
            "smalltalk" => Intent::Smalltalk,
            _ => Intent::Unknown,
        })
    }
}

/// Result of classifying one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    /// Confidence score 0-1.
    pub confidence: f32,
    pub entities: ExtractedEntities,
    /// Brief rationale for the classification.
    pub reasoning: String,
}

impl IntentClassification {
    /// Build a classification decided without an LLM call.
    pub(crate) fn fast(
        intent: Intent,
        confidence: f32,
        reasoning: &str,
        message: &str,
    ) -> Self {
        Self {
            intent,
            confidence,
            entities: ExtractedEntities::extract(message),
            reasoning: reasoning.to_string(),
        }
    }
}

/// What the LLM is asked to return. Entities are always extracted locally,
/// so the wire schema stays small.
#[derive(Debug, Deserialize)]
struct WireClassification {
    intent: String,
    confidence: f32,
    #[serde(default)]
    reasoning: String,
}

/// Intent classifier for routing inbound messages.
pub struct IntentClassifier {
    llm: Arc<dyn LlmProvider>,
    rules: IntentRules,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            rules: IntentRules::default_rules(),
        }
    }

    pub fn with_rules(mut self, rules: IntentRules) -> Self {
        self.rules = rules;
        self
    }

    /// Classify a message.
    ///
    /// `context` carries previous conversation text, if any. Only an empty
    /// message is an error; LLM failures degrade to `unknown`.
    pub async fn classify(
        &self,
        message: &str,
        has_attachments: bool,
        context: Option<&str>,
    ) -> Result<IntentClassification, IntentError> {
        if message.trim().is_empty() {
            return Err(IntentError::EmptyMessage);
        }

        if let Some(decision) = self.rules.evaluate(message, has_attachments) {
            debug!(
                intent = decision.intent.label(),
                "Rules engine matched, skipping LLM classification"
            );
            return Ok(decision);
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_user_prompt(message, context)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Classification LLM call failed, falling back to unknown");
                return Ok(IntentClassification::fast(
                    Intent::Unknown,
                    0.1,
                    &format!("classification failed: {e}"),
                    message,
                ));
            }
        };

        match parse_classification(&response.content) {
            Ok(wire) => {
                let intent = wire.intent.parse().unwrap_or(Intent::Unknown);
                Ok(IntentClassification {
                    intent,
                    confidence: wire.confidence.clamp(0.0, 1.0),
                    entities: ExtractedEntities::extract(message),
                    reasoning: wire.reasoning,
                })
            }
            Err(e) => {
                warn!(raw = %response.content, error = %e, "Unparseable classification, falling back to unknown");
                Ok(IntentClassification::fast(
                    Intent::Unknown,
                    0.1,
                    &format!("classification failed: {e}"),
                    message,
                ))
            }
        }
    }
}

const SYSTEM_PROMPT: &str = r#"You are an expert intent classifier for a business chat copilot.

Classify messages into exactly one of these intents:

1. knowledge_qa: Questions about company info, policies, docs (e.g., "What's our refund policy?")
2. lead_capture: New prospect information (e.g., "John from Acme wants a PoC, budget 10k")
3. proposal_request: Request to generate proposals (e.g., "Draft a proposal for Acme")
4. next_step: Scheduling meetings/calls (e.g., "Schedule demo next Wed at 11")
5. status_update: Deal status changes (e.g., "We lost Acme - budget cut")
6. smalltalk: Greetings, thanks, casual conversation
7. unknown: Unclear or unrelated messages

CRITICAL: Return only a JSON object {"intent": "...", "confidence": 0.0-1.0, "reasoning": "..."}. No explanatory text."#;

fn build_user_prompt(message: &str, context: Option<&str>) -> String {
    let mut prompt = format!("Message to classify: {message:?}\n");
    if let Some(context) = context {
        prompt.push_str(&format!("Previous context: {context}\n"));
    }
    prompt.push_str("\nReturn the classification JSON:");
    prompt
}

/// Parse the LLM's classification response, tolerating code fences and
/// surrounding prose.
fn parse_classification(raw: &str) -> Result<WireClassification, IntentError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| IntentError::UnparseableResponse(raw.to_string()))?;
    serde_json::from_str(json).map_err(|e| IntentError::UnparseableResponse(e.to_string()))
}

/// Extract the first balanced `{...}` block from text.
pub(crate) fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::CompletionResponse;

    /// Mock provider returning a canned response (or failing).
    struct CannedLlm {
        response: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for CannedLlm {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            match &self.response {
                Some(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    input_tokens: 10,
                    output_tokens: 10,
                }),
                None => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "down".into(),
                }),
            }
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    fn classifier(response: Option<&str>) -> IntentClassifier {
        IntentClassifier::new(Arc::new(CannedLlm {
            response: response.map(String::from),
        }))
    }

    #[tokio::test]
    async fn empty_message_is_an_error() {
        let c = classifier(None);
        assert!(matches!(
            c.classify("  ", false, None).await,
            Err(IntentError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn attachments_short_circuit() {
        // LLM is down, but attachments never reach it.
        let c = classifier(None);
        let result = c.classify("pricing sheet", true, None).await.unwrap();
        assert_eq!(result.intent, Intent::KnowledgeQa);
        assert!((result.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn parses_llm_classification() {
        let c = classifier(Some(
            r#"{"intent": "lead_capture", "confidence": 0.92, "reasoning": "new prospect"}"#,
        ));
        let result = c
            .classify("John Smith from Acme Corp wants a PoC, budget 10k", false, None)
            .await
            .unwrap();
        assert_eq!(result.intent, Intent::LeadCapture);
        assert!((result.confidence - 0.92).abs() < 1e-6);
        assert_eq!(result.entities.names, vec!["John Smith"]);
    }

    #[tokio::test]
    async fn tolerates_code_fences() {
        let c = classifier(Some(
            "```json\n{\"intent\": \"next_step\", \"confidence\": 0.8, \"reasoning\": \"scheduling\"}\n```",
        ));
        let result = c
            .classify("Schedule demo next Wed at 11", false, None)
            .await
            .unwrap();
        assert_eq!(result.intent, Intent::NextStep);
    }

    #[tokio::test]
    async fn llm_failure_degrades_to_unknown() {
        let c = classifier(None);
        let result = c.classify("what do you think?", false, None).await.unwrap();
        assert_eq!(result.intent, Intent::Unknown);
        assert!((result.confidence - 0.1).abs() < f32::EPSILON);
        assert!(result.reasoning.contains("classification failed"));
    }

    #[tokio::test]
    async fn garbage_response_degrades_to_unknown() {
        let c = classifier(Some("I think this is probably about leads?"));
        let result = c.classify("hmm", false, None).await.unwrap();
        assert_eq!(result.intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn unrecognized_intent_string_maps_to_unknown() {
        let c = classifier(Some(
            r#"{"intent": "banana", "confidence": 0.9, "reasoning": "?"}"#,
        ));
        let result = c.classify("something odd", false, None).await.unwrap();
        assert_eq!(result.intent, Intent::Unknown);
    }

    #[test]
    fn extract_json_handles_nesting_and_strings() {
        let raw = r#"prefix {"a": {"b": "} tricky"}, "c": 1} suffix"#;
        let json = extract_json_object(raw).unwrap();
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["c"], 1);
    }
}
