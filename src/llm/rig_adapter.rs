//! Bridges rig-core models to the crate's `LlmProvider`/`Embedder` traits.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, CompletionRequestBuilder, Message};
use rig::embeddings::EmbeddingModel;

use crate::error::LlmError;
use crate::llm::provider::{
    ChatRole, CompletionRequest, CompletionResponse, Embedder, LlmProvider,
};

/// Adapter from a rig `CompletionModel` to `LlmProvider`.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Clone + Send + Sync,
{
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        // System messages become the preamble; the final user message is the
        // prompt and everything else is chat history.
        let mut preamble = String::new();
        let mut history: Vec<Message> = Vec::new();
        for msg in &request.messages {
            match msg.role {
                ChatRole::System => {
                    if !preamble.is_empty() {
                        preamble.push_str("\n\n");
                    }
                    preamble.push_str(&msg.content);
                }
                ChatRole::User => history.push(Message::user(msg.content.clone())),
                ChatRole::Assistant => history.push(Message::assistant(msg.content.clone())),
            }
        }

        let prompt = history.pop().ok_or_else(|| LlmError::InvalidResponse {
            provider: self.model_name.clone(),
            reason: "completion request had no user message".to_string(),
        })?;

        let mut builder =
            CompletionRequestBuilder::new(self.model.clone(), prompt).messages(history);
        if !preamble.is_empty() {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        let response =
            self.model
                .completion(builder.build())
                .await
                .map_err(|e| LlmError::RequestFailed {
                    provider: self.model_name.clone(),
                    reason: e.to_string(),
                })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Adapter from a rig `EmbeddingModel` to `Embedder`.
pub struct RigEmbedder<E> {
    model: E,
    model_name: String,
}

impl<E> RigEmbedder<E> {
    pub fn new(model: E, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<E> Embedder for RigEmbedder<E>
where
    E: EmbeddingModel + Send + Sync,
{
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .embed_texts(texts.to_vec())
            .await
            .map_err(|e| LlmError::EmbeddingFailed {
                reason: format!("{} embed_texts: {e}", self.model_name),
            })?;

        Ok(embeddings
            .into_iter()
            .map(|embedding| embedding.vec.into_iter().map(|v| v as f32).collect())
            .collect())
    }
}
