//! LLM integration for the revenue copilot.
//!
//! Completions run against Anthropic or OpenAI through rig-core;
//! embeddings are OpenAI only. `RigAdapter` / `RigEmbedder` bridge rig's
//! model traits to our `LlmProvider` and `Embedder` traits, and
//! `ResilientProvider` layers retry and circuit breaking on top.

pub mod breaker;
pub mod provider;
pub mod resilient;
pub(crate) mod retry;
mod rig_adapter;

pub use breaker::{BreakerState, CircuitBreaker};
pub use provider::*;
pub use resilient::ResilientProvider;
pub use retry::RetryPolicy;
pub use rig_adapter::{RigAdapter, RigEmbedder};

use std::sync::Arc;

use rig::client::{CompletionClient, EmbeddingsClient};
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

/// Create a provider with retry and circuit breaking layered on.
pub fn create_resilient_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    Ok(Arc::new(ResilientProvider::new(create_provider(config)?)))
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Anthropic client construction failed: {e}"),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!(model = %config.model, "Anthropic completion backend ready");
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("OpenAI client construction failed: {e}"),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!(model = %config.model, "OpenAI completion backend ready");
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

/// Create an embedder (OpenAI only; Anthropic exposes no embedding API).
pub fn create_embedder(
    api_key: &secrecy::SecretString,
    model: &str,
) -> Result<Arc<dyn Embedder>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(api_key.expose_secret()).map_err(|e| LlmError::EmbeddingFailed {
            reason: format!("OpenAI client construction failed: {e}"),
        })?;

    let embedding_model = client.embedding_model(model);
    tracing::info!(model, "OpenAI embedding backend ready");
    Ok(Arc::new(RigEmbedder::new(embedding_model, model)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_construction_defers_auth() {
        // Key validity is only checked on the first request, so a
        // placeholder key must still construct.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("placeholder"),
            model: "claude-3-5-sonnet-latest".to_string(),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "claude-3-5-sonnet-latest");
    }

    #[test]
    fn openai_backend_uses_requested_model() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from("sk-placeholder"),
            model: "gpt-4o-mini".to_string(),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o-mini");
    }
}
