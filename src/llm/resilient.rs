//! Resilience wrapper composing retry and circuit breaking around a provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::LlmError;
use crate::llm::breaker::CircuitBreaker;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::llm::retry::{RetryPolicy, with_retry};

/// Default breaker: 3 consecutive failures, 30s reset.
const BREAKER_THRESHOLD: u32 = 3;
const BREAKER_RESET: Duration = Duration::from_secs(30);

/// Wraps an `LlmProvider` with retry and a circuit breaker.
///
/// Each completion attempt first consults the breaker; an open breaker fails
/// fast with `LlmError::CircuitOpen` rather than queuing work behind a dead
/// upstream. Retries happen inside the wrapper so breaker bookkeeping sees
/// every attempt.
pub struct ResilientProvider {
    inner: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn LlmProvider>) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
            breaker: CircuitBreaker::new(BREAKER_THRESHOLD, BREAKER_RESET),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }
}

#[async_trait]
impl LlmProvider for ResilientProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        with_retry(self.policy, || {
            let request = request.clone();
            async move {
                if !self.breaker.allow() {
                    warn!(
                        provider = self.inner.model_name(),
                        "Circuit breaker open, failing fast"
                    );
                    return Err(LlmError::CircuitOpen {
                        provider: self.inner.model_name().to_string(),
                    });
                }
                match self.inner.complete(request).await {
                    Ok(response) => {
                        self.breaker.record_success();
                        Ok(response)
                    }
                    Err(e) => {
                        self.breaker.record_failure();
                        Err(e)
                    }
                }
            }
        })
        .await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
