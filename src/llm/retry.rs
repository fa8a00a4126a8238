//! Retry with exponential backoff and jitter for transient LLM failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::LlmError;

/// Retry policy for LLM calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), with up to 20% jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(retry as i32);
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_millis((base * jitter) as u64)
    }
}

/// Run `operation` under the policy, retrying only retryable errors.
///
/// A `RateLimited` error with a server-provided `retry_after` overrides the
/// computed backoff for that attempt.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = match &e {
                    LlmError::RateLimited {
                        retry_after: Some(after),
                        ..
                    } => *after,
                    _ => policy.delay_for(attempt),
                };
                warn!(
                    attempt = attempt + 1,
                    max = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "LLM call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
