//! Circuit breaker guarding a single upstream LLM provider.
//!
//! Closed → counts failures. At the threshold the breaker opens and calls
//! fail fast until the reset timeout elapses; the next call then probes in
//! half-open state. A successful probe closes the breaker, a failed one
//! re-opens it.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker state, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker with a failure threshold and reset timeout.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Whether a call may proceed. Transitions Open → HalfOpen when the
    /// reset timeout has elapsed.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        if inner.state == BreakerState::HalfOpen || inner.failure_count >= self.failure_threshold {
            inner.state = BreakerState::Open;
        }
    }

    /// Current state (for logging and health reporting).
    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }
}
