//! Retry with exponential backoff and circuit breaking for external calls.
//!
//! Stock and gateway RPCs are retried only on transient failures, each
//! retry reusing the caller's idempotency key so repeated delivery never
//! double-reserves or double-charges. A collaborator that keeps failing
//! trips its circuit breaker, which then fails fast instead of blocking
//! checkout on a dead dependency.

use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Result, SagaError};

/// Exponential backoff delay sequence.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: 2.0,
            attempt: 0,
        }
    }

    /// Returns the next delay and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = if self.attempt == 0 {
            self.initial
        } else {
            let scaled = self.initial.as_millis() as f64 * self.multiplier.powi(self.attempt as i32);
            Duration::from_millis(scaled.min(self.max.as_millis() as f64) as u64)
        };
        self.attempt += 1;
        delay
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(10))
    }
}

/// Retry policy for blocking RPCs to external collaborators.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
        }
    }

    /// A policy that never sleeps, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or
    /// attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut backoff = ExponentialBackoff::new(self.initial_delay, self.max_delay);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    metrics::counter!("external_call_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(5))
    }
}

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker for one external collaborator.
///
/// Closed until `failure_threshold` consecutive failures, then Open for
/// `reset_timeout`, then HalfOpen: the next call is a probe whose outcome
/// closes or re-opens the circuit.
pub struct CircuitBreaker {
    service: &'static str,
    failure_threshold: u32,
    reset_timeout: Duration,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    opened_at_secs: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(service: &'static str, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            service,
            failure_threshold,
            reset_timeout,
            state: AtomicU8::new(STATE_CLOSED),
            consecutive_failures: AtomicU32::new(0),
            opened_at_secs: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::SeqCst) {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Checks whether a call may proceed. Returns `CircuitOpen` while the
    /// circuit is open and the reset timeout has not elapsed.
    pub fn guard(&self) -> Result<()> {
        if self.state.load(Ordering::SeqCst) != STATE_OPEN {
            return Ok(());
        }

        if self.reset_elapsed() {
            // One probe is allowed through.
            if self
                .state
                .compare_exchange(STATE_OPEN, STATE_HALF_OPEN, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                tracing::info!(service = self.service, "circuit half-open, probing");
                return Ok(());
            }
        }

        metrics::counter!("circuit_open_rejections_total", "service" => self.service).increment(1);
        Err(SagaError::CircuitOpen {
            service: self.service,
        })
    }

    /// Records a successful call, closing the circuit.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let prev = self.state.swap(STATE_CLOSED, Ordering::SeqCst);
        if prev != STATE_CLOSED {
            tracing::info!(service = self.service, "circuit closed");
        }
    }

    /// Records a failed call; opens the circuit at the threshold or when a
    /// half-open probe fails.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let state = self.state.load(Ordering::SeqCst);

        if state == STATE_HALF_OPEN || failures >= self.failure_threshold {
            self.open();
        }
    }

    fn open(&self) {
        self.opened_at_secs.store(now_secs(), Ordering::SeqCst);
        let prev = self.state.swap(STATE_OPEN, Ordering::SeqCst);
        if prev != STATE_OPEN {
            tracing::warn!(service = self.service, "circuit opened");
            metrics::counter!("circuit_opened_total", "service" => self.service).increment(1);
        }
    }

    fn reset_elapsed(&self) -> bool {
        let opened_at = self.opened_at_secs.load(Ordering::SeqCst);
        now_secs().saturating_sub(opened_at) >= self.reset_timeout.as_secs()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
