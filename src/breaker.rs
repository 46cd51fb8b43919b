//! Circuit breaker wrapping fallible async operations
//!
//! Two instances guard the bridge: one around the upstream dial/handshake,
//! one around bus publishes. Transitions are serialized under an internal
//! lock; in half-open state exactly one caller runs the trial call while
//! concurrent callers fail fast.

use crate::config::BreakerConfig;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls execute
    Closed,
    /// Calls fail fast until the recovery timeout elapses
    Open,
    /// A single trial call is in flight
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Error returned by a breaker-guarded call
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E: std::error::Error> {
    /// The breaker rejected the call without invoking the operation.
    #[error("circuit breaker is open")]
    Open,
    /// The operation ran and failed.
    #[error(transparent)]
    Inner(E),
}

/// Point-in-time view of one breaker, exposed through the metrics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name,
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn from_config(name: &'static str, config: &BreakerConfig) -> Self {
        Self::new(name, config.failure_threshold, config.recovery_timeout())
    }

    /// Run `op` under the breaker. Every failure counts toward the threshold.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        self.call_when(op, |_| true).await
    }

    /// Run `op` under the breaker; only failures matching `counts` contribute
    /// to the failure threshold, others pass through untracked.
    pub async fn call_when<F, Fut, T, E, P>(&self, op: F, counts: P) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error,
        P: FnOnce(&E) -> bool,
    {
        let trial = match self.admit() {
            Some(trial) => trial,
            None => return Err(BreakerError::Open),
        };

        match op().await {
            Ok(value) => {
                self.on_success(trial);
                Ok(value)
            }
            Err(err) => {
                if counts(&err) {
                    self.on_failure(trial);
                } else {
                    self.on_uncounted(trial);
                }
                Err(BreakerError::Inner(err))
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.to_string(),
            state: inner.state,
            failure_count: inner.failure_count,
        }
    }

    /// Returns `Some(is_trial)` when the call may proceed.
    fn admit(&self) -> Option<bool> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Some(false),
            CircuitState::Open => match inner.opened_at {
                Some(opened_at) if opened_at.elapsed() >= self.recovery_timeout => {
                    tracing::info!(breaker = self.name, "Circuit breaker half-open, probing");
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    Some(true)
                }
                _ => None,
            },
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(true)
                }
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.inner.lock();
        if trial {
            inner.trial_in_flight = false;
            if inner.state == CircuitState::HalfOpen {
                tracing::info!(breaker = self.name, "Circuit breaker closed after probe");
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
            }
        }
        inner.failure_count = 0;
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.inner.lock();
        if trial {
            inner.trial_in_flight = false;
            if inner.state == CircuitState::HalfOpen {
                tracing::warn!(breaker = self.name, "Probe failed, circuit breaker reopening");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                return;
            }
        }
        if inner.state == CircuitState::Closed {
            inner.failure_count += 1;
            tracing::warn!(
                breaker = self.name,
                failure_count = inner.failure_count,
                threshold = self.failure_threshold,
                "Circuit breaker failure recorded"
            );
            if inner.failure_count >= self.failure_threshold {
                tracing::error!(breaker = self.name, "Circuit breaker opened");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
        }
    }

    // Non-counting failures release the trial slot without moving the state
    // machine, so the next caller re-runs the probe.
    fn on_uncounted(&self, trial: bool) {
        if trial {
            self.inner.lock().trial_in_flight = false;
        }
    }
}
