//! # Generic Circuit Breaker
//!
//! A small closed/open/half-open state machine used to protect calls into
//! collaborators that can fail repeatedly (most notably the storage
//! backend behind `StorageManager`). Domain-specific wrappers (see
//! `stepforge_core::orchestration::storage::circuit_breaker`) hold one of
//! these internally and implement `CircuitBreakerBehavior` while exposing
//! their own convenience API, the way the teacher splits a generic
//! primitive from its call-site wrappers.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CircuitState {
    /// Normal operation — calls proceed.
    Closed,
    /// Failing fast — calls are rejected until the recovery timeout elapses.
    Open,
    /// Testing recovery — a limited number of calls are allowed through.
    HalfOpen,
}

/// Configuration for a `CircuitBreaker`.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures needed to open the circuit.
    pub failure_threshold: u32,
    /// How long to stay open before testing recovery.
    pub timeout: Duration,
    /// Consecutive successes needed in half-open to close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Point-in-time metrics snapshot for health reporting.
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub current_state: CircuitState,
    pub consecutive_failures: u64,
    pub half_open_calls: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u64,
    half_open_calls: u64,
    opened_at: Option<Instant>,
}

/// Unified interface for circuit breaker implementations, so callers can
/// work uniformly with `&dyn CircuitBreakerBehavior` for health reporting
/// regardless of which component a concrete breaker protects.
///
/// Object-safe by construction (`Send + Sync + Debug`).
pub trait CircuitBreakerBehavior: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn state(&self) -> CircuitState;
    fn should_allow(&self) -> bool;
    fn record_success(&self, duration: Duration);
    fn record_failure(&self, duration: Duration);
    fn is_healthy(&self) -> bool;
    fn force_open(&self);
    fn force_closed(&self);
    fn metrics(&self) -> CircuitBreakerMetrics;
}

/// A named closed/open/half-open circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_calls: 0,
                opened_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the circuit currently allows a call through. Open circuits
    /// transition themselves to half-open once the recovery timeout has
    /// elapsed, as a side effect of this check.
    pub fn should_allow(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_calls = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success_manual(&self, _duration: Duration) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_calls += 1;
                if inner.half_open_calls >= u64::from(self.config.success_threshold) {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_calls = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure_manual(&self, _duration: Duration) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= u64::from(self.config.failure_threshold) {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_calls = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker mutex poisoned").state
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn force_open(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
    }

    pub fn force_closed(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_calls = 0;
        inner.opened_at = None;
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        CircuitBreakerMetrics {
            current_state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_calls: inner.half_open_calls,
        }
    }
}

impl CircuitBreakerBehavior for CircuitBreaker {
    fn name(&self) -> &str {
        CircuitBreaker::name(self)
    }

    fn state(&self) -> CircuitState {
        CircuitBreaker::state(self)
    }

    fn should_allow(&self) -> bool {
        CircuitBreaker::should_allow(self)
    }

    fn record_success(&self, duration: Duration) {
        self.record_success_manual(duration);
    }

    fn record_failure(&self, duration: Duration) {
        self.record_failure_manual(duration);
    }

    fn is_healthy(&self) -> bool {
        CircuitBreaker::is_healthy(self)
    }

    fn force_open(&self) {
        CircuitBreaker::force_open(self);
    }

    fn force_closed(&self) {
        CircuitBreaker::force_closed(self);
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreaker::metrics(self)
    }
}
