//! Resilience primitives shared across the runtime's collaborators.

mod circuit_breaker;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerBehavior, CircuitBreakerConfig, CircuitBreakerMetrics,
    CircuitState,
};
