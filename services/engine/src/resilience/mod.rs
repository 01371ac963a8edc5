//! Resilience primitives for outbound calls
//!
//! - [`retry`]: bounded exponential backoff with jitter
//! - [`circuit_breaker`]: shared three-state breakers keyed by dependency name
//!
//! The discovery engine stacks them around each page fetch: the retry loop
//! runs on the outside and every attempt passes through the breaker, so an
//! opened breaker ends the retry loop with a fast-fail instead of more sleeps.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    BreakerError, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry,
    CircuitState,
};
pub use retry::{with_retry, PolicyError, RetryAttempt, RetryObserver, RetryPolicy, Retryable};
