//! Resilience primitives: circuit breaker, retry, metrics.

pub mod circuit_breaker;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitError, State};
pub use metrics::{Counter, Gauge, Histogram, HistogramStats, MetricsRegistry};
pub use retry::{retry, RetryConfig};
