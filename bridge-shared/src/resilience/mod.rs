//! Circuit breaker primitives guarding the engine HTTP client and the
//! broker adapter (§10.3: sustained outages fail fast instead of
//! stacking up retries).

pub mod behavior;
pub mod breaker;
pub mod metrics;

pub use behavior::CircuitBreakerBehavior;
pub use breaker::CircuitBreaker;
pub use metrics::{CircuitBreakerMetrics, MetricsCollector, PrometheusMetricsExporter};

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
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
