//! Conversion from the canonical [`AppConfig`] shape into the resilience
//! module's [`crate::resilience::CircuitBreakerConfig`].

use std::time::Duration;

/// Per-component circuit breaker tuning; distinct instances guard the
/// engine HTTP client and the broker adapter independently.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerComponentConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_seconds: u32,
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_seconds: 30,
        }
    }
}

impl CircuitBreakerComponentConfig {
    pub fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout: Duration::from_secs(self.timeout_seconds as u64),
            success_threshold: self.success_threshold,
        }
    }
}
