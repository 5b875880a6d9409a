//! Concrete closed/open/half-open circuit breaker implementing
//! [`CircuitBreakerBehavior`]. Used independently by the engine HTTP
//! client and the broker adapter so an outage in one does not trip the
//! other.

use super::{CircuitBreakerBehavior, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

/// A single circuit breaker instance, identified by `name` in logs and
/// metrics exports.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_duration_nanos: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_duration_nanos: AtomicU64::new(0),
        }
    }

    fn record(&self, duration: Duration, success: bool) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);

        let mut inner = self.inner.lock().unwrap();
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
            inner.consecutive_failures = 0;
            match inner.state {
                CircuitState::HalfOpen => {
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.success_threshold {
                        inner.state = CircuitState::Closed;
                        inner.half_open_successes = 0;
                        inner.opened_at = None;
                        tracing::info!(circuit_breaker = %self.name, "circuit closed after recovery");
                    }
                }
                CircuitState::Closed | CircuitState::Open => {}
            }
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
            inner.consecutive_failures += 1;
            match inner.state {
                CircuitState::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(circuit_breaker = %self.name, "circuit opened");
                }
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.half_open_successes = 0;
                    tracing::warn!(circuit_breaker = %self.name, "circuit re-opened during recovery probe");
                }
                _ => {}
            }
        }
    }
}

impl CircuitBreakerBehavior for CircuitBreaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    fn should_allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    tracing::info!(circuit_breaker = %self.name, "circuit half-open, probing");
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self, duration: Duration) {
        self.record(duration, true);
    }

    fn record_failure(&self, duration: Duration) {
        self.record(duration, false);
    }

    fn is_healthy(&self) -> bool {
        self.metrics().is_healthy()
    }

    fn force_open(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
    }

    fn force_closed(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock().unwrap();
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let success_count = self.success_count.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        let total_duration = Duration::from_nanos(self.total_duration_nanos.load(Ordering::Relaxed));

        CircuitBreakerMetrics {
            total_calls,
            success_count,
            failure_count,
            consecutive_failures: inner.consecutive_failures as u64,
            half_open_calls: inner.half_open_successes as u64,
            total_duration,
            current_state: inner.state,
            failure_rate: if total_calls > 0 {
                failure_count as f64 / total_calls as f64
            } else {
                0.0
            },
            success_rate: if total_calls > 0 {
                success_count as f64 / total_calls as f64
            } else {
                0.0
            },
            average_duration: if total_calls > 0 {
                total_duration / total_calls as u32
            } else {
                Duration::ZERO
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "engine",
            CircuitBreakerConfig {
                failure_threshold: 3,
                timeout: Duration::from_millis(20),
                success_threshold: 2,
            },
        )
    }

    #[test]
    fn opens_after_threshold_failures() {
        let b = breaker();
        for _ in 0..3 {
            b.record_failure(Duration::from_millis(1));
        }
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.should_allow());
    }

    #[test]
    fn half_opens_after_timeout_then_closes_on_success() {
        let b = breaker();
        for _ in 0..3 {
            b.record_failure(Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(25));
        assert!(b.should_allow());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.record_success(Duration::from_millis(1));
        b.record_success(Duration::from_millis(1));
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn force_open_blocks_calls() {
        let b = breaker();
        b.force_open();
        assert!(!b.should_allow());
        b.force_closed();
        assert!(b.should_allow());
    }
}
