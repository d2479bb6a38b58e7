use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::utils::Metrics;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests are allowed
    Closed,
    /// Requests fail fast without touching the network
    Open,
    /// Trial calls are let through to see whether the API recovered
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: usize,
    /// How long the circuit stays open before a trial call
    pub cooldown: Duration,
    /// Consecutive trial successes needed to close again
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Guards the remote detection/translation APIs.
///
/// Pages are loaded speculatively, so a dead API would otherwise be hit
/// once per preloaded page. After `failure_threshold` consecutive failures
/// every call fails fast until the cooldown elapses.
#[derive(Clone)]
pub struct CircuitBreaker {
    state: Arc<Mutex<Breaker>>,
    config: CircuitBreakerConfig,
    metrics: Option<Metrics>,
}

/// State plus the streak that drives its next transition
#[derive(Debug, Clone, Copy)]
enum Breaker {
    Closed { failures: usize },
    Open { since: Instant },
    HalfOpen { successes: usize },
}

impl CircuitBreaker {
    pub fn new(metrics: Option<Metrics>) -> Self {
        Self::with_config(CircuitBreakerConfig::default(), metrics)
    }

    pub fn with_config(config: CircuitBreakerConfig, metrics: Option<Metrics>) -> Self {
        Self {
            state: Arc::new(Mutex::new(Breaker::Closed { failures: 0 })),
            config,
            metrics,
        }
    }

    /// False while open; the first call after the cooldown is a trial call
    pub fn allow_request(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            Breaker::Closed { .. } | Breaker::HalfOpen { .. } => true,
            Breaker::Open { since } if since.elapsed() >= self.config.cooldown => {
                debug!("Circuit cooldown elapsed, probing");
                *state = Breaker::HalfOpen { successes: 0 };
                true
            }
            Breaker::Open { .. } => false,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        *state = match *state {
            Breaker::HalfOpen { successes } if successes + 1 < self.config.success_threshold => {
                Breaker::HalfOpen {
                    successes: successes + 1,
                }
            }
            Breaker::HalfOpen { .. } => {
                info!("API recovered, closing circuit");
                Breaker::Closed { failures: 0 }
            }
            Breaker::Closed { .. } => Breaker::Closed { failures: 0 },
            open @ Breaker::Open { .. } => open,
        };
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        let next = match *state {
            Breaker::Closed { failures } if failures + 1 < self.config.failure_threshold => {
                Breaker::Closed {
                    failures: failures + 1,
                }
            }
            Breaker::Closed { failures } => {
                warn!("Opening circuit after {} consecutive API failures", failures + 1);
                self.trip()
            }
            Breaker::HalfOpen { .. } => {
                warn!("Trial call failed, reopening circuit");
                self.trip()
            }
            open @ Breaker::Open { .. } => open,
        };
        *state = next;
    }

    pub fn state(&self) -> CircuitState {
        match *self.state.lock() {
            Breaker::Closed { .. } => CircuitState::Closed,
            Breaker::Open { .. } => CircuitState::Open,
            Breaker::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    fn trip(&self) -> Breaker {
        if let Some(ref m) = self.metrics {
            m.record_circuit_breaker_trip();
        }
        Breaker::Open {
            since: Instant::now(),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::with_config(
            CircuitBreakerConfig {
                failure_threshold: 2,
                cooldown,
                success_threshold: 2,
            },
            Some(Metrics::new()),
        )
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = breaker(Duration::from_secs(60));
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());

        let trips = breaker.metrics.as_ref().unwrap().snapshot().circuit_breaker_trips;
        assert_eq!(trips, 1);
    }

    #[test]
    fn test_recovers_through_half_open() {
        let breaker = breaker(Duration::from_millis(50));
        breaker.record_failure();
        breaker.record_failure();

        std::thread::sleep(Duration::from_millis(80));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = breaker(Duration::from_millis(50));
        breaker.record_failure();
        breaker.record_failure();

        std::thread::sleep(Duration::from_millis(80));
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = breaker(Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
