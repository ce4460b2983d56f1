//! Per-agent circuit breaker backing the resilient wrapper (§4.6).
//!
//! Standard closed/open/half-open state machine, sized for a single
//! half-open probe rather than a multi-success recovery window, with a 30s
//! timeout before that probe is attempted.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: crate::constants::CIRCUIT_FAILURE_THRESHOLD,
            timeout_duration: Duration::from_secs(crate::constants::CIRCUIT_HALF_OPEN_SECS),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<CircuitState>>,
    failure_count: Arc<AtomicU32>,
    last_state_change: Arc<RwLock<Instant>>,
    total_requests: Arc<AtomicU64>,
    total_failures: Arc<AtomicU64>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(CircuitState::Closed)),
            failure_count: Arc::new(AtomicU32::new(0)),
            last_state_change: Arc::new(RwLock::new(Instant::now())),
            total_requests: Arc::new(AtomicU64::new(0)),
            total_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn should_allow_request(&self) -> bool {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let current_state = *self.state.read().await;
        match current_state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let last_change = *self.last_state_change.read().await;
                if last_change.elapsed() >= self.config.timeout_duration {
                    self.transition_to_half_open().await;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub async fn record_success(&self) {
        let current_state = *self.state.read().await;
        match current_state {
            CircuitState::HalfOpen => self.transition_to_closed().await,
            CircuitState::Closed => self.failure_count.store(0, Ordering::Relaxed),
            CircuitState::Open => warn!("success recorded while circuit open"),
        }
    }

    pub async fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let current_state = *self.state.read().await;
        match current_state {
            CircuitState::Closed => {
                let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(count, threshold = self.config.failure_threshold, "circuit breaker failure");
                if count >= self.config.failure_threshold {
                    self.transition_to_open().await;
                }
            }
            CircuitState::HalfOpen => self.transition_to_open().await,
            CircuitState::Open => {}
        }
    }

    async fn transition_to_open(&self) {
        *self.state.write().await = CircuitState::Open;
        *self.last_state_change.write().await = Instant::now();
        warn!(
            total_requests = self.total_requests.load(Ordering::Relaxed),
            total_failures = self.total_failures.load(Ordering::Relaxed),
            "circuit breaker opened"
        );
    }

    async fn transition_to_half_open(&self) {
        *self.state.write().await = CircuitState::HalfOpen;
        *self.last_state_change.write().await = Instant::now();
        info!("circuit breaker half-open, probing");
    }

    async fn transition_to_closed(&self) {
        *self.state.write().await = CircuitState::Closed;
        *self.last_state_change.write().await = Instant::now();
        self.failure_count.store(0, Ordering::Relaxed);
        info!("circuit breaker closed, recovered");
    }

    pub async fn get_state(&self) -> CircuitState {
        *self.state.read().await
    }

    pub async fn get_metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            state: self.get_state().await,
            failure_count: self.failure_count.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u32,
    pub total_requests: u64,
    pub total_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            timeout_duration: Duration::from_secs(30),
        });
        for _ in 0..3 {
            breaker.record_failure().await;
        }
        assert_eq!(breaker.get_state().await, CircuitState::Open);
        assert!(!breaker.should_allow_request().await);
    }

    #[tokio::test]
    async fn half_open_probe_closes_on_success() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            timeout_duration: Duration::from_millis(10),
        });
        breaker.record_failure().await;
        assert_eq!(breaker.get_state().await, CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(breaker.should_allow_request().await);
        assert_eq!(breaker.get_state().await, CircuitState::HalfOpen);
        breaker.record_success().await;
        assert_eq!(breaker.get_state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            timeout_duration: Duration::from_millis(10),
        });
        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(breaker.should_allow_request().await);
        breaker.record_failure().await;
        assert_eq!(breaker.get_state().await, CircuitState::Open);
    }
}
