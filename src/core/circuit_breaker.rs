//! Circuit breaker state machine for the ledger RPC endpoint.
//!
//! Closed -> Open after `failure_threshold` consecutive failures.
//! Open -> HalfOpen on the first `is_open()` check after `cooldown`.
//! HalfOpen -> Closed on the next success, -> Open on the next failure.
//!
//! Time comes from `tokio::time::Instant` so tests can pause the clock.

use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::models::config::ResilienceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// What the caller should do after a failure was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerSignal {
    None,
    /// Drop pooled handles, the breaker stays closed
    ResetPool,
    /// The breaker just opened
    Opened,
}

#[derive(Debug, Clone, Copy)]
struct BreakerInner {
    state: CircuitState,
    open_until: Option<Instant>,
    consecutive_failures: u32,
    total_opens: u64,
}

/// Point-in-time view for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_opens: u64,
    /// Remaining cool-down in milliseconds
    pub open_for_ms: Option<u64>,
}

pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    pool_reset_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, pool_reset_threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                open_until: None,
                consecutive_failures: 0,
                total_opens: 0,
            }),
            failure_threshold: failure_threshold.max(1),
            pool_reset_threshold,
            cooldown,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(
            config.failure_threshold,
            config.pool_reset_threshold,
            config.cooldown,
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // State is plain data, a poisoned lock still holds a usable value
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True while calls should use the fast-fail path.
    ///
    /// Performs the Open -> HalfOpen transition once the cool-down is over.
    pub fn is_open(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Open => match inner.open_until {
                Some(until) if Instant::now() < until => true,
                _ => {
                    inner.state = CircuitState::HalfOpen;
                    inner.open_until = None;
                    inner.consecutive_failures = 0;
                    info!("🟡 Circuit half-open, probing RPC");
                    false
                }
            },
            CircuitState::Closed | CircuitState::HalfOpen => false,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            info!("🟢 Circuit closed, RPC recovered");
        }
    }

    pub fn record_failure(&self) -> BreakerSignal {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                self.trip(&mut inner);
                warn!("🔴 Probe failed, circuit re-opened for {}s", self.cooldown.as_secs());
                BreakerSignal::Opened
            }
            CircuitState::Open => {
                inner.consecutive_failures += 1;
                BreakerSignal::None
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                let failures = inner.consecutive_failures;
                if failures >= self.failure_threshold {
                    self.trip(&mut inner);
                    warn!(
                        "🔴 Circuit opened after {} consecutive failures ({}s cool-down)",
                        failures,
                        self.cooldown.as_secs()
                    );
                    BreakerSignal::Opened
                } else if failures == self.pool_reset_threshold {
                    warn!("♻️ {} consecutive RPC failures, recycling pool", failures);
                    BreakerSignal::ResetPool
                } else {
                    BreakerSignal::None
                }
            }
        }
    }

    fn trip(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.open_until = Some(Instant::now() + self.cooldown);
        inner.consecutive_failures = 0;
        inner.total_opens += 1;
    }

    pub fn state(&self) -> CircuitBreakerState {
        let inner = *self.lock();
        CircuitBreakerState {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_opens: inner.total_opens,
            open_for_ms: inner
                .open_until
                .map(|until| until.saturating_duration_since(Instant::now()).as_millis() as u64),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(10, 5, Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_exactly_threshold_failures() {
        let cb = breaker();
        for i in 1..10 {
            let signal = cb.record_failure();
            assert_eq!(signal == BreakerSignal::ResetPool, i == 5);
            assert!(!cb.is_open());
        }
        assert_eq!(cb.record_failure(), BreakerSignal::Opened);
        assert!(cb.is_open());
        assert_eq!(cb.state().total_opens, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_zeroes_counter_without_closing_early() {
        let cb = breaker();
        for _ in 0..7 {
            cb.record_failure();
        }
        cb.record_success();
        assert_eq!(cb.consecutive_failures(), 0);

        for _ in 0..10 {
            cb.record_failure();
        }
        assert!(cb.is_open());
        cb.record_success();
        assert!(cb.is_open(), "success must not close before the cool-down");
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_cooldown() {
        let cb = breaker();
        for _ in 0..10 {
            cb.record_failure();
        }
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cb.is_open());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cb.is_open());
        assert_eq!(cb.state().state, CircuitState::HalfOpen);

        // A failing probe re-opens immediately
        assert_eq!(cb.record_failure(), BreakerSignal::Opened);
        assert!(cb.is_open());
        assert_eq!(cb.state().consecutive_failures, 0);
        assert_eq!(cb.state().total_opens, 2);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!cb.is_open());
        cb.record_success();
        assert_eq!(cb.state().state, CircuitState::Closed);
    }
}
