//! Guarded ledger calls
//!
//! Every RPC the analyzers issue goes through `SafeCaller`: a pooled handle,
//! a deadline, outcome classification, breaker bookkeeping and metrics.
//! `call` swallows failures into a default value; `try_call` hands the
//! classified error back so cache-backed paths can decline to store it.
//! Calls made on behalf of an abandoned scan are refused before they reach
//! the pool and are not counted.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::circuit_breaker::{BreakerSignal, CircuitBreaker};
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::providers::ledger::LedgerClient;
use crate::providers::pool::RpcPool;
use crate::utils::scan_mutex::scan_cancelled;
use crate::utils::telemetry::{MetricsSink, RpcOutcome};

pub struct SafeCaller {
    pool: Arc<RpcPool>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<dyn MetricsSink>,
    default_timeout: Duration,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Running totals of guarded calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub succeeded: u64,
    pub failed: u64,
}

impl CallCounts {
    /// Calls made since `earlier`
    pub fn since(&self, earlier: CallCounts) -> CallCounts {
        CallCounts {
            succeeded: self.succeeded.saturating_sub(earlier.succeeded),
            failed: self.failed.saturating_sub(earlier.failed),
        }
    }

    /// At least one call was made and none of them worked
    pub fn all_failed(&self) -> bool {
        self.failed > 0 && self.succeeded == 0
    }
}

impl SafeCaller {
    pub fn new(
        pool: Arc<RpcPool>,
        metrics: Arc<dyn MetricsSink>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            breaker: pool.breaker().clone(),
            pool,
            metrics,
            default_timeout,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn counts(&self) -> CallCounts {
        CallCounts {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn pool(&self) -> &Arc<RpcPool> {
        &self.pool
    }

    /// Run `f` with the default deadline, returning `default` on any failure
    pub async fn call<T, F, Fut>(&self, label: &str, default: T, f: F) -> T
    where
        F: FnOnce(Arc<dyn LedgerClient>) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        self.call_with_timeout(label, default, self.default_timeout, f)
            .await
    }

    pub async fn call_with_timeout<T, F, Fut>(
        &self,
        label: &str,
        default: T,
        timeout: Duration,
        f: F,
    ) -> T
    where
        F: FnOnce(Arc<dyn LedgerClient>) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        self.try_call(label, timeout, f).await.unwrap_or(default)
    }

    /// Run `f` against a pooled handle, recording the classified outcome
    pub async fn try_call<T, F, Fut>(&self, label: &str, timeout: Duration, f: F) -> AppResult<T>
    where
        F: FnOnce(Arc<dyn LedgerClient>) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if scan_cancelled() {
            debug!("🚫 {} not issued, scan abandoned", label);
            return Err(AppError::scan_cancelled(label));
        }

        let client = match self.pool.acquire() {
            Ok(client) => client,
            Err(e) => {
                self.record_failure(label, &e);
                return Err(e);
            }
        };

        let result = match tokio::time::timeout(timeout, f(client)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::rpc_timeout(format!(
                "{} exceeded {}ms",
                label,
                timeout.as_millis()
            ))),
        };

        match &result {
            Ok(_) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                self.breaker.record_success();
                self.metrics.record_rpc_outcome(RpcOutcome::Success);
            }
            Err(e) => self.record_failure(label, e),
        }
        result
    }

    fn record_failure(&self, label: &str, err: &AppError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        let outcome = classify(err);
        self.metrics.record_rpc_outcome(outcome);
        match outcome {
            RpcOutcome::RateLimited => warn!("⏳ {} rate limited", label),
            _ => debug!("❌ {} failed ({}): {}", label, outcome.as_str(), err),
        }
        if self.breaker.record_failure() == BreakerSignal::ResetPool {
            self.pool.reset();
        }
    }
}

/// Classify a failed call, error code first, then message text
pub fn classify(err: &AppError) -> RpcOutcome {
    match err.code {
        ErrorCode::RpcRateLimited => RpcOutcome::RateLimited,
        ErrorCode::RpcTimeout | ErrorCode::ScanTimeout => RpcOutcome::Timeout,
        ErrorCode::RpcConnectionFailed => RpcOutcome::ConnectionError,
        _ => classify_message(&err.message),
    }
}

pub fn classify_message(message: &str) -> RpcOutcome {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    {
        RpcOutcome::RateLimited
    } else if lower.contains("timed out") || lower.contains("timeout") {
        RpcOutcome::Timeout
    } else if lower.contains("connection") || lower.contains("econnreset") || lower.contains("socket")
    {
        RpcOutcome::ConnectionError
    } else {
        RpcOutcome::Other
    }
}
