//! Telemetry Module
//!
//! Metrics sink consumed by the RPC substrate and the scanner, plus the
//! default in-process collector.
//!
//! Privacy-first: only counters and latencies, never addresses.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Classified result of one ledger RPC call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcOutcome {
    Success,
    RateLimited,
    Timeout,
    ConnectionError,
    Other,
}

impl RpcOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcOutcome::Success => "success",
            RpcOutcome::RateLimited => "rate_limited",
            RpcOutcome::Timeout => "timeout",
            RpcOutcome::ConnectionError => "connection_error",
            RpcOutcome::Other => "other",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, RpcOutcome::Success)
    }
}

/// Where RPC outcomes and scan results are reported
pub trait MetricsSink: Send + Sync {
    fn record_rpc_outcome(&self, outcome: RpcOutcome);
    fn record_scan(&self, duration_ms: u64, cached: bool, success: bool);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_rpc_outcome(&self, _outcome: RpcOutcome) {}
    fn record_scan(&self, _duration_ms: u64, _cached: bool, _success: bool) {}
}

/// Aggregated statistics for reporting
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryStats {
    pub rpc_success: u64,
    pub rpc_rate_limited: u64,
    pub rpc_timeout: u64,
    pub rpc_connection_error: u64,
    pub rpc_other: u64,
    pub scans_total: u64,
    pub scans_cached: u64,
    pub scans_failed: u64,
    /// Average latency of non-cached scans
    pub avg_scan_latency_ms: f64,
    pub period_start: u64,
    pub period_end: u64,
}

impl TelemetryStats {
    pub fn rpc_total(&self) -> u64 {
        self.rpc_success
            + self.rpc_rate_limited
            + self.rpc_timeout
            + self.rpc_connection_error
            + self.rpc_other
    }

    /// Failure share in percent
    pub fn rpc_error_rate(&self) -> f64 {
        let total = self.rpc_total();
        if total == 0 {
            return 0.0;
        }
        (total - self.rpc_success) as f64 / total as f64 * 100.0
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Main telemetry collector
pub struct TelemetryCollector {
    rpc_success: AtomicU64,
    rpc_rate_limited: AtomicU64,
    rpc_timeout: AtomicU64,
    rpc_connection_error: AtomicU64,
    rpc_other: AtomicU64,
    scans_total: AtomicU64,
    scans_cached: AtomicU64,
    scans_failed: AtomicU64,
    total_latency_ms: AtomicU64,
    session_start: u64,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            rpc_success: AtomicU64::new(0),
            rpc_rate_limited: AtomicU64::new(0),
            rpc_timeout: AtomicU64::new(0),
            rpc_connection_error: AtomicU64::new(0),
            rpc_other: AtomicU64::new(0),
            scans_total: AtomicU64::new(0),
            scans_cached: AtomicU64::new(0),
            scans_failed: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            session_start: current_timestamp(),
        }
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        let scans_total = self.scans_total.load(Ordering::Relaxed);
        let scans_cached = self.scans_cached.load(Ordering::Relaxed);
        let fresh = scans_total.saturating_sub(scans_cached);
        let avg_scan_latency_ms = if fresh > 0 {
            self.total_latency_ms.load(Ordering::Relaxed) as f64 / fresh as f64
        } else {
            0.0
        };

        TelemetryStats {
            rpc_success: self.rpc_success.load(Ordering::Relaxed),
            rpc_rate_limited: self.rpc_rate_limited.load(Ordering::Relaxed),
            rpc_timeout: self.rpc_timeout.load(Ordering::Relaxed),
            rpc_connection_error: self.rpc_connection_error.load(Ordering::Relaxed),
            rpc_other: self.rpc_other.load(Ordering::Relaxed),
            scans_total,
            scans_cached,
            scans_failed: self.scans_failed.load(Ordering::Relaxed),
            avg_scan_latency_ms,
            period_start: self.session_start,
            period_end: current_timestamp(),
        }
    }

    /// Reset counters (keeps session start)
    pub fn reset(&self) {
        for counter in [
            &self.rpc_success,
            &self.rpc_rate_limited,
            &self.rpc_timeout,
            &self.rpc_connection_error,
            &self.rpc_other,
            &self.scans_total,
            &self.scans_cached,
            &self.scans_failed,
            &self.total_latency_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for TelemetryCollector {
    fn record_rpc_outcome(&self, outcome: RpcOutcome) {
        let counter = match outcome {
            RpcOutcome::Success => &self.rpc_success,
            RpcOutcome::RateLimited => &self.rpc_rate_limited,
            RpcOutcome::Timeout => &self.rpc_timeout,
            RpcOutcome::ConnectionError => &self.rpc_connection_error,
            RpcOutcome::Other => &self.rpc_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_scan(&self, duration_ms: u64, cached: bool, success: bool) {
        self.scans_total.fetch_add(1, Ordering::Relaxed);
        if cached {
            self.scans_cached.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_latency_ms.fetch_add(duration_ms, Ordering::Relaxed);
        }
        if !success {
            self.scans_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_basic() {
        let collector = TelemetryCollector::new();
        collector.record_rpc_outcome(RpcOutcome::Success);
        collector.record_rpc_outcome(RpcOutcome::Success);
        collector.record_rpc_outcome(RpcOutcome::Timeout);
        collector.record_rpc_outcome(RpcOutcome::RateLimited);

        collector.record_scan(100, false, true);
        collector.record_scan(300, false, false);
        collector.record_scan(0, true, true);

        let stats = collector.get_stats();
        assert_eq!(stats.rpc_total(), 4);
        assert!((stats.rpc_error_rate() - 50.0).abs() < 1e-9);
        assert_eq!(stats.scans_total, 3);
        assert_eq!(stats.scans_cached, 1);
        assert_eq!(stats.scans_failed, 1);
        assert!((stats.avg_scan_latency_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_stats_json_export() {
        let collector = TelemetryCollector::new();
        collector.record_rpc_outcome(RpcOutcome::ConnectionError);
        let json = collector.get_stats().to_json();
        assert!(json.contains("\"rpcConnectionError\": 1"));

        collector.reset();
        assert_eq!(collector.get_stats().rpc_total(), 0);
    }
}
