//! Per-address memory of failed background pre-scans.
//!
//! After `limit` consecutive failures an address is skipped for `window`.
//! A success, an expired window or an explicit clear forgets the address.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    count: u32,
    last_failure: Instant,
}

pub struct FailureTracker {
    records: DashMap<String, FailureRecord>,
    limit: u32,
    window: Duration,
}

impl FailureTracker {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            records: DashMap::new(),
            limit,
            window,
        }
    }

    /// Record one failed pre-scan, returns the new consecutive count
    pub fn record_failure(&self, address: &str) -> u32 {
        let now = Instant::now();
        let mut record = self
            .records
            .entry(address.to_string())
            .or_insert(FailureRecord {
                count: 0,
                last_failure: now,
            });
        if now.duration_since(record.last_failure) >= self.window {
            record.count = 0;
        }
        record.count += 1;
        record.last_failure = now;

        if record.count >= self.limit {
            warn!(
                "🚫 Pre-scan for {} failed {} times, skipping for {}s",
                address,
                record.count,
                self.window.as_secs()
            );
        }
        record.count
    }

    pub fn record_success(&self, address: &str) {
        self.records.remove(address);
    }

    /// True while the address is inside its skip window
    pub fn should_skip(&self, address: &str) -> bool {
        let expired = match self.records.get(address) {
            None => return false,
            Some(record) if record.count < self.limit => return false,
            Some(record) => record.last_failure.elapsed() >= self.window,
        };
        if expired {
            self.records.remove(address);
            debug!("🔓 Skip window over for {}", address);
            return false;
        }
        true
    }

    pub fn failures(&self, address: &str) -> u32 {
        self.records.get(address).map(|r| r.count).unwrap_or(0)
    }

    pub fn clear(&self, address: &str) {
        if self.records.remove(address).is_some() {
            debug!("🧽 Failure tracking cleared for {}", address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_skip_after_limit_then_window_expires() {
        let tracker = FailureTracker::new(3, Duration::from_secs(3_600));

        tracker.record_failure("addr");
        tracker.record_failure("addr");
        assert!(!tracker.should_skip("addr"));
        tracker.record_failure("addr");
        assert!(tracker.should_skip("addr"));

        tokio::time::advance(Duration::from_secs(3_601)).await;
        assert!(!tracker.should_skip("addr"));
        assert_eq!(tracker.failures("addr"), 0);
    }

    #[tokio::test]
    async fn test_success_and_clear_reset() {
        let tracker = FailureTracker::new(1, Duration::from_secs(60));
        tracker.record_failure("a");
        assert!(tracker.should_skip("a"));
        tracker.clear("a");
        assert!(!tracker.should_skip("a"));

        tracker.record_failure("b");
        tracker.record_success("b");
        assert_eq!(tracker.failures("b"), 0);
    }
}
