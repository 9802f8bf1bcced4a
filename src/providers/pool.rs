//! Pooled ledger handles
//!
//! A fixed number of lazily created clients handed out round-robin. While
//! the circuit breaker is open every `acquire` builds a throwaway client with
//! a short timeout instead, so a struggling endpoint fails fast.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::circuit_breaker::CircuitBreaker;
use crate::models::config::ResilienceConfig;
use crate::models::errors::AppResult;
use crate::providers::ledger::LedgerClient;
use crate::providers::rpc::RpcProvider;

/// Builds ledger clients for the pool
pub trait LedgerConnector: Send + Sync {
    fn connect(&self, timeout: Duration) -> AppResult<Arc<dyn LedgerClient>>;
}

/// Connects to a JSON-RPC endpoint over HTTP
pub struct HttpConnector {
    url: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpConnector {
    pub fn new(url: impl Into<String>, config: &ResilienceConfig) -> Self {
        Self {
            url: url.into(),
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        }
    }
}

impl LedgerConnector for HttpConnector {
    fn connect(&self, timeout: Duration) -> AppResult<Arc<dyn LedgerClient>> {
        let provider = RpcProvider::new(self.url.clone(), timeout)?
            .with_retries(self.max_retries, self.retry_base_delay);
        debug!("🔌 New RPC handle for {} ({}s timeout)", provider.masked_url(), timeout.as_secs());
        Ok(Arc::new(provider))
    }
}

/// Hands out one existing client, used with in-memory ledgers
pub struct SharedConnector {
    client: Arc<dyn LedgerClient>,
}

impl SharedConnector {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self { client }
    }
}

impl LedgerConnector for SharedConnector {
    fn connect(&self, _timeout: Duration) -> AppResult<Arc<dyn LedgerClient>> {
        Ok(self.client.clone())
    }
}

pub struct RpcPool {
    connector: Arc<dyn LedgerConnector>,
    slots: Mutex<Vec<Option<Arc<dyn LedgerClient>>>>,
    next: AtomicUsize,
    breaker: Arc<CircuitBreaker>,
    client_timeout: Duration,
    fallback_timeout: Duration,
    resets: AtomicU64,
}

impl RpcPool {
    pub fn new(
        connector: Arc<dyn LedgerConnector>,
        breaker: Arc<CircuitBreaker>,
        config: &ResilienceConfig,
    ) -> Self {
        let size = config.pool_size.max(1);
        Self {
            connector,
            slots: Mutex::new(vec![None; size]),
            next: AtomicUsize::new(0),
            breaker,
            client_timeout: config.client_timeout,
            fallback_timeout: config.fallback_timeout,
            resets: AtomicU64::new(0),
        }
    }

    /// Next pooled handle, or a disposable fast-fail handle while the
    /// breaker is open
    pub fn acquire(&self) -> AppResult<Arc<dyn LedgerClient>> {
        if self.breaker.is_open() {
            debug!("⚡ Breaker open, using fallback handle");
            return self.connector.connect(self.fallback_timeout);
        }

        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let index = self.next.fetch_add(1, Ordering::Relaxed) % slots.len();
        if let Some(client) = &slots[index] {
            return Ok(client.clone());
        }
        let client = self.connector.connect(self.client_timeout)?;
        slots[index] = Some(client.clone());
        Ok(client)
    }

    /// Drop every pooled handle; the next `acquire` reconnects lazily
    pub fn reset(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let live = slots.iter().filter(|s| s.is_some()).count();
        slots.iter_mut().for_each(|slot| *slot = None);
        self.resets.fetch_add(1, Ordering::Relaxed);
        if live > 0 {
            info!("♻️ RPC pool reset ({} handles dropped)", live);
        }
    }

    pub fn size(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn live_handles(&self) -> usize {
        self.slots
            .lock()
            .map(|s| s.iter().filter(|slot| slot.is_some()).count())
            .unwrap_or(0)
    }

    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockLedger;
    use std::sync::atomic::AtomicUsize;

    struct CountingConnector {
        inner: Arc<dyn LedgerClient>,
        connects: AtomicUsize,
        timeouts: Mutex<Vec<Duration>>,
    }

    impl LedgerConnector for CountingConnector {
        fn connect(&self, timeout: Duration) -> AppResult<Arc<dyn LedgerClient>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.timeouts.lock().unwrap().push(timeout);
            Ok(self.inner.clone())
        }
    }

    fn pool() -> (RpcPool, Arc<CountingConnector>, Arc<CircuitBreaker>) {
        let connector = Arc::new(CountingConnector {
            inner: Arc::new(MockLedger::new()),
            connects: AtomicUsize::new(0),
            timeouts: Mutex::new(Vec::new()),
        });
        let config = ResilienceConfig::default();
        let breaker = Arc::new(CircuitBreaker::from_config(&config));
        let pool = RpcPool::new(connector.clone(), breaker.clone(), &config);
        (pool, connector, breaker)
    }

    #[tokio::test]
    async fn test_lazy_round_robin() {
        let (pool, connector, _) = pool();
        assert_eq!(pool.live_handles(), 0);

        for _ in 0..7 {
            pool.acquire().unwrap();
        }
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
        assert_eq!(pool.live_handles(), 3);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let (pool, connector, _) = pool();
        pool.acquire().unwrap();
        pool.reset();
        pool.reset();
        assert_eq!(pool.live_handles(), 0);
        assert_eq!(pool.reset_count(), 2);

        pool.acquire().unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_uses_fallback_timeout() {
        let (pool, connector, breaker) = pool();
        for _ in 0..10 {
            breaker.record_failure();
        }
        pool.acquire().unwrap();
        pool.acquire().unwrap();

        assert_eq!(pool.live_handles(), 0);
        let timeouts = connector.timeouts.lock().unwrap();
        assert!(timeouts.iter().all(|t| *t == Duration::from_secs(5)));
        assert_eq!(timeouts.len(), 2);
    }
}
