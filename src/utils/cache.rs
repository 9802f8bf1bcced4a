//! In-Memory Result Cache
//!
//! Thread-safe TTL cache shared by the scanner (whole reports) and the
//! ledger gateway (signatures, transactions, account lookups).
//!
//! Features:
//! - Per-entry TTL; `ttl = 0` is expired on the next read
//! - Request coalescing: concurrent misses for one key share one fetch
//! - Failures are handed to every waiter but never stored
//! - Oldest-insertion eviction at capacity
//! - Hit/miss counters for monitoring
//!
//! Keys are stored verbatim. Ledger addresses are base58 and case-sensitive.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::errors::AppResult;

/// Default capacity before oldest-insertion eviction kicks in
pub const DEFAULT_CACHE_CAPACITY: usize = 5_000;

type SharedFetch<V> = Shared<BoxFuture<'static, AppResult<V>>>;

/// Cache entry with its expiry and insertion sequence
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
    pub hits: u64,
    /// Insertion sequence, used to skip stale eviction-queue slots
    pub seq: u64,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

struct InFlight<V> {
    generation: u64,
    fetch: SharedFetch<V>,
}

/// Generic TTL cache with coalesced fetches
pub struct ResultCache<V> {
    name: &'static str,
    store: DashMap<String, CacheEntry<V>>,
    in_flight: DashMap<String, InFlight<V>>,
    /// Insertion order as (seq, key); stale slots are compacted past 2x capacity
    order: Mutex<VecDeque<(u64, String)>>,
    capacity: usize,
    next_seq: AtomicU64,
    next_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> ResultCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self::with_capacity(name, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            store: DashMap::new(),
            in_flight: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            next_seq: AtomicU64::new(0),
            next_generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get with TTL validation; expired entries are dropped on read
    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(mut entry) = self.store.get_mut(key) {
            if entry.is_expired() {
                drop(entry);
                self.store.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("📭 [{}] CACHE MISS (expired): {}", self.name, key);
                None
            } else {
                entry.hits += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "✅ [{}] CACHE HIT: {} (TTL: {}s remaining)",
                    self.name,
                    key,
                    entry.remaining_ttl().as_secs()
                );
                Some(entry.value.clone())
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("📭 [{}] CACHE MISS: {}", self.name, key);
            None
        }
    }

    /// Store a value, evicting the oldest insertion when full
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        if !self.store.contains_key(key) && self.store.len() >= self.capacity {
            self.evict_oldest();
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.store.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
                hits: 0,
                seq,
            },
        );
        if let Ok(mut order) = self.order.lock() {
            order.push_back((seq, key.to_string()));
            if order.len() > self.capacity.saturating_mul(2) {
                self.compact(&mut order);
            }
        }
        debug!("💾 [{}] CACHE SET: {} (TTL: {}s)", self.name, key, ttl.as_secs());
    }

    fn evict_oldest(&self) {
        let Ok(mut order) = self.order.lock() else {
            return;
        };
        while let Some((seq, key)) = order.pop_front() {
            let removed = self.store.remove_if(&key, |_, entry| entry.seq == seq);
            if removed.is_some() {
                debug!("♻️ [{}] CACHE EVICT: {}", self.name, key);
                return;
            }
        }
    }

    /// Drop queue slots whose entry expired, was replaced or was removed
    fn compact(&self, order: &mut VecDeque<(u64, String)>) {
        order.retain(|(seq, key)| {
            self.store
                .get(key)
                .is_some_and(|entry| entry.seq == *seq)
        });
    }

    fn compact_order(&self) {
        if let Ok(mut order) = self.order.lock() {
            self.compact(&mut order);
        }
    }

    /// Fetch through the cache.
    ///
    /// Concurrent callers for the same missing key await one shared upstream
    /// future. A successful value is stored with `ttl`; an error is returned
    /// to every waiter and nothing is stored.
    pub async fn with_cache<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> AppResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<V>> + Send + 'static,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let (generation, shared) = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(slot) => {
                debug!("🔗 [{}] COALESCED: {}", self.name, key);
                (slot.get().generation, slot.get().fetch.clone())
            }
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let fetch = fetch().boxed().shared();
                slot.insert(InFlight {
                    generation,
                    fetch: fetch.clone(),
                });
                (generation, fetch)
            }
        };

        let result = shared.await;

        // Store before releasing the slot so a late caller sees the value
        if let Ok(value) = &result {
            if self
                .in_flight
                .get(key)
                .is_some_and(|slot| slot.generation == generation)
            {
                self.set(key, value.clone(), ttl);
            }
        }
        self.in_flight
            .remove_if(key, |_, slot| slot.generation == generation);

        result
    }

    pub fn invalidate(&self, key: &str) {
        self.store.remove(key);
        self.compact_order();
        debug!("🗑️ [{}] CACHE INVALIDATE: {}", self.name, key);
    }

    /// Remove all expired entries, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.store.len());
        self.compact_order();
        if removed > 0 {
            info!("🧹 [{}] CACHE CLEANUP: {} expired entries removed", self.name, removed);
        }
        removed
    }

    pub fn clear(&self) {
        self.store.clear();
        if let Ok(mut order) = self.order.lock() {
            order.clear();
        }
        info!("🗑️ [{}] CACHE CLEARED", self.name);
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            name: self.name,
            entries: self.store.len(),
            in_flight: self.in_flight.len(),
            capacity: self.capacity,
            hits,
            misses,
            hit_rate,
        }
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub name: &'static str,
    pub entries: usize,
    pub in_flight: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}
