//! Ledger gateway
//!
//! The single door analyzers use to read the ledger. Every primitive runs
//! through `SafeCaller`; immutable or hot lookups are memoized in dedicated
//! `ResultCache`s with per-kind TTLs. Failed fetches are never cached.

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::debug;

use crate::core::safe_call::{CallCounts, SafeCaller};
use crate::models::config::{CacheConfig, ScanLimits};
use crate::models::errors::AppResult;
use crate::providers::ledger::{
    ParsedAccountInfo, ParsedTransaction, SignatureInfo, SignatureQuery, TokenLargestAccount,
};
use crate::utils::cache::{CacheStats, ResultCache};
use crate::utils::constants::SECS_PER_DAY;

struct GatewayInner {
    caller: SafeCaller,
    signatures: ResultCache<Arc<Vec<SignatureInfo>>>,
    transactions: ResultCache<Option<Arc<ParsedTransaction>>>,
    accounts: ResultCache<Option<Arc<ParsedAccountInfo>>>,
    oldest: ResultCache<Option<SignatureInfo>>,
    cache: CacheConfig,
    limits: ScanLimits,
}

#[derive(Clone)]
pub struct LedgerGateway {
    inner: Arc<GatewayInner>,
}

impl LedgerGateway {
    pub fn new(caller: SafeCaller, cache: CacheConfig, limits: ScanLimits) -> Self {
        let capacity = cache.max_entries;
        Self {
            inner: Arc::new(GatewayInner {
                caller,
                signatures: ResultCache::with_capacity("signatures", capacity),
                transactions: ResultCache::with_capacity("transactions", capacity),
                accounts: ResultCache::with_capacity("accounts", capacity),
                oldest: ResultCache::with_capacity("oldest-signature", capacity),
                cache,
                limits,
            }),
        }
    }

    pub fn caller(&self) -> &SafeCaller {
        &self.inner.caller
    }

    pub fn limits(&self) -> &ScanLimits {
        &self.inner.limits
    }

    pub fn call_counts(&self) -> CallCounts {
        self.inner.caller.counts()
    }

    /// Newest-first history, empty on failure
    pub async fn signatures(&self, address: &str, limit: usize) -> Vec<SignatureInfo> {
        let key = format!("{}:{}", address, limit);
        let gateway = self.clone();
        let owned = address.to_string();
        self.inner
            .signatures
            .with_cache(&key, self.inner.cache.signature_ttl, move || async move {
                gateway
                    .signatures_page(&owned, limit, None)
                    .await
                    .map(Arc::new)
            })
            .await
            .map(|sigs| sigs.as_ref().clone())
            .unwrap_or_default()
    }

    /// One uncached page, errors surfaced for pagination loops
    pub async fn signatures_page(
        &self,
        address: &str,
        limit: usize,
        before: Option<String>,
    ) -> AppResult<Vec<SignatureInfo>> {
        let caller = &self.inner.caller;
        let query = SignatureQuery::before(limit, before);
        caller
            .try_call("getSignaturesForAddress", caller.default_timeout(), |c| async move {
                c.get_signatures_for_address(address, &query).await
            })
            .await
    }

    /// Parsed transaction, `None` when unknown or the fetch failed
    pub async fn transaction(&self, signature: &str) -> Option<Arc<ParsedTransaction>> {
        let gateway = self.clone();
        let owned = signature.to_string();
        self.inner
            .transactions
            .with_cache(signature, self.inner.cache.transaction_ttl, move || async move {
                let caller = &gateway.inner.caller;
                caller
                    .try_call("getTransaction", caller.default_timeout(), |c| async move {
                        c.get_parsed_transaction(&owned).await
                    })
                    .await
                    .map(|tx| tx.map(Arc::new))
            })
            .await
            .ok()
            .flatten()
    }

    /// Fetch many transactions with bounded concurrency, preserving order
    pub async fn transactions(&self, signatures: &[SignatureInfo]) -> Vec<Arc<ParsedTransaction>> {
        let wanted: Vec<String> = signatures.iter().map(|s| s.signature.clone()).collect();
        stream::iter(wanted)
            .map(|sig| {
                let gateway = self.clone();
                async move { gateway.transaction(&sig).await }
            })
            .buffered(self.inner.limits.fetch_concurrency.max(1))
            .filter_map(|tx| async move { tx })
            .collect()
            .await
    }

    /// Up to `limit` most recent transactions of `address`
    pub async fn recent_transactions(
        &self,
        address: &str,
        limit: usize,
    ) -> Vec<Arc<ParsedTransaction>> {
        let signatures = self.signatures(address, limit).await;
        self.transactions(&signatures).await
    }

    pub async fn account_info(&self, address: &str) -> Option<Arc<ParsedAccountInfo>> {
        let gateway = self.clone();
        let owned = address.to_string();
        self.inner
            .accounts
            .with_cache(address, self.inner.cache.account_ttl, move || async move {
                let caller = &gateway.inner.caller;
                caller
                    .try_call("getAccountInfo", caller.default_timeout(), |c| async move {
                        c.get_parsed_account_info(&owned).await
                    })
                    .await
                    .map(|info| info.map(Arc::new))
            })
            .await
            .ok()
            .flatten()
    }

    pub async fn largest_accounts(&self, mint: &str) -> Vec<TokenLargestAccount> {
        self.inner
            .caller
            .call("getTokenLargestAccounts", Vec::new(), |c| async move {
                c.get_token_largest_accounts(mint).await
            })
            .await
    }

    /// Native balance in lamports, 0 on failure
    pub async fn balance(&self, address: &str) -> u64 {
        self.inner
            .caller
            .call("getBalance", 0, |c| async move { c.get_balance(address).await })
            .await
    }

    /// Oldest signature reachable within the pagination cap
    pub async fn oldest_signature(&self, address: &str) -> Option<SignatureInfo> {
        let gateway = self.clone();
        let owned = address.to_string();
        self.inner
            .oldest
            .with_cache(address, self.inner.cache.signature_ttl, move || async move {
                gateway.walk_to_oldest(&owned).await
            })
            .await
            .ok()
            .flatten()
    }

    async fn walk_to_oldest(&self, address: &str) -> AppResult<Option<SignatureInfo>> {
        let page_size = self.inner.limits.signature_page_size.max(1);
        let hard_cap = self.inner.limits.signature_hard_cap;
        let mut before: Option<String> = None;
        let mut oldest: Option<SignatureInfo> = None;
        let mut seen = 0usize;

        while seen < hard_cap {
            let limit = page_size.min(hard_cap - seen);
            let page = self.signatures_page(address, limit, before.clone()).await?;
            let page_len = page.len();
            seen += page_len;
            if let Some(last) = page.into_iter().last() {
                before = Some(last.signature.clone());
                oldest = Some(last);
            }
            if page_len < limit {
                break;
            }
        }
        debug!("🕰️ Oldest signature for {} after {} entries", address, seen);
        Ok(oldest)
    }

    /// Days since the oldest reachable transaction
    pub async fn account_age_days(&self, address: &str) -> Option<f64> {
        let block_time = self.oldest_signature(address).await?.block_time?;
        Some(age_days(block_time))
    }

    pub fn cache_stats(&self) -> Vec<CacheStats> {
        vec![
            self.inner.signatures.stats(),
            self.inner.transactions.stats(),
            self.inner.accounts.stats(),
            self.inner.oldest.stats(),
        ]
    }
}

pub fn age_days(block_time: i64) -> f64 {
    ((Utc::now().timestamp() - block_time).max(0)) as f64 / SECS_PER_DAY
}
