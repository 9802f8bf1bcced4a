//! JSON-RPC ledger client
//!
//! Default `LedgerClient` over HTTP:
//! 1. Gzip compression and a fixed User-Agent on every request
//! 2. Per-client timeout (pooled clients and fallback clients differ)
//! 3. Bounded exponential backoff with ±20% jitter, retryable codes only
//! 4. HTTP 429 and rate-limit JSON-RPC codes map to `RPC_RATE_LIMITED`
//! 5. API keys never reach the logs (`masked_url`)

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::errors::{AppError, AppResult};
use crate::providers::ledger::{
    LedgerClient, ParsedAccountInfo, ParsedTransaction, SignatureInfo, SignatureQuery,
    TokenLargestAccount,
};
use crate::utils::constants::{RPC_RATE_LIMIT_CODES, USER_AGENT as USER_AGENT_CONST};

/// Jitter percentage for retry delay
pub const RETRY_JITTER_PERCENT: u64 = 20;

/// Node-side cap for one signature page
pub const MAX_SIGNATURE_PAGE: usize = 1_000;

/// JSON-RPC response envelope. `result` stays raw so a `null` result can
/// deserialize into `Option<T>`.
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn is_rate_limit(&self) -> bool {
        RPC_RATE_LIMIT_CODES.contains(&self.code)
            || self.message.to_lowercase().contains("rate limit")
    }

    pub fn into_app_error(self) -> AppError {
        if self.is_rate_limit() {
            AppError::rpc_rate_limited()
        } else {
            AppError::rpc_error(format!("RPC error: {} (code: {})", self.message, self.code))
        }
    }
}

/// `{ context, value }` wrapper used by several methods
#[derive(Debug, Deserialize)]
struct Contextual<T> {
    value: T,
}

pub struct RpcProvider {
    url: String,
    client: reqwest::Client,
    max_retries: u32,
    base_delay: Duration,
    request_id: AtomicU64,
}

impl RpcProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(AppError::invalid_config("rpc_url", "<empty>"));
        }
        Ok(Self {
            url,
            client: Self::build_client(timeout)?,
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            request_id: AtomicU64::new(1),
        })
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.base_delay = base_delay;
        self
    }

    /// HTTP client with custom headers (gzip enabled)
    fn build_client(timeout: Duration) -> AppResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| AppError::rpc_connection_failed(format!("Failed to build HTTP client: {}", e)))
    }

    /// Execute a JSON-RPC call with bounded retries
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> AppResult<T> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });

        let mut attempt = 0;
        loop {
            match self.execute_call::<T>(&payload).await {
                Ok(result) => return Ok(result),
                Err(e) if e.code.is_retryable() && attempt + 1 < self.max_retries => {
                    attempt += 1;
                    let delay = backoff_delay(self.base_delay, attempt);
                    warn!(
                        "⏳ {} failed ({}), retry {}/{} in {}ms",
                        method,
                        e.code_str(),
                        attempt + 1,
                        self.max_retries,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Execute single RPC call
    async fn execute_call<T: DeserializeOwned>(&self, payload: &Value) -> AppResult<T> {
        let response = self.client.post(&self.url).json(payload).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::rpc_rate_limited());
        }
        if !status.is_success() {
            return Err(AppError::rpc_error(format!("HTTP error: {}", status)));
        }

        let body: RpcResponse = response.json().await?;
        decode_response(body)
    }

    /// RPC URL with any API key masked
    pub fn masked_url(&self) -> String {
        mask_url(&self.url)
    }
}

fn decode_response<T: DeserializeOwned>(body: RpcResponse) -> AppResult<T> {
    if let Some(error) = body.error {
        return Err(error.into_app_error());
    }
    serde_json::from_value(body.result)
        .map_err(|e| AppError::invalid_response(format!("Unexpected result shape: {}", e)))
}

/// Exponential backoff with ±20% jitter
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64 * 2_u64.pow(attempt.saturating_sub(1).min(10));
    let jitter_range = (base_ms * RETRY_JITTER_PERCENT) / 100;
    let jitter: i64 = if jitter_range > 0 {
        rand::thread_rng().gen_range(-(jitter_range as i64)..=(jitter_range as i64))
    } else {
        0
    };
    Duration::from_millis((base_ms as i64 + jitter).max(0) as u64)
}

pub fn mask_url(url: &str) -> String {
    match url.split_once("/v2/") {
        Some((host, _)) => format!("{}/v2/***HIDDEN***", host),
        None => match url.split_once("api-key=") {
            Some((head, _)) => format!("{}api-key=***HIDDEN***", head),
            None => url.to_string(),
        },
    }
}

#[async_trait]
impl LedgerClient for RpcProvider {
    async fn get_balance(&self, address: &str) -> AppResult<u64> {
        let ctx: Contextual<u64> = self
            .call("getBalance", json!([address, { "commitment": "confirmed" }]))
            .await?;
        Ok(ctx.value)
    }

    async fn get_signatures_for_address(
        &self,
        address: &str,
        query: &SignatureQuery,
    ) -> AppResult<Vec<SignatureInfo>> {
        let mut options = json!({
            "limit": query.limit.clamp(1, MAX_SIGNATURE_PAGE),
            "commitment": "confirmed",
        });
        if let Some(before) = &query.before {
            options["before"] = json!(before);
        }
        if let Some(until) = &query.until {
            options["until"] = json!(until);
        }
        debug!("📜 getSignaturesForAddress {} limit={}", address, query.limit);
        self.call("getSignaturesForAddress", json!([address, options]))
            .await
    }

    async fn get_parsed_transaction(
        &self,
        signature: &str,
    ) -> AppResult<Option<ParsedTransaction>> {
        self.call(
            "getTransaction",
            json!([signature, {
                "encoding": "jsonParsed",
                "maxSupportedTransactionVersion": 0,
                "commitment": "confirmed",
            }]),
        )
        .await
    }

    async fn get_parsed_account_info(
        &self,
        address: &str,
    ) -> AppResult<Option<ParsedAccountInfo>> {
        let ctx: Contextual<Option<ParsedAccountInfo>> = self
            .call(
                "getAccountInfo",
                json!([address, { "encoding": "jsonParsed", "commitment": "confirmed" }]),
            )
            .await?;
        Ok(ctx.value)
    }

    async fn get_token_largest_accounts(&self, mint: &str) -> AppResult<Vec<TokenLargestAccount>> {
        let ctx: Contextual<Vec<TokenLargestAccount>> = self
            .call("getTokenLargestAccounts", json!([mint]))
            .await?;
        Ok(ctx.value)
    }
}
