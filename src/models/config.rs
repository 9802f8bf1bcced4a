//! Configuration module for the scanner
//!
//! Every heuristic threshold, cap and weight lives here so analyzers stay free
//! of magic numbers. `Default` carries the production values; `from_env`
//! overrides them from the environment.

use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::errors::{AppError, AppResult};
use crate::utils::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_RPC_TIMEOUT_SECS, SOLANA_ALCHEMY_URL_PREFIX,
};

/// Resilience knobs for the ledger-access substrate
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Pooled handles per endpoint
    pub pool_size: usize,
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Consecutive failures that recycle the pool without opening the breaker
    pub pool_reset_threshold: u32,
    /// How long the breaker stays open
    pub cooldown: Duration,
    /// Per-call SafeCall deadline
    pub call_timeout: Duration,
    /// Client timeout for disposable handles used while the breaker is open
    pub fallback_timeout: Duration,
    /// Pooled client timeout
    pub client_timeout: Duration,
    /// Attempts per JSON-RPC request inside RpcProvider
    pub max_retries: u32,
    /// Base backoff between RPC attempts
    pub retry_base_delay: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            failure_threshold: 10,
            pool_reset_threshold: 5,
            cooldown: Duration::from_secs(30),
            call_timeout: Duration::from_secs(20),
            fallback_timeout: Duration::from_secs(5),
            client_timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(250),
        }
    }
}

/// Cache sizing and TTLs
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Whole-report TTL
    pub report_ttl: Duration,
    /// Transactions are immutable, keep them longer
    pub transaction_ttl: Duration,
    pub signature_ttl: Duration,
    pub account_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 5_000,
            report_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            transaction_ttl: Duration::from_secs(600),
            signature_ttl: Duration::from_secs(60),
            account_ttl: Duration::from_secs(120),
        }
    }
}

/// Caps that bound how much history one scan walks
#[derive(Debug, Clone)]
pub struct ScanLimits {
    pub scan_deadline: Duration,
    pub recent_signature_limit: usize,
    pub fetch_concurrency: usize,
    pub max_analyzed_tokens: usize,
    pub funding_max_hops: usize,
    pub signature_page_size: usize,
    pub signature_hard_cap: usize,
    pub max_connected_wallets: usize,
    pub connection_concurrency: usize,
    pub prescan_attempts: u32,
    pub prescan_base_delay: Duration,
    pub prescan_failure_limit: u32,
    pub prescan_skip_window: Duration,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            scan_deadline: Duration::from_secs(60),
            recent_signature_limit: 50,
            fetch_concurrency: 5,
            max_analyzed_tokens: 10,
            funding_max_hops: 3,
            signature_page_size: 1_000,
            signature_hard_cap: 3_000,
            max_connected_wallets: 15,
            connection_concurrency: 3,
            prescan_attempts: 3,
            prescan_base_delay: Duration::from_secs(2),
            prescan_failure_limit: 3,
            prescan_skip_window: Duration::from_secs(3_600),
        }
    }
}

/// Heuristic thresholds and score weights
#[derive(Debug, Clone)]
pub struct HeuristicWeights {
    // Token analysis
    pub top_holder_threshold_pct: f64,
    pub deployer_holding_threshold_pct: f64,

    // Funding chain
    pub young_funder_days: f64,
    pub prolific_funder_tokens: usize,

    // Connected wallets
    pub min_interactions: u32,
    pub min_volume: f64,
    pub negligible_movement: f64,
    pub serial_deployer_tokens: usize,
    pub multi_deployer_tokens: usize,
    pub wash_trading_interactions: u32,
    pub lp_rugger_weight: u32,
    pub honeypot_creator_weight: u32,
    pub rug_deployment_weight: u32,
    pub lp_removal_role_weight: u32,
    pub dump_role_weight: u32,
    pub serial_deployer_weight: u32,
    pub multi_deployer_weight: u32,
    pub blacklisted_weight: u32,
    pub malicious_weight: u32,
    pub one_way_flow_weight: u32,
    pub wash_trading_weight: u32,

    // Liquidity / activity
    pub dump_fraction: f64,
    pub suspicious_timing_secs: i64,
    pub rapid_fire_secs: i64,

    // Report aggregation
    pub report_blacklist_weight: u32,
    pub report_malicious_weight: u32,
    pub report_serial_deployer_tokens: usize,
    pub report_multi_deployer_tokens: usize,
    pub report_serial_deployer_weight: u32,
    pub report_multi_deployer_weight: u32,
    pub report_rugpull_weight: u32,
    pub report_rugpull_cap: u32,
    pub report_funding_critical_weight: u32,
    pub report_funding_high_weight: u32,
    pub report_funding_medium_weight: u32,
    pub report_lp_rug_weight: u32,
    pub report_wash_trading_weight: u32,
    pub report_suspicious_timing_weight: u32,
    pub report_suspicious_timing_min: usize,
    pub report_rapid_fire_weight: u32,
    pub report_rapid_fire_min: usize,
    pub report_risky_connection_weight: u32,
    pub report_risky_connection_cap: u32,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            top_holder_threshold_pct: 50.0,
            deployer_holding_threshold_pct: 20.0,

            young_funder_days: 7.0,
            prolific_funder_tokens: 5,

            min_interactions: 2,
            min_volume: 0.5,
            negligible_movement: 0.001,
            serial_deployer_tokens: 10,
            multi_deployer_tokens: 3,
            wash_trading_interactions: 10,
            lp_rugger_weight: 70,
            honeypot_creator_weight: 70,
            rug_deployment_weight: 40,
            lp_removal_role_weight: 50,
            dump_role_weight: 30,
            serial_deployer_weight: 60,
            multi_deployer_weight: 35,
            blacklisted_weight: 50,
            malicious_weight: 45,
            one_way_flow_weight: 20,
            wash_trading_weight: 25,

            dump_fraction: 0.5,
            suspicious_timing_secs: 1,
            rapid_fire_secs: 10,

            report_blacklist_weight: 50,
            report_malicious_weight: 40,
            report_serial_deployer_tokens: 10,
            report_multi_deployer_tokens: 3,
            report_serial_deployer_weight: 30,
            report_multi_deployer_weight: 15,
            report_rugpull_weight: 10,
            report_rugpull_cap: 40,
            report_funding_critical_weight: 25,
            report_funding_high_weight: 15,
            report_funding_medium_weight: 5,
            report_lp_rug_weight: 35,
            report_wash_trading_weight: 15,
            report_suspicious_timing_weight: 10,
            report_suspicious_timing_min: 5,
            report_rapid_fire_weight: 5,
            report_rapid_fire_min: 10,
            report_risky_connection_weight: 10,
            report_risky_connection_cap: 30,
        }
    }
}

/// Top-level scanner configuration
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Ledger JSON-RPC endpoint
    pub rpc_url: String,
    pub resilience: ResilienceConfig,
    pub cache: CacheConfig,
    pub limits: ScanLimits,
    pub weights: HeuristicWeights,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            resilience: ResilienceConfig::default(),
            cache: CacheConfig::default(),
            limits: ScanLimits::default(),
            weights: HeuristicWeights::default(),
        }
    }
}

impl ScannerConfig {
    /// Build configuration from environment variables.
    ///
    /// `SOLANA_RPC_URL` wins; otherwise the Alchemy endpoint is derived from
    /// `ALCHEMY_API_KEY`. The key itself is never logged.
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        config.rpc_url = match std::env::var("SOLANA_RPC_URL") {
            Ok(url) if !url.is_empty() => url,
            _ => match Self::get_alchemy_key() {
                Some(key) => format!("{}{}", SOLANA_ALCHEMY_URL_PREFIX, key),
                None => {
                    warn!("⚠️ Neither SOLANA_RPC_URL nor ALCHEMY_API_KEY set, using public endpoint");
                    config.rpc_url
                }
            },
        };

        let r = &mut config.resilience;
        r.pool_size = env_parse("RUG_SENTRY_POOL_SIZE", r.pool_size)?;
        r.failure_threshold = env_parse("RUG_SENTRY_FAILURE_THRESHOLD", r.failure_threshold)?;
        r.pool_reset_threshold = env_parse("RUG_SENTRY_POOL_RESET_THRESHOLD", r.pool_reset_threshold)?;
        r.cooldown = env_secs("RUG_SENTRY_COOLDOWN_SECS", r.cooldown)?;
        r.call_timeout = env_millis("RUG_SENTRY_CALL_TIMEOUT_MS", r.call_timeout)?;

        let c = &mut config.cache;
        c.max_entries = env_parse("RUG_SENTRY_CACHE_MAX_ENTRIES", c.max_entries)?;
        c.report_ttl = env_secs("RUG_SENTRY_REPORT_TTL_SECS", c.report_ttl)?;

        let l = &mut config.limits;
        l.scan_deadline = env_secs("RUG_SENTRY_SCAN_DEADLINE_SECS", l.scan_deadline)?;
        l.funding_max_hops = env_parse("RUG_SENTRY_FUNDING_MAX_HOPS", l.funding_max_hops)?;

        if config.resilience.pool_size == 0 {
            return Err(AppError::invalid_config("RUG_SENTRY_POOL_SIZE", "0"));
        }

        info!(
            "⚙️ Scanner config: pool={} breaker={}/{} deadline={}s",
            config.resilience.pool_size,
            config.resilience.pool_reset_threshold,
            config.resilience.failure_threshold,
            config.limits.scan_deadline.as_secs()
        );

        Ok(config)
    }

    /// Get Alchemy API key from environment
    fn get_alchemy_key() -> Option<String> {
        std::env::var("ALCHEMY_API_KEY")
            .ok()
            .filter(|k| !k.is_empty() && k != "YOUR_API_KEY")
            .inspect(|_| info!("🔑 ALCHEMY_API_KEY configured (key hidden)"))
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::invalid_config(key, &raw)),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> AppResult<Duration> {
    env_parse(key, default.as_secs()).map(Duration::from_secs)
}

fn env_millis(key: &str, default: Duration) -> AppResult<Duration> {
    env_parse(key, default.as_millis() as u64).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ScannerConfig::default();
        assert_eq!(config.resilience.pool_size, 3);
        assert_eq!(config.resilience.failure_threshold, 10);
        assert_eq!(config.resilience.pool_reset_threshold, 5);
        assert_eq!(config.resilience.cooldown, Duration::from_secs(30));
        assert_eq!(config.resilience.call_timeout, Duration::from_secs(20));
        assert_eq!(config.cache.max_entries, 5_000);
        assert_eq!(config.limits.scan_deadline, Duration::from_secs(60));
        assert_eq!(config.limits.signature_hard_cap, 3_000);
        assert_eq!(config.limits.max_connected_wallets, 15);
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("RUG_SENTRY_TEST_GARBAGE", "abc");
        let parsed: AppResult<usize> = env_parse("RUG_SENTRY_TEST_GARBAGE", 3);
        assert!(parsed.is_err());
        std::env::remove_var("RUG_SENTRY_TEST_GARBAGE");

        let fallback: AppResult<usize> = env_parse("RUG_SENTRY_TEST_MISSING", 7);
        assert_eq!(fallback.unwrap(), 7);
    }
}
