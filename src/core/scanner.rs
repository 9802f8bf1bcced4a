//! Risk scanner
//!
//! Orchestrates one scan: report cache, the global scan gate, parallel
//! phase 1 (blocklist, deployer, activity), sequential phase 2 for deep
//! scans (liquidity, funding, connections), merge and scoring.
//! `scan` never fails: any error ends in a blocklist-only fallback report.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::activity::ActivityAnalyzer;
use crate::core::circuit_breaker::{CircuitBreaker, CircuitBreakerState};
use crate::core::connections::ConnectedWalletAnalyzer;
use crate::core::deployer::DeployerAnalyzer;
use crate::core::funding::FundingChainTracer;
use crate::core::gateway::LedgerGateway;
use crate::core::liquidity::LiquidityRugDetector;
use crate::core::risk_score::RiskAggregator;
use crate::core::safe_call::SafeCaller;
use crate::models::config::ScannerConfig;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{
    BlacklistCheck, ConnectedWallet, DeployerCheck, FundingTrace, LiquidityRugCheck,
    PatternSeverity, RiskLevel, RugType, SecurityReport, SuspiciousPattern,
    WalletActivityAnalysis,
};
use crate::providers::blocklist::Blocklist;
use crate::providers::ledger::LedgerClient;
use crate::providers::pool::{HttpConnector, LedgerConnector, RpcPool, SharedConnector};
use crate::utils::cache::{CacheStats, ResultCache};
use crate::utils::failure_tracker::FailureTracker;
use crate::utils::scan_mutex::ScanMutex;
use crate::utils::telemetry::MetricsSink;

struct ScannerInner {
    gateway: LedgerGateway,
    deployer: DeployerAnalyzer,
    activity: ActivityAnalyzer,
    liquidity: LiquidityRugDetector,
    funding: FundingChainTracer,
    connections: ConnectedWalletAnalyzer,
    aggregator: RiskAggregator,
    blocklist: Arc<dyn Blocklist>,
    metrics: Arc<dyn MetricsSink>,
    reports: ResultCache<SecurityReport>,
    gate: ScanMutex,
    failures: FailureTracker,
    config: ScannerConfig,
}

/// Scanner health snapshot
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerStats {
    pub breaker: CircuitBreakerState,
    pub pool_resets: u64,
    pub queued_scans: usize,
    pub scan_in_progress: bool,
    pub caches: Vec<CacheStats>,
}

#[derive(Clone)]
pub struct RiskScanner {
    inner: Arc<ScannerInner>,
}

fn report_key(address: &str, deep: bool) -> String {
    format!("{}:{}", if deep { "deep" } else { "quick" }, address)
}

impl RiskScanner {
    /// Scanner over an existing ledger client (in-memory ledgers, tests)
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        blocklist: Arc<dyn Blocklist>,
        metrics: Arc<dyn MetricsSink>,
        config: ScannerConfig,
    ) -> Self {
        Self::with_connector(Arc::new(SharedConnector::new(ledger)), blocklist, metrics, config)
    }

    /// Scanner over the configured JSON-RPC endpoint
    pub fn from_config(
        config: ScannerConfig,
        blocklist: Arc<dyn Blocklist>,
        metrics: Arc<dyn MetricsSink>,
    ) -> AppResult<Self> {
        if config.rpc_url.trim().is_empty() {
            return Err(AppError::invalid_config("rpc_url", ""));
        }
        let connector = HttpConnector::new(config.rpc_url.clone(), &config.resilience);
        Ok(Self::with_connector(Arc::new(connector), blocklist, metrics, config))
    }

    pub fn with_connector(
        connector: Arc<dyn LedgerConnector>,
        blocklist: Arc<dyn Blocklist>,
        metrics: Arc<dyn MetricsSink>,
        config: ScannerConfig,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::from_config(&config.resilience));
        let pool = Arc::new(RpcPool::new(connector, breaker, &config.resilience));
        let caller = SafeCaller::new(pool, metrics.clone(), config.resilience.call_timeout);
        let gateway = LedgerGateway::new(caller, config.cache.clone(), config.limits.clone());

        let limits = &config.limits;
        let weights = &config.weights;
        let deployer = DeployerAnalyzer::new(gateway.clone(), limits.clone(), weights.clone());
        let activity = ActivityAnalyzer::new(gateway.clone(), limits.clone(), weights.clone());
        let liquidity = LiquidityRugDetector::new(gateway.clone(), limits.clone(), weights.clone());
        let funding = FundingChainTracer::new(gateway.clone(), deployer.clone(), weights.clone());
        let connections = ConnectedWalletAnalyzer::new(
            gateway.clone(),
            deployer.clone(),
            blocklist.clone(),
            limits.clone(),
            weights.clone(),
        );

        info!(
            "🛡️ Risk scanner ready (pool {}, deadline {}s)",
            config.resilience.pool_size,
            limits.scan_deadline.as_secs()
        );

        Self {
            inner: Arc::new(ScannerInner {
                gateway,
                deployer,
                activity,
                liquidity,
                funding,
                connections,
                aggregator: RiskAggregator::new(weights.clone()),
                blocklist,
                metrics,
                reports: ResultCache::with_capacity("reports", config.cache.max_entries),
                gate: ScanMutex::new(limits.scan_deadline),
                failures: FailureTracker::new(
                    limits.prescan_failure_limit,
                    limits.prescan_skip_window,
                ),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.inner.config
    }

    /// Scan an address. Never fails: errors and deadline overruns produce a
    /// degraded report built from the blocklist alone.
    pub async fn scan(&self, address: &str, deep: bool) -> SecurityReport {
        match self.try_scan(address, deep).await {
            Ok(report) => report,
            Err(e) => {
                warn!("⚠️ Scan of {} failed: {}", address, e);
                self.fallback_report(address, deep, &e.to_string()).await
            }
        }
    }

    /// Scan an address, surfacing the failure instead of falling back
    pub async fn try_scan(&self, address: &str, deep: bool) -> AppResult<SecurityReport> {
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        if let Some(report) = self.cached_report(address, deep) {
            debug!("⚡ Cached report for {}", address);
            self.inner.metrics.record_scan(elapsed_ms(), true, true);
            return Ok(report);
        }

        let scanner = self.clone();
        let owned = address.to_string();
        let result = self
            .inner
            .reports
            .with_cache(
                &report_key(address, deep),
                self.inner.config.cache.report_ttl,
                move || async move { scanner.gated_scan(owned, deep).await },
            )
            .await;

        self.inner
            .metrics
            .record_scan(elapsed_ms(), false, result.is_ok());
        result
    }

    /// A deep report also answers a quick scan
    fn cached_report(&self, address: &str, deep: bool) -> Option<SecurityReport> {
        let reports = &self.inner.reports;
        reports
            .get(&report_key(address, true))
            .or_else(|| (!deep).then(|| reports.get(&report_key(address, false))).flatten())
    }

    async fn gated_scan(self, address: String, deep: bool) -> AppResult<SecurityReport> {
        let label = report_key(&address, deep);
        let scanner = self.clone();
        self.inner
            .gate
            .run(&label, async move { scanner.execute(&address, deep).await })
            .await?
    }

    async fn execute(&self, address: &str, deep: bool) -> AppResult<SecurityReport> {
        let inner = &self.inner;
        let before = inner.gateway.call_counts();
        info!("🔍 Scanning {} ({})", address, if deep { "deep" } else { "quick" });

        let (blacklist, deployer, activity) = tokio::join!(
            self.check_blacklist(address),
            inner.deployer.check_deployer(address),
            inner.activity.analyze(address),
        );

        let mut report = SecurityReport::new(address, deep);
        self.merge_blacklist(&mut report, blacklist);
        self.merge_deployer(&mut report, deployer);
        self.merge_activity(&mut report, activity);

        if deep {
            let liquidity = inner.liquidity.check(address).await;
            self.merge_liquidity(&mut report, liquidity);

            let funding = inner
                .funding
                .trace(address, inner.config.limits.funding_max_hops)
                .await;
            self.merge_funding(&mut report, funding);

            let connections = inner.connections.analyze(address).await;
            self.merge_connections(&mut report, connections);
        }

        let calls = inner.gateway.call_counts().since(before);
        if calls.all_failed() {
            return Err(AppError::scan_failed(format!(
                "all {} ledger calls failed",
                calls.failed
            )));
        }
        report.degraded = calls.failed > 0;

        inner.aggregator.apply(&mut report);
        info!(
            "{} {} scored {} ({})",
            report.risk_level.emoji(),
            address,
            report.risk_score,
            report.risk_level.as_str()
        );
        Ok(report)
    }

    async fn check_blacklist(&self, address: &str) -> BlacklistCheck {
        match self.inner.blocklist.lookup(address).await {
            Ok(Some(entry)) => BlacklistCheck {
                is_blacklisted: true,
                malicious_activity: entry.malicious,
                reasons: entry.reasons,
                rug_involvements: entry.rug_involvements,
            },
            Ok(None) => BlacklistCheck::default(),
            Err(e) => {
                warn!("⚠️ Blocklist lookup failed for {}: {}", address, e);
                BlacklistCheck::default()
            }
        }
    }

    fn merge_blacklist(&self, report: &mut SecurityReport, check: BlacklistCheck) {
        if !check.is_blacklisted {
            return;
        }
        report.has_blacklist_history = true;
        report.malicious_activity = check.malicious_activity;
        report.warnings.push(if check.reasons.is_empty() {
            "Address is blacklisted".to_string()
        } else {
            format!("Address is blacklisted: {}", check.reasons.join(", "))
        });
        if check
            .rug_involvements
            .iter()
            .any(|r| r.rug_type == RugType::LpPull)
        {
            report.is_lp_rugger = true;
            report.rug_type = RugType::LpPull;
        }
    }

    fn merge_deployer(&self, report: &mut SecurityReport, check: DeployerCheck) {
        let weights = &self.inner.config.weights;
        report.is_deployer = check.is_deployer;
        report.deployed_tokens = check.deployed_tokens;
        report.token_analyses = check.analyses;

        let deployed = report.deployed_tokens.len();
        let evidence = report.deployed_tokens.iter().take(10).cloned().collect();
        if deployed > weights.report_serial_deployer_tokens {
            report.suspicious_patterns.push(SuspiciousPattern::new(
                "serial_deployer",
                PatternSeverity::Critical,
                format!("Deployed {} tokens", deployed),
                evidence,
            ));
        } else if deployed > weights.report_multi_deployer_tokens {
            report.suspicious_patterns.push(SuspiciousPattern::new(
                "multi_deployer",
                PatternSeverity::Warning,
                format!("Deployed {} tokens", deployed),
                evidence,
            ));
        }

        let rugs = report.rugpull_count();
        if rugs > 0 {
            report.warnings.push(format!(
                "{} of {} analyzed tokens show rug-pull indicators",
                rugs,
                report.token_analyses.len()
            ));
        }
    }

    fn merge_activity(&self, report: &mut SecurityReport, activity: WalletActivityAnalysis) {
        let weights = &self.inner.config.weights;
        if activity.suspicious_timing_count >= weights.report_suspicious_timing_min {
            report.suspicious_patterns.push(SuspiciousPattern::new(
                "suspicious_timing",
                PatternSeverity::Danger,
                format!(
                    "{} transactions within {}s of each other",
                    activity.suspicious_timing_count, weights.suspicious_timing_secs
                ),
                vec![],
            ));
        }
        if activity.rapid_fire_transactions >= weights.report_rapid_fire_min {
            report.suspicious_patterns.push(SuspiciousPattern::new(
                "rapid_fire",
                PatternSeverity::Warning,
                format!("{} rapid-fire transactions", activity.rapid_fire_transactions),
                vec![],
            ));
        }
        report.activity_analysis = Some(activity);
    }

    fn merge_liquidity(&self, report: &mut SecurityReport, check: LiquidityRugCheck) {
        if check.is_lp_rugger {
            report.is_lp_rugger = true;
            report.lp_withdrawn = check.total_withdrawn;
            report.warnings.push(format!(
                "Removed liquidity {} times ({:.2} SOL)",
                check.withdrawal_count, check.total_withdrawn
            ));
            report.suspicious_patterns.push(
                SuspiciousPattern::new(
                    "lp_removal",
                    PatternSeverity::Critical,
                    "Liquidity withdrawn from AMM pools",
                    check.evidence.clone(),
                )
                .at(check.first_withdrawal_at),
            );
        }
        if check.dump_count > 0 {
            report.suspicious_patterns.push(SuspiciousPattern::new(
                "token_dump",
                PatternSeverity::Danger,
                format!("{} large token dumps", check.dump_count),
                check
                    .evidence
                    .iter()
                    .filter(|e| e.starts_with("Dumped"))
                    .cloned()
                    .collect(),
            ));
        }
        if check.rug_type != RugType::None {
            report.rug_type = check.rug_type;
        }
    }

    fn merge_funding(&self, report: &mut SecurityReport, trace: FundingTrace) {
        report.funding_source = trace.source;
        report.funding_chain = trace.chain;
        report.funding_source_risk = trace.risk;
        if trace.risk.is_risky() {
            let severity = if trace.risk == RiskLevel::Critical {
                PatternSeverity::Critical
            } else {
                PatternSeverity::Danger
            };
            report.suspicious_patterns.push(SuspiciousPattern::new(
                "risky_funding",
                severity,
                format!("{} risk funding chain", trace.risk.as_str()),
                trace.notes.clone(),
            ));
        }
        report.warnings.extend(trace.notes);
    }

    fn merge_connections(&self, report: &mut SecurityReport, wallets: Vec<ConnectedWallet>) {
        report.risky_connection_count = wallets.iter().filter(|w| w.risk_level.is_risky()).count();

        let ruggers: Vec<String> = wallets
            .iter()
            .filter(|w| w.is_lp_rugger || w.is_honeypot_creator || w.rug_count > 0)
            .map(|w| w.address.clone())
            .collect();
        if !ruggers.is_empty() {
            report.warnings.push(format!("Connected to {} known ruggers", ruggers.len()));
            report.suspicious_patterns.push(SuspiciousPattern::new(
                "connected_to_rugger",
                PatternSeverity::Critical,
                "Interacted with wallets involved in rugs",
                ruggers,
            ));
        }

        let washers: Vec<String> = wallets
            .iter()
            .filter(|w| w.pattern.as_deref() == Some("wash_trading"))
            .map(|w| w.address.clone())
            .collect();
        if !washers.is_empty() {
            report.suspicious_patterns.push(SuspiciousPattern::new(
                "wash_trading",
                PatternSeverity::Danger,
                "Repeated two-way transfers with the same wallets",
                washers,
            ));
        }

        report.connected_wallets = wallets;
    }

    /// Best-effort report from the blocklist alone
    pub async fn fallback_report(&self, address: &str, deep: bool, reason: &str) -> SecurityReport {
        match self.inner.blocklist.lookup(address).await {
            Ok(entry) => {
                let mut report = SecurityReport::new(address, deep);
                report.degraded = true;
                if let Some(entry) = entry {
                    self.merge_blacklist(
                        &mut report,
                        BlacklistCheck {
                            is_blacklisted: true,
                            malicious_activity: entry.malicious,
                            reasons: entry.reasons,
                            rug_involvements: entry.rug_involvements,
                        },
                    );
                }
                report.warnings.push(format!("Scan incomplete: {}", reason));
                self.inner.aggregator.apply(&mut report);
                report
            }
            Err(e) => {
                warn!("❌ Fallback lookup failed for {}: {}", address, e);
                SecurityReport::unknown(address, reason)
            }
        }
    }

    /// Background warm-up of the report cache.
    ///
    /// Retries with linearly growing delays. An address whose pre-scans keep
    /// failing is skipped for a while; the handle resolves to the error.
    pub fn pre_scan(&self, address: &str) -> JoinHandle<AppResult<()>> {
        let scanner = self.clone();
        let address = address.to_string();
        tokio::spawn(async move {
            let inner = &scanner.inner;
            if inner.failures.should_skip(&address) {
                return Err(AppError::new(
                    ErrorCode::ScanSkipped,
                    format!("pre-scan of {} skipped after repeated failures", address),
                ));
            }

            let limits = &inner.config.limits;
            let attempts = limits.prescan_attempts.max(1);
            let mut last_error = None;
            for attempt in 1..=attempts {
                match scanner.try_scan(&address, true).await {
                    Ok(_) => {
                        inner.failures.record_success(&address);
                        debug!("🔥 Pre-scan of {} done on attempt {}", address, attempt);
                        return Ok(());
                    }
                    Err(e) => {
                        debug!("Pre-scan attempt {} for {} failed: {}", attempt, address, e);
                        last_error = Some(e);
                    }
                }
                if attempt < attempts {
                    tokio::time::sleep(limits.prescan_base_delay * attempt).await;
                }
            }

            let count = inner.failures.record_failure(&address);
            warn!("❌ Pre-scan of {} failed ({} in a row)", address, count);
            Err(last_error.unwrap_or_else(|| AppError::scan_failed("pre-scan failed")))
        })
    }

    pub fn clear_failure_tracking(&self, address: &str) {
        self.inner.failures.clear(address);
    }

    /// Drop a cached report so the next scan goes to the ledger
    pub fn invalidate(&self, address: &str) {
        self.inner.reports.invalidate(&report_key(address, true));
        self.inner.reports.invalidate(&report_key(address, false));
    }

    /// Evict expired cache entries, returns how many were dropped
    pub fn cleanup(&self) -> usize {
        self.inner.reports.cleanup_expired()
    }

    pub fn stats(&self) -> ScannerStats {
        let caller = self.inner.gateway.caller();
        let mut caches = vec![self.inner.reports.stats()];
        caches.extend(self.inner.gateway.cache_stats());
        ScannerStats {
            breaker: caller.breaker().state(),
            pool_resets: caller.pool().reset_count(),
            queued_scans: self.inner.gate.queued(),
            scan_in_progress: self.inner.gate.is_busy(),
            caches,
        }
    }
}
