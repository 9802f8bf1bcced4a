//! Type definitions for the rug-pull scanner
//! All report-facing data structures live here

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk level classification for addresses.
///
/// Declaration order is severity order: `Unknown` only appears on degraded
/// reports and never outranks a real finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Scan could not produce evidence either way
    Unknown,
    /// No meaningful signal
    Low,
    /// Worth a second look
    Medium,
    /// Likely connected to scam activity
    High,
    /// Almost certainly a rug operator or directly funded by one
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Unknown => "UNKNOWN",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLevel::Unknown => "❓",
            RiskLevel::Low => "✅",
            RiskLevel::Medium => "🟠",
            RiskLevel::High => "🔴",
            RiskLevel::Critical => "💀",
        }
    }

    /// Numeric severity, Unknown = 0
    pub fn severity(&self) -> u8 {
        *self as u8
    }

    /// Map a 0-100 score onto the shared bands (≥60 / ≥40 / ≥15)
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 60 => RiskLevel::Critical,
            s if s >= 40 => RiskLevel::High,
            s if s >= 15 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    /// Return the more severe of the two levels
    pub fn escalate(self, other: RiskLevel) -> RiskLevel {
        self.max(other)
    }

    pub fn is_risky(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

/// Classification of an exit scam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RugType {
    LpPull,
    Honeypot,
    MintDump,
    DevDump,
    SoftRug,
    CoordinatedDump,
    None,
}

impl RugType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RugType::LpPull => "lp_pull",
            RugType::Honeypot => "honeypot",
            RugType::MintDump => "mint_dump",
            RugType::DevDump => "dev_dump",
            RugType::SoftRug => "soft_rug",
            RugType::CoordinatedDump => "coordinated_dump",
            RugType::None => "none",
        }
    }
}

/// Role a wallet played in a recorded rug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RugRole {
    Deployer,
    LpRemover,
    Dumper,
    Funder,
}

/// A recorded rug the wallet took part in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RugInvolvement {
    pub mint: String,
    pub rug_type: RugType,
    pub role: RugRole,
}

/// Severity attached to a suspicious pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSeverity {
    Warning,
    Danger,
    Critical,
}

/// One heuristic that fired during a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousPattern {
    pub kind: String,
    pub severity: PatternSeverity,
    pub description: String,
    pub evidence: Vec<String>,
    pub timestamp: Option<i64>,
}

impl SuspiciousPattern {
    pub fn new(
        kind: impl Into<String>,
        severity: PatternSeverity,
        description: impl Into<String>,
        evidence: Vec<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            severity,
            description: description.into(),
            evidence,
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: Option<i64>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Analysis of a single mint created by the scanned address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedTokenInfo {
    pub mint: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub created_at: Option<i64>,
    pub has_liquidity: bool,
    pub liquidity_pulled: bool,
    pub mint_authority_revoked: bool,
    pub freeze_authority_revoked: bool,
    pub top_holder_percentage: Option<f64>,
    pub is_rugpull: bool,
    pub rugpull_indicators: Vec<String>,
}

impl DeployedTokenInfo {
    /// Conservative record used when the mint could not be inspected
    pub fn unknown(mint: &str) -> Self {
        Self {
            mint: mint.to_string(),
            name: None,
            symbol: None,
            created_at: None,
            has_liquidity: false,
            liquidity_pulled: false,
            mint_authority_revoked: false,
            freeze_authority_revoked: false,
            top_holder_percentage: None,
            is_rugpull: false,
            rugpull_indicators: Vec::new(),
        }
    }

    /// Loose on purpose: the output is advisory, false positives are accepted.
    pub fn classify_rugpull(indicators: &[String]) -> bool {
        indicators.len() >= 2
            || indicators
                .iter()
                .any(|i| i.contains("50%") || i.to_lowercase().contains("mint authority"))
    }
}

/// Per-counterparty interaction totals built while walking history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedWalletData {
    /// Value the counterparty sent to the scanned address
    pub sent: f64,
    /// Value the counterparty received from the scanned address
    pub received: f64,
    pub interaction_count: u32,
    pub first_interaction: Option<i64>,
    pub last_interaction: Option<i64>,
    pub signatures: Vec<String>,
}

impl ConnectedWalletData {
    /// Fold one transaction into the running totals
    pub fn record(&mut self, sent: f64, received: f64, block_time: Option<i64>, signature: &str) {
        self.sent += sent;
        self.received += received;
        self.interaction_count += 1;
        if let Some(ts) = block_time {
            self.first_interaction = Some(self.first_interaction.map_or(ts, |f| f.min(ts)));
            self.last_interaction = Some(self.last_interaction.map_or(ts, |l| l.max(ts)));
        }
        if !self.signatures.iter().any(|s| s == signature) {
            self.signatures.push(signature.to_string());
        }
    }

    pub fn total_volume(&self) -> f64 {
        self.sent + self.received
    }
}

/// Scored counterparty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedWallet {
    pub address: String,
    #[serde(flatten)]
    pub data: ConnectedWalletData,
    pub is_deployer: bool,
    pub deployed_token_count: usize,
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    pub risk_reasons: Vec<String>,
    pub rug_involvements: Vec<RugInvolvement>,
    pub is_lp_rugger: bool,
    pub is_honeypot_creator: bool,
    pub rug_count: usize,
    pub pattern: Option<String>,
}

/// Activity profile of the scanned address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletActivityAnalysis {
    pub total_transactions: usize,
    pub account_age_days: f64,
    pub avg_daily_transactions: f64,
    pub largest_inflow: f64,
    pub largest_outflow: f64,
    pub unique_interactions: usize,
    pub suspicious_timing_count: usize,
    pub rapid_fire_transactions: usize,
}

/// Individual factor contributing to a risk score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreFactor {
    pub name: String,
    pub score: u32,
    pub reason: String,
}

/// Result of the blacklist lookup in phase 1
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistCheck {
    pub is_blacklisted: bool,
    pub malicious_activity: bool,
    pub reasons: Vec<String>,
    pub rug_involvements: Vec<RugInvolvement>,
}

/// Result of deployer analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployerCheck {
    pub is_deployer: bool,
    pub deployed_tokens: Vec<String>,
    pub analyses: Vec<DeployedTokenInfo>,
}

/// Result of funding-chain tracing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingTrace {
    pub source: Option<String>,
    /// Nearest funder first; never contains the origin address
    pub chain: Vec<String>,
    pub risk: RiskLevel,
    pub notes: Vec<String>,
}

impl Default for FundingTrace {
    fn default() -> Self {
        Self {
            source: None,
            chain: Vec::new(),
            risk: RiskLevel::Low,
            notes: Vec::new(),
        }
    }
}

/// Result of liquidity-pull detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityRugCheck {
    pub is_lp_rugger: bool,
    pub rug_type: RugType,
    pub total_withdrawn: f64,
    pub withdrawal_count: usize,
    pub burn_count: usize,
    pub dump_count: usize,
    pub evidence: Vec<String>,
    pub first_withdrawal_at: Option<i64>,
}

impl Default for LiquidityRugCheck {
    fn default() -> Self {
        Self {
            is_lp_rugger: false,
            rug_type: RugType::None,
            total_withdrawn: 0.0,
            withdrawal_count: 0,
            burn_count: 0,
            dump_count: 0,
            evidence: Vec::new(),
            first_withdrawal_at: None,
        }
    }
}

/// Final scan output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityReport {
    pub address: String,
    pub scan_id: String,
    pub risk_level: RiskLevel,
    /// 0-100
    pub risk_score: u32,
    pub warnings: Vec<String>,
    pub is_deployer: bool,
    pub deployed_tokens: Vec<String>,
    pub token_analyses: Vec<DeployedTokenInfo>,
    pub funding_source: Option<String>,
    pub funding_chain: Vec<String>,
    pub funding_source_risk: RiskLevel,
    pub has_blacklist_history: bool,
    pub malicious_activity: bool,
    pub connected_wallets: Vec<ConnectedWallet>,
    pub risky_connection_count: usize,
    pub suspicious_patterns: Vec<SuspiciousPattern>,
    pub activity_analysis: Option<WalletActivityAnalysis>,
    pub is_lp_rugger: bool,
    pub rug_type: RugType,
    pub lp_withdrawn: f64,
    pub verdict: String,
    pub score_breakdown: Vec<ScoreFactor>,
    pub deep_scan: bool,
    pub degraded: bool,
    pub scanned_at: DateTime<Utc>,
}

impl SecurityReport {
    /// Empty report; scoring fields are filled by the aggregator
    pub fn new(address: &str, deep_scan: bool) -> Self {
        Self {
            address: address.to_string(),
            scan_id: uuid::Uuid::new_v4().to_string(),
            risk_level: RiskLevel::Low,
            risk_score: 0,
            warnings: Vec::new(),
            is_deployer: false,
            deployed_tokens: Vec::new(),
            token_analyses: Vec::new(),
            funding_source: None,
            funding_chain: Vec::new(),
            funding_source_risk: RiskLevel::Low,
            has_blacklist_history: false,
            malicious_activity: false,
            connected_wallets: Vec::new(),
            risky_connection_count: 0,
            suspicious_patterns: Vec::new(),
            activity_analysis: None,
            is_lp_rugger: false,
            rug_type: RugType::None,
            lp_withdrawn: 0.0,
            verdict: String::new(),
            score_breakdown: Vec::new(),
            deep_scan,
            degraded: false,
            scanned_at: Utc::now(),
        }
    }

    /// Worst-case report when even the fallback lookup failed
    pub fn unknown(address: &str, reason: &str) -> Self {
        let mut report = Self::new(address, false);
        report.risk_level = RiskLevel::Unknown;
        report.degraded = true;
        report.verdict = format!("Scan could not complete: {}", reason);
        report
    }

    pub fn has_pattern(&self, kind: &str) -> bool {
        self.suspicious_patterns.iter().any(|p| p.kind == kind)
    }

    pub fn rugpull_count(&self) -> usize {
        self.token_analyses.iter().filter(|t| t.is_rugpull).count()
    }

    /// Pretty print the report
    pub fn summary(&self) -> String {
        let mut output = format!(
            "\n{} Risk: {} ({}/100) | {}\n",
            self.risk_level.emoji(),
            self.risk_level.as_str(),
            self.risk_score,
            self.address
        );
        output.push_str(&format!("   Verdict: {}\n", self.verdict));
        if self.is_deployer {
            output.push_str(&format!(
                "   Deployed tokens: {} ({} flagged)\n",
                self.deployed_tokens.len(),
                self.rugpull_count()
            ));
        }
        if !self.funding_chain.is_empty() {
            output.push_str(&format!(
                "   Funding chain: {} ({})\n",
                self.funding_chain.join(" <- "),
                self.funding_source_risk.as_str()
            ));
        }
        if !self.warnings.is_empty() {
            output.push_str("   Warnings:\n");
            for warning in &self.warnings {
                output.push_str(&format!("     - {}\n", warning));
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Unknown < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!(RiskLevel::High.escalate(RiskLevel::Medium), RiskLevel::High);
    }

    #[test]
    fn test_score_bands() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(14), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(15), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn test_rugpull_classification_is_loose() {
        assert!(!DeployedTokenInfo::classify_rugpull(&[]));
        assert!(DeployedTokenInfo::classify_rugpull(&[
            "Deployer still has mint authority".to_string()
        ]));
        assert!(DeployedTokenInfo::classify_rugpull(&[
            "Top holder owns 72.0% of observed supply (>50%)".to_string()
        ]));
        assert!(!DeployedTokenInfo::classify_rugpull(&[
            "Deployer still has freeze authority".to_string()
        ]));
        assert!(DeployedTokenInfo::classify_rugpull(&[
            "Deployer still has freeze authority".to_string(),
            "Liquidity removed by deployer".to_string(),
        ]));
    }

    #[test]
    fn test_connected_data_merge() {
        let mut data = ConnectedWalletData::default();
        data.record(1.5, 0.0, Some(200), "sig1");
        data.record(0.0, 0.25, Some(100), "sig2");
        data.record(0.5, 0.0, None, "sig1");

        assert_eq!(data.interaction_count, 3);
        assert!((data.sent - 2.0).abs() < 1e-9);
        assert!((data.received - 0.25).abs() < 1e-9);
        assert_eq!(data.first_interaction, Some(100));
        assert_eq!(data.last_interaction, Some(200));
        assert_eq!(data.signatures, vec!["sig1".to_string(), "sig2".to_string()]);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = SecurityReport::new("Addr1111", true);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("riskScore").is_some());
        assert_eq!(json["riskLevel"], "low");
        assert_eq!(json["rugType"], "none");
    }
}
