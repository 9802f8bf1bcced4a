//! Risk Scoring Module
//! Folds a merged report into a 0-100 score, a level and a verdict
//!
//! Every factor is additive and the sum saturates at 100, so one strong
//! signal can carry a verdict on its own.

use serde::{Deserialize, Serialize};

use crate::models::config::HeuristicWeights;
use crate::models::types::{RiskLevel, ScoreFactor, SecurityReport};

/// Score below which a pattern-free report is considered clean
const CLEAN_SCORE: u32 = 15;
/// Factors named in the verdict
const VERDICT_FACTORS: usize = 3;

/// Scoring outcome for one report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub score: u32,
    pub level: RiskLevel,
    pub verdict: String,
    pub breakdown: Vec<ScoreFactor>,
}

/// Accumulates factors with a saturating total
#[derive(Default)]
struct FactorSheet {
    factors: Vec<ScoreFactor>,
}

impl FactorSheet {
    fn add(&mut self, name: &str, score: u32, reason: String) {
        if score > 0 {
            self.factors.push(ScoreFactor {
                name: name.to_string(),
                score,
                reason,
            });
        }
    }

    fn total(&self) -> u32 {
        self.factors
            .iter()
            .fold(0u32, |acc, f| acc.saturating_add(f.score))
            .min(100)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskAggregator {
    weights: HeuristicWeights,
}

impl RiskAggregator {
    pub fn new(weights: HeuristicWeights) -> Self {
        Self { weights }
    }

    /// Pure function of the report's evidence fields
    pub fn assess(&self, report: &SecurityReport) -> Assessment {
        let w = &self.weights;
        let mut sheet = FactorSheet::default();

        if report.has_blacklist_history {
            sheet.add("blacklist", w.report_blacklist_weight, "Address is on the blocklist".to_string());
        }
        if report.malicious_activity {
            sheet.add("malicious", w.report_malicious_weight, "Malicious activity on record".to_string());
        }

        let deployed = report.deployed_tokens.len();
        if deployed > w.report_serial_deployer_tokens {
            sheet.add(
                "serial_deployer",
                w.report_serial_deployer_weight,
                format!("Serial deployer with {} tokens", deployed),
            );
        } else if deployed > w.report_multi_deployer_tokens {
            sheet.add(
                "multi_deployer",
                w.report_multi_deployer_weight,
                format!("Deployed {} tokens", deployed),
            );
        }

        let rugs = report.rugpull_count() as u32;
        sheet.add(
            "rugpulls",
            w.report_rugpull_weight.saturating_mul(rugs).min(w.report_rugpull_cap),
            format!("{} deployed tokens show rug-pull indicators", rugs),
        );

        let funding = match report.funding_source_risk {
            RiskLevel::Critical => w.report_funding_critical_weight,
            RiskLevel::High => w.report_funding_high_weight,
            RiskLevel::Medium => w.report_funding_medium_weight,
            _ => 0,
        };
        sheet.add(
            "funding",
            funding,
            format!("{} risk funding source", report.funding_source_risk.as_str()),
        );

        if report.is_lp_rugger {
            sheet.add(
                "lp_rug",
                w.report_lp_rug_weight,
                format!("Pulled liquidity ({:.2} SOL withdrawn)", report.lp_withdrawn),
            );
        }
        if report.has_pattern("wash_trading") {
            sheet.add("wash_trading", w.report_wash_trading_weight, "Wash trading with a counterparty".to_string());
        }

        if let Some(activity) = &report.activity_analysis {
            if activity.suspicious_timing_count >= w.report_suspicious_timing_min {
                sheet.add(
                    "suspicious_timing",
                    w.report_suspicious_timing_weight,
                    format!("{} near-simultaneous transactions", activity.suspicious_timing_count),
                );
            }
            if activity.rapid_fire_transactions >= w.report_rapid_fire_min {
                sheet.add(
                    "rapid_fire",
                    w.report_rapid_fire_weight,
                    format!("{} rapid-fire transactions", activity.rapid_fire_transactions),
                );
            }
        }

        let risky = report.risky_connection_count as u32;
        sheet.add(
            "risky_connections",
            w.report_risky_connection_weight
                .saturating_mul(risky)
                .min(w.report_risky_connection_cap),
            format!("Connected to {} risky wallets", risky),
        );

        let score = sheet.total();
        let level = RiskLevel::from_score(score);
        let verdict = verdict(score, level, &sheet.factors, report.suspicious_patterns.len());

        Assessment {
            score,
            level,
            verdict,
            breakdown: sheet.factors,
        }
    }

    /// Write the assessment into the report's scoring fields
    pub fn apply(&self, report: &mut SecurityReport) {
        let assessment = self.assess(report);
        report.risk_score = assessment.score;
        report.risk_level = assessment.level;
        report.verdict = assessment.verdict;
        report.score_breakdown = assessment.breakdown;
    }
}

fn verdict(score: u32, level: RiskLevel, factors: &[ScoreFactor], patterns: usize) -> String {
    if score < CLEAN_SCORE && patterns == 0 {
        return "No major threats detected".to_string();
    }
    if factors.is_empty() {
        return format!("{} risk: {} minor patterns observed", level.as_str(), patterns);
    }

    let mut strongest: Vec<&ScoreFactor> = factors.iter().collect();
    strongest.sort_by(|a, b| b.score.cmp(&a.score));
    let reasons: Vec<&str> = strongest
        .iter()
        .take(VERDICT_FACTORS)
        .map(|f| f.reason.as_str())
        .collect();
    format!("{} risk: {}", level.as_str(), reasons.join("; "))
}
