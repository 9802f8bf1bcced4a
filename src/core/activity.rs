//! Wallet activity profile over the recent history window

use std::collections::HashSet;
use tracing::debug;

use crate::core::gateway::{age_days, LedgerGateway};
use crate::models::config::{HeuristicWeights, ScanLimits};
use crate::models::types::WalletActivityAnalysis;
use crate::providers::ledger::ParsedTransaction;
use crate::utils::constants::{is_system_address, lamports_to_sol};

#[derive(Clone)]
pub struct ActivityAnalyzer {
    gateway: LedgerGateway,
    limits: ScanLimits,
    weights: HeuristicWeights,
}

impl ActivityAnalyzer {
    pub fn new(gateway: LedgerGateway, limits: ScanLimits, weights: HeuristicWeights) -> Self {
        Self {
            gateway,
            limits,
            weights,
        }
    }

    pub async fn analyze(&self, address: &str) -> WalletActivityAnalysis {
        let txs = self
            .gateway
            .recent_transactions(address, self.limits.recent_signature_limit)
            .await;
        let analysis = self.profile(address, txs.iter().map(|tx| tx.as_ref()));
        debug!(
            "📈 {}: {} txs, {:.1} days, {} rapid-fire",
            address,
            analysis.total_transactions,
            analysis.account_age_days,
            analysis.rapid_fire_transactions
        );
        analysis
    }

    pub fn profile<'a>(
        &self,
        address: &str,
        txs: impl Iterator<Item = &'a ParsedTransaction>,
    ) -> WalletActivityAnalysis {
        let mut analysis = WalletActivityAnalysis::default();
        let mut counterparties: HashSet<&str> = HashSet::new();
        let mut times: Vec<i64> = Vec::new();

        for tx in txs {
            analysis.total_transactions += 1;
            if let Some(ts) = tx.block_time {
                times.push(ts);
            }
            if let Some(delta) = tx.lamport_delta(address) {
                let sol = lamports_to_sol(delta);
                if sol > 0.0 {
                    analysis.largest_inflow = analysis.largest_inflow.max(sol);
                } else {
                    analysis.largest_outflow = analysis.largest_outflow.max(-sol);
                }
            }
            counterparties.extend(
                tx.account_keys()
                    .iter()
                    .map(|k| k.pubkey.as_str())
                    .filter(|k| *k != address && !is_system_address(k)),
            );
        }

        analysis.unique_interactions = counterparties.len();
        times.sort_unstable();
        if let Some(oldest) = times.first() {
            analysis.account_age_days = age_days(*oldest);
        }
        analysis.avg_daily_transactions =
            analysis.total_transactions as f64 / analysis.account_age_days.max(1.0);

        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            if gap <= self.weights.suspicious_timing_secs {
                analysis.suspicious_timing_count += 1;
            }
            if gap <= self.weights.rapid_fire_secs {
                analysis.rapid_fire_transactions += 1;
            }
        }
        analysis
    }
}
