//! Connected wallet analysis
//!
//! Phase one folds recent history into a per-counterparty interaction graph.
//! Phase two scores the strongest connections against the deployer index and
//! the blocklist.

use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::deployer::DeployerAnalyzer;
use crate::core::gateway::LedgerGateway;
use crate::models::config::{HeuristicWeights, ScanLimits};
use crate::models::types::{ConnectedWallet, ConnectedWalletData, RiskLevel, RugRole};
use crate::providers::blocklist::{Blocklist, BlocklistEntry};
use crate::utils::constants::{is_system_address, lamports_to_sol};

pub type InteractionGraph = HashMap<String, ConnectedWalletData>;

#[derive(Clone)]
pub struct ConnectedWalletAnalyzer {
    gateway: LedgerGateway,
    deployer: DeployerAnalyzer,
    blocklist: Arc<dyn Blocklist>,
    limits: ScanLimits,
    weights: HeuristicWeights,
}

impl ConnectedWalletAnalyzer {
    pub fn new(
        gateway: LedgerGateway,
        deployer: DeployerAnalyzer,
        blocklist: Arc<dyn Blocklist>,
        limits: ScanLimits,
        weights: HeuristicWeights,
    ) -> Self {
        Self {
            gateway,
            deployer,
            blocklist,
            limits,
            weights,
        }
    }

    /// Build and score the interaction graph of `address`
    pub async fn analyze(&self, address: &str) -> Vec<ConnectedWallet> {
        let graph = self.find_connected_wallets(address).await;
        self.analyze_connected(graph).await
    }

    pub async fn find_connected_wallets(&self, address: &str) -> InteractionGraph {
        let txs = self
            .gateway
            .recent_transactions(address, self.limits.recent_signature_limit)
            .await;
        let negligible = self.weights.negligible_movement;
        let mut graph = InteractionGraph::new();

        for tx in txs.iter().filter(|tx| !tx.is_failed()) {
            let Some(target_delta) = tx.lamport_delta(address) else {
                continue;
            };
            let target_sol = lamports_to_sol(target_delta);
            let target_moved = target_sol.abs() >= negligible;

            for (index, key) in tx.account_keys().iter().enumerate() {
                if key.pubkey == address || is_system_address(&key.pubkey) {
                    continue;
                }
                let delta = lamports_to_sol(tx.lamport_delta_at(index).unwrap_or(0));
                // Fee-only rows are noise unless the counterparty drove a real transfer
                if delta.abs() < negligible && !(key.signer && target_moved) {
                    continue;
                }
                // Flow counts only against the target's opposite movement
                let (sent, received) = if delta < 0.0 && target_sol > 0.0 {
                    ((-delta).min(target_sol), 0.0)
                } else if delta > 0.0 && target_sol < 0.0 {
                    (0.0, delta.min(-target_sol))
                } else {
                    (0.0, 0.0)
                };
                graph
                    .entry(key.pubkey.clone())
                    .or_default()
                    .record(sent, received, tx.block_time, tx.signature());
            }
        }

        debug!("🕸️ {} counterparties found for {}", graph.len(), address);
        graph
    }

    /// Filter, rank and score counterparties, worst first
    pub async fn analyze_connected(&self, graph: InteractionGraph) -> Vec<ConnectedWallet> {
        let weights = &self.weights;
        let mut candidates: Vec<(String, ConnectedWalletData)> = graph
            .into_iter()
            .filter(|(_, data)| {
                data.interaction_count >= weights.min_interactions
                    || data.sent > weights.min_volume
                    || data.received > weights.min_volume
            })
            .collect();

        let rank = |data: &ConnectedWalletData| data.total_volume() + data.interaction_count as f64;
        candidates.sort_by(|(a_addr, a), (b_addr, b)| {
            rank(b).total_cmp(&rank(a)).then_with(|| a_addr.cmp(b_addr))
        });
        candidates.truncate(self.limits.max_connected_wallets);

        let mut wallets: Vec<ConnectedWallet> = stream::iter(candidates)
            .map(|(address, data)| self.score(address, data))
            .buffered(self.limits.connection_concurrency.max(1))
            .collect()
            .await;

        wallets.sort_by(|a, b| {
            b.risk_level
                .cmp(&a.risk_level)
                .then_with(|| b.rug_count.cmp(&a.rug_count))
                .then_with(|| a.address.cmp(&b.address))
        });

        let risky = wallets.iter().filter(|w| w.risk_level.is_risky()).count();
        if risky > 0 {
            info!("⚠️ {} risky connections among {}", risky, wallets.len());
        }
        wallets
    }

    async fn score(&self, address: String, data: ConnectedWalletData) -> ConnectedWallet {
        let deployed = self.deployer.count_deployed_tokens(&address).await;
        let entry = match self.blocklist.lookup(&address).await {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Blocklist lookup failed for {}: {}", address, e);
                None
            }
        };
        let pattern = flow_pattern(&data, &self.weights);
        let (risk_score, risk_reasons) =
            connection_score(deployed, entry.as_ref(), pattern, &self.weights);
        let entry = entry.unwrap_or_default();

        ConnectedWallet {
            address,
            is_deployer: deployed > 0,
            deployed_token_count: deployed,
            risk_level: RiskLevel::from_score(risk_score),
            risk_score,
            risk_reasons,
            rug_count: entry.rug_involvements.len(),
            rug_involvements: entry.rug_involvements,
            is_lp_rugger: entry.lp_rugger,
            is_honeypot_creator: entry.honeypot_creator,
            pattern: pattern.map(str::to_string),
            data,
        }
    }
}

/// Money-flow shape between the target and one counterparty
pub fn flow_pattern(data: &ConnectedWalletData, weights: &HeuristicWeights) -> Option<&'static str> {
    if data.sent > 0.1
        && data.received > 0.1
        && data.interaction_count > weights.wash_trading_interactions
    {
        Some("wash_trading")
    } else if data.sent > data.received * 10.0 && data.sent > 5.0 {
        Some("major_funder")
    } else if data.received > data.sent * 10.0 && data.received > 5.0 {
        Some("fund_sink")
    } else {
        None
    }
}

/// Weighted counterparty score, capped at 100
pub fn connection_score(
    deployed_tokens: usize,
    entry: Option<&BlocklistEntry>,
    pattern: Option<&str>,
    weights: &HeuristicWeights,
) -> (u32, Vec<String>) {
    let mut score = 0u32;
    let mut reasons = Vec::new();
    let mut add = |points: u32, reason: String| {
        score = score.saturating_add(points);
        reasons.push(reason);
    };

    if let Some(entry) = entry {
        if entry.lp_rugger {
            add(weights.lp_rugger_weight, "Known LP rugger".to_string());
        }
        if entry.honeypot_creator {
            add(weights.honeypot_creator_weight, "Known honeypot creator".to_string());
        }
        let deployed_rugs = entry.deployed_rugs() as u32;
        if deployed_rugs > 0 {
            add(
                weights.rug_deployment_weight.saturating_mul(deployed_rugs),
                format!("Deployed {} rugged tokens", deployed_rugs),
            );
        }
        if entry.rug_involvements.iter().any(|r| r.role == RugRole::LpRemover) {
            add(weights.lp_removal_role_weight, "Removed liquidity in a rug".to_string());
        }
        if entry.rug_involvements.iter().any(|r| r.role == RugRole::Dumper) {
            add(weights.dump_role_weight, "Dumped tokens in a rug".to_string());
        }
        add(weights.blacklisted_weight, "Blacklisted".to_string());
        if entry.malicious {
            add(weights.malicious_weight, "Malicious activity on record".to_string());
        }
    }

    if deployed_tokens > weights.serial_deployer_tokens {
        add(
            weights.serial_deployer_weight,
            format!("Serial deployer ({} tokens)", deployed_tokens),
        );
    } else if deployed_tokens > weights.multi_deployer_tokens {
        add(
            weights.multi_deployer_weight,
            format!("Deployed {} tokens", deployed_tokens),
        );
    }

    match pattern {
        Some("wash_trading") => add(weights.wash_trading_weight, "Wash trading pattern".to_string()),
        Some("major_funder") => add(weights.one_way_flow_weight, "Major one-way funder".to_string()),
        Some("fund_sink") => add(weights.one_way_flow_weight, "One-way fund sink".to_string()),
        _ => {}
    }

    (score.min(100), reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gateway::test_support::gateway;
    use crate::models::types::RugType;
    use crate::providers::blocklist::InMemoryBlocklist;
    use crate::providers::mock::{MockLedger, TxBuilder};

    fn analyzer(mock: Arc<MockLedger>, blocklist: Arc<InMemoryBlocklist>) -> ConnectedWalletAnalyzer {
        let gw = gateway(mock);
        let limits = ScanLimits::default();
        let weights = HeuristicWeights::default();
        let deployer = DeployerAnalyzer::new(gw.clone(), limits.clone(), weights.clone());
        ConnectedWalletAnalyzer::new(gw, deployer, blocklist, limits, weights)
    }

    #[tokio::test]
    async fn test_graph_attributes_direction() {
        let mock = Arc::new(MockLedger::new());
        mock.add_transaction(TxBuilder::new("in", 100).transfer("Funder", "Target", 3.0).build());
        mock.add_transaction(TxBuilder::new("out", 200).transfer("Target", "Sink", 1.5).build());
        let graph = analyzer(mock, Arc::new(InMemoryBlocklist::new()))
            .find_connected_wallets("Target")
            .await;

        let funder = &graph["Funder"];
        assert!((funder.sent - 3.0).abs() < 1e-9);
        assert_eq!(funder.received, 0.0);
        let sink = &graph["Sink"];
        assert!((sink.received - 1.5).abs() < 1e-9);
        assert_eq!(sink.signatures, vec!["out".to_string()]);
    }

    #[tokio::test]
    async fn test_same_direction_movement_is_not_flow() {
        let mock = Arc::new(MockLedger::new());
        mock.add_transaction(
            TxBuilder::new("split", 100)
                .transfer("Target", "Merchant", 1.0)
                .transfer("Partner", "Merchant", 2.0)
                .build(),
        );
        let graph = analyzer(mock, Arc::new(InMemoryBlocklist::new()))
            .find_connected_wallets("Target")
            .await;

        let partner = &graph["Partner"];
        assert_eq!(partner.sent, 0.0);
        assert_eq!(partner.received, 0.0);
        assert_eq!(partner.interaction_count, 1);
        // Merchant took 3.0 in total, only 1.0 of it from the target
        let merchant = &graph["Merchant"];
        assert!((merchant.received - 1.0).abs() < 1e-9);
        assert_eq!(merchant.sent, 0.0);
    }

    #[tokio::test]
    async fn test_negligible_rows_are_dropped() {
        let mock = Arc::new(MockLedger::new());
        mock.add_transaction(
            TxBuilder::new("dust", 100)
                .signer("Target")
                .account("Bystander")
                .transfer("Target", "Dust", 0.0001)
                .build(),
        );
        let graph = analyzer(mock, Arc::new(InMemoryBlocklist::new()))
            .find_connected_wallets("Target")
            .await;
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_major_funder_is_medium() {
        let mock = Arc::new(MockLedger::new());
        for i in 0..8 {
            mock.add_transaction(
                TxBuilder::new(&format!("fund{}", i), 1_000 + i)
                    .transfer("BigFunder", "Target", 7.5)
                    .build(),
            );
        }
        mock.add_transaction(TxBuilder::new("back", 2_000).transfer("Target", "BigFunder", 0.2).build());

        let wallets = analyzer(mock, Arc::new(InMemoryBlocklist::new()))
            .analyze("Target")
            .await;
        let funder = wallets.iter().find(|w| w.address == "BigFunder").unwrap();
        assert_eq!(funder.pattern.as_deref(), Some("major_funder"));
        assert_eq!(funder.risk_score, 20);
        assert_eq!(funder.risk_level, RiskLevel::Medium);
        assert_eq!(funder.data.interaction_count, 9);
    }

    #[tokio::test]
    async fn test_blocklisted_rugger_sorts_first() {
        let mock = Arc::new(MockLedger::new());
        for (i, peer) in ["Alice", "Rugger", "Bob"].iter().enumerate() {
            mock.add_transaction(
                TxBuilder::new(&format!("tx{}", i), 100 + i as i64)
                    .transfer(peer, "Target", 1.0)
                    .build(),
            );
        }
        let blocklist = Arc::new(InMemoryBlocklist::new());
        blocklist.insert(
            "Rugger",
            BlocklistEntry::listed("LP pull").with_involvement("MintX", RugType::LpPull, RugRole::LpRemover),
        );

        let wallets = analyzer(mock, blocklist).analyze("Target").await;
        assert_eq!(wallets.len(), 3);
        assert_eq!(wallets[0].address, "Rugger");
        assert_eq!(wallets[0].risk_level, RiskLevel::Critical);
        assert_eq!(wallets[0].risk_score, 100);
        assert!(wallets[0].is_lp_rugger);
        assert_eq!(wallets[0].rug_count, 1);
        assert_eq!(wallets[1].address, "Alice");
        assert_eq!(wallets[1].risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_connection_score_caps_at_100() {
        let weights = HeuristicWeights::default();
        let entry = BlocklistEntry::listed("x")
            .malicious()
            .with_involvement("M", RugType::Honeypot, RugRole::Deployer);
        let (score, reasons) = connection_score(12, Some(&entry), Some("wash_trading"), &weights);
        assert_eq!(score, 100);
        assert!(reasons.iter().any(|r| r.contains("Serial deployer")));

        let (score, _) = connection_score(4, None, None, &weights);
        assert_eq!(score, 35);
        assert_eq!(RiskLevel::from_score(score), RiskLevel::Medium);
    }
}
