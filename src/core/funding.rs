//! Funding chain tracing
//!
//! Walks backwards from an address: the first signer of its oldest reachable
//! transaction that is not the address itself is taken as its funder.
//! Multisig-funded wallets may be misattributed; this is accepted.

use std::collections::HashSet;
use tracing::{debug, info};

use crate::core::deployer::DeployerAnalyzer;
use crate::core::gateway::LedgerGateway;
use crate::models::config::HeuristicWeights;
use crate::models::types::{FundingTrace, RiskLevel};

#[derive(Clone)]
pub struct FundingChainTracer {
    gateway: LedgerGateway,
    deployer: DeployerAnalyzer,
    weights: HeuristicWeights,
}

impl FundingChainTracer {
    pub fn new(gateway: LedgerGateway, deployer: DeployerAnalyzer, weights: HeuristicWeights) -> Self {
        Self {
            gateway,
            deployer,
            weights,
        }
    }

    /// Funder of `address`, if one can be identified
    pub async fn funder_of(&self, address: &str) -> Option<String> {
        let oldest = self.gateway.oldest_signature(address).await?;
        let tx = self.gateway.transaction(&oldest.signature).await?;
        let funder = tx
            .signers()
            .find(|signer| *signer != address)
            .map(str::to_string);
        funder
    }

    pub async fn trace(&self, address: &str, max_hops: usize) -> FundingTrace {
        let mut trace = FundingTrace::default();
        let mut visited: HashSet<String> = HashSet::from([address.to_string()]);
        let mut current = address.to_string();

        for hop in 0..max_hops {
            let Some(funder) = self.funder_of(&current).await else {
                debug!("🔚 No funder found for {} at hop {}", current, hop);
                break;
            };
            if !visited.insert(funder.clone()) {
                trace
                    .notes
                    .push(format!("Funding cycle detected at {}", funder));
                break;
            }
            trace.chain.push(funder.clone());

            if let Some(age) = self.gateway.account_age_days(&funder).await {
                if age < self.weights.young_funder_days {
                    trace.risk = trace.risk.escalate(RiskLevel::High);
                    trace.notes.push(format!(
                        "Funder {} is only {:.1} days old",
                        funder, age
                    ));
                }
            }

            let deployed = self.deployer.count_deployed_tokens(&funder).await;
            if deployed > self.weights.prolific_funder_tokens {
                trace.risk = trace.risk.escalate(RiskLevel::Critical);
                trace.notes.push(format!(
                    "Funder {} deployed {} tokens",
                    funder, deployed
                ));
            }

            current = funder;
        }

        trace.source = trace.chain.first().cloned();
        if trace.risk.is_risky() {
            info!(
                "🧬 Risky funding for {}: {} ({} hops)",
                address,
                trace.risk.as_str(),
                trace.chain.len()
            );
        }
        trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gateway::test_support::gateway;
    use crate::models::config::ScanLimits;
    use crate::providers::mock::{mint_creation_tx, MockLedger, TxBuilder};
    use chrono::Utc;
    use std::sync::Arc;

    fn tracer(mock: Arc<MockLedger>) -> FundingChainTracer {
        let gw = gateway(mock);
        let deployer = DeployerAnalyzer::new(
            gw.clone(),
            ScanLimits::default(),
            HeuristicWeights::default(),
        );
        FundingChainTracer::new(gw, deployer, HeuristicWeights::default())
    }

    #[tokio::test]
    async fn test_chain_stops_at_max_hops() {
        let mock = Arc::new(MockLedger::new());
        let old = 1_500_000_000;
        for (i, (from, to)) in [("W1", "W0"), ("W2", "W1"), ("W3", "W2"), ("W4", "W3")]
            .iter()
            .enumerate()
        {
            mock.add_transaction(
                TxBuilder::new(&format!("fund{}", i), old - i as i64 * 100)
                    .transfer(from, to, 1.0)
                    .build(),
            );
        }

        let trace = tracer(mock).trace("W0", 3).await;
        assert_eq!(trace.chain, vec!["W1", "W2", "W3"]);
        assert_eq!(trace.source.as_deref(), Some("W1"));
        assert_eq!(trace.risk, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_cycle_is_not_repeated() {
        let mock = Arc::new(MockLedger::new());
        // Co-signed opening transaction: A and C each see the other as funder
        mock.add_transaction(
            TxBuilder::new("w", 1_200_000_000)
                .signer("C")
                .transfer("A", "C", 1.0)
                .build(),
        );
        mock.add_transaction(TxBuilder::new("x", 1_500_000_000).transfer("B", "A", 1.0).build());

        let trace = tracer(mock).trace("A", 5).await;
        assert_eq!(trace.chain, vec!["C"]);
        let unique: HashSet<&String> = trace.chain.iter().collect();
        assert_eq!(unique.len(), trace.chain.len());
        assert!(trace.notes.iter().any(|n| n.contains("cycle")));
    }

    #[tokio::test]
    async fn test_self_signed_origin_has_no_funder() {
        let mock = Arc::new(MockLedger::new());
        mock.add_transaction(TxBuilder::new("a", 1_500_000_000).transfer("B", "A", 1.0).build());
        mock.add_transaction(TxBuilder::new("b", 1_400_000_000).transfer("A", "B", 1.0).build());

        let trace = tracer(mock).trace("A", 3).await;
        assert!(trace.chain.is_empty());
        assert!(trace.source.is_none());
    }

    #[tokio::test]
    async fn test_young_and_prolific_funders_escalate() {
        let mock = Arc::new(MockLedger::new());
        let now = Utc::now().timestamp();
        let two_days = now - 2 * 86_400;
        mock.add_transaction(TxBuilder::new("fund-target", two_days + 100).transfer("F1", "Target", 5.0).build());
        mock.add_transaction(TxBuilder::new("fund-f1", two_days).transfer("F2", "F1", 10.0).build());
        for i in 0..8 {
            mock.add_transaction(mint_creation_tx(
                &format!("mint{}", i),
                1_600_000_000 + i,
                "F2",
                &format!("Mint{}", i),
            ));
        }

        let trace = tracer(mock).trace("Target", 2).await;
        assert_eq!(trace.chain, vec!["F1", "F2"]);
        assert_eq!(trace.risk, RiskLevel::Critical);
        assert!(trace.notes.iter().any(|n| n.contains("days old")));
        assert!(trace.notes.iter().any(|n| n.contains("deployed 8 tokens")));
    }
}
