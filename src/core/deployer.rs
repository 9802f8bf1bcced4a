//! Deployer analysis
//!
//! Finds mints the address initialized in its recent history and grades
//! each one for rug-pull indicators: live authorities, holder concentration
//! and pulled liquidity.

use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::gateway::LedgerGateway;
use crate::core::liquidity::is_liquidity_withdrawal;
use crate::models::config::{HeuristicWeights, ScanLimits};
use crate::models::types::{DeployedTokenInfo, DeployerCheck};
use crate::providers::ledger::{ParsedInstruction, ParsedTransaction};
use crate::utils::constants::{is_amm_program, is_token_program};

fn is_mint_initialization(ix: &ParsedInstruction) -> bool {
    is_token_program(&ix.program_id)
        && matches!(
            ix.instruction_type(),
            Some("initializeMint") | Some("initializeMint2")
        )
}

/// Mint initialized by `deployer` in this instruction, if any.
///
/// The deployer must sign the transaction or be named as mint authority.
fn initialized_mint<'a>(
    tx: &'a ParsedTransaction,
    ix: &'a ParsedInstruction,
    deployer: &str,
) -> Option<&'a str> {
    if !is_mint_initialization(ix) {
        return None;
    }
    let by_deployer = tx.signers().any(|s| s == deployer)
        || ix.info_str("mintAuthority") == Some(deployer);
    if by_deployer {
        ix.info_str("mint")
    } else {
        None
    }
}

/// Unique mints in first-seen order across top-level and inner instructions
pub fn discover_mints(deployer: &str, history: &[Arc<ParsedTransaction>]) -> Vec<String> {
    let mut mints: Vec<String> = Vec::new();
    for tx in history {
        for ix in tx.all_instructions() {
            if let Some(mint) = initialized_mint(tx, ix, deployer) {
                if !mints.iter().any(|m| m == mint) {
                    mints.push(mint.to_string());
                }
            }
        }
    }
    mints
}

#[derive(Clone)]
pub struct DeployerAnalyzer {
    gateway: LedgerGateway,
    limits: ScanLimits,
    weights: HeuristicWeights,
}

impl DeployerAnalyzer {
    pub fn new(gateway: LedgerGateway, limits: ScanLimits, weights: HeuristicWeights) -> Self {
        Self {
            gateway,
            limits,
            weights,
        }
    }

    pub async fn check_deployer(&self, address: &str) -> DeployerCheck {
        let history = self
            .gateway
            .recent_transactions(address, self.limits.recent_signature_limit)
            .await;
        let deployed_tokens = discover_mints(address, &history);
        if deployed_tokens.is_empty() {
            return DeployerCheck::default();
        }

        info!("🏭 {} deployed {} tokens", address, deployed_tokens.len());
        let history = &history;
        let targets: Vec<String> = deployed_tokens
            .iter()
            .take(self.limits.max_analyzed_tokens)
            .cloned()
            .collect();
        let analyses: Vec<DeployedTokenInfo> = stream::iter(targets)
            .map(|mint| async move { self.analyze_token(&mint, address, history).await })
            .buffered(self.limits.fetch_concurrency.max(1))
            .collect()
            .await;

        DeployerCheck {
            is_deployer: true,
            deployed_tokens,
            analyses,
        }
    }

    /// Cheap variant: number of mints found in recent history
    pub async fn count_deployed_tokens(&self, address: &str) -> usize {
        let history = self
            .gateway
            .recent_transactions(address, self.limits.recent_signature_limit)
            .await;
        discover_mints(address, &history).len()
    }

    /// Grade one mint. Missing or undecodable mint accounts yield
    /// `DeployedTokenInfo::unknown`.
    pub async fn analyze_token(
        &self,
        mint: &str,
        deployer: &str,
        history: &[Arc<ParsedTransaction>],
    ) -> DeployedTokenInfo {
        let Some(account) = self.gateway.account_info(mint).await else {
            debug!("❓ Mint account {} unavailable", mint);
            return DeployedTokenInfo::unknown(mint);
        };
        let Some(state) = account.mint_state() else {
            return DeployedTokenInfo::unknown(mint);
        };

        let mut info = DeployedTokenInfo::unknown(mint);
        let mut indicators = Vec::new();

        info.name = state.name;
        info.symbol = state.symbol;
        info.created_at = history
            .iter()
            .find(|tx| {
                tx.all_instructions()
                    .any(|ix| initialized_mint(tx, ix, deployer) == Some(mint))
            })
            .and_then(|tx| tx.block_time);

        match state.mint_authority.as_deref() {
            None => info.mint_authority_revoked = true,
            Some(authority) if authority == deployer => {
                indicators.push("Deployer still has mint authority".to_string())
            }
            Some(_) => {}
        }
        match state.freeze_authority.as_deref() {
            None => info.freeze_authority_revoked = true,
            Some(authority) if authority == deployer => {
                indicators.push("Deployer still has freeze authority".to_string())
            }
            Some(_) => {}
        }

        let mut concentrated = false;
        let holders = self.gateway.largest_accounts(mint).await;
        let observed: f64 = holders.iter().map(|h| h.value()).sum();
        if let Some(top) = holders.first().filter(|_| observed > 0.0) {
            let share = top.value() / observed * 100.0;
            info.top_holder_percentage = Some(share);
            if share > self.weights.top_holder_threshold_pct {
                concentrated = true;
                indicators.push(format!(
                    "Top holder owns {:.1}% of observed supply (>{:.0}%)",
                    share, self.weights.top_holder_threshold_pct
                ));
            }
            if share > self.weights.deployer_holding_threshold_pct {
                let owner = self
                    .gateway
                    .account_info(&top.address)
                    .await
                    .and_then(|a| a.token_account_owner());
                if owner.as_deref() == Some(deployer) {
                    indicators.push(format!("Deployer holds {:.1}% of observed supply", share));
                }
            }
        }

        for tx in history.iter().filter(|tx| tx.touches_mint(mint)) {
            if tx.all_instructions().any(|ix| is_amm_program(&ix.program_id)) {
                info.has_liquidity = true;
                if is_liquidity_withdrawal(tx) {
                    info.liquidity_pulled = true;
                }
            }
        }
        if info.liquidity_pulled {
            indicators.push("Liquidity removed by deployer".to_string());
        }

        // Concentration alone is enough whatever threshold produced it
        info.is_rugpull = concentrated || DeployedTokenInfo::classify_rugpull(&indicators);
        info.rugpull_indicators = indicators;
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gateway::test_support::gateway;
    use crate::providers::mock::{mint_creation_tx, MockLedger, TxBuilder};
    use crate::utils::constants::TOKEN_2022_PROGRAM;
    use serde_json::json;

    fn analyzer(mock: Arc<MockLedger>) -> DeployerAnalyzer {
        DeployerAnalyzer::new(gateway(mock), ScanLimits::default(), HeuristicWeights::default())
    }

    #[tokio::test]
    async fn test_discovers_top_level_and_inner_mints() {
        let mock = Arc::new(MockLedger::new());
        mock.add_transaction(mint_creation_tx("create1", 100, "Dev", "MintA"));
        mock.add_transaction(
            TxBuilder::new("create2", 200)
                .signer("Dev")
                .inner_parsed(TOKEN_2022_PROGRAM, "initializeMint", json!({ "mint": "MintB" }))
                .build(),
        );
        // Re-initialization of a known mint is deduplicated
        mock.add_transaction(mint_creation_tx("create3", 50, "Dev", "MintA"));

        let check = analyzer(mock).check_deployer("Dev").await;
        assert!(check.is_deployer);
        assert_eq!(check.deployed_tokens, vec!["MintB".to_string(), "MintA".to_string()]);
        assert_eq!(check.analyses.len(), 2);
        // No mint accounts registered: conservative records
        assert!(check.analyses.iter().all(|a| !a.is_rugpull));
    }

    #[tokio::test]
    async fn test_analyze_token_flags_authority_and_concentration() {
        let mock = Arc::new(MockLedger::new());
        mock.add_transaction(mint_creation_tx("create", 1_700_000_000, "Dev", "MintA"));
        mock.add_mint("MintA", Some("Dev"), None, &[("Dev", 800.0), ("Holder", 200.0)]);

        let check = analyzer(mock).check_deployer("Dev").await;
        let token = &check.analyses[0];
        assert_eq!(token.created_at, Some(1_700_000_000));
        assert!(!token.mint_authority_revoked);
        assert!(token.freeze_authority_revoked);
        assert!((token.top_holder_percentage.unwrap() - 80.0).abs() < 1e-9);
        assert_eq!(token.rugpull_indicators.len(), 3);
        assert!(token.is_rugpull);
    }

    #[tokio::test]
    async fn test_concentration_uses_configured_threshold() {
        let mock = Arc::new(MockLedger::new());
        mock.add_transaction(mint_creation_tx("create", 100, "Dev", "MintA"));
        mock.add_mint("MintA", None, None, &[("Whale", 40.0), ("A", 30.0), ("B", 30.0)]);

        let weights = HeuristicWeights {
            top_holder_threshold_pct: 35.0,
            ..HeuristicWeights::default()
        };
        let check = DeployerAnalyzer::new(gateway(mock), ScanLimits::default(), weights)
            .check_deployer("Dev")
            .await;
        let token = &check.analyses[0];
        assert_eq!(
            token.rugpull_indicators,
            vec!["Top holder owns 40.0% of observed supply (>35%)".to_string()]
        );
        assert!(token.is_rugpull);
    }

    #[tokio::test]
    async fn test_clean_token_is_not_rugpull() {
        let mock = Arc::new(MockLedger::new());
        mock.add_transaction(mint_creation_tx("create", 100, "Dev", "MintA"));
        mock.add_mint(
            "MintA",
            None,
            None,
            &[("A", 30.0), ("B", 30.0), ("C", 40.0)],
        );

        let check = analyzer(mock).check_deployer("Dev").await;
        let token = &check.analyses[0];
        assert!(token.mint_authority_revoked);
        assert!(token.rugpull_indicators.is_empty());
        assert!(!token.is_rugpull);
    }

    #[tokio::test]
    async fn test_non_deployer() {
        let mock = Arc::new(MockLedger::new());
        mock.add_transaction(TxBuilder::new("tx", 100).transfer("A", "B", 1.0).build());
        let analyzer = analyzer(mock);
        assert!(!analyzer.check_deployer("B").await.is_deployer);
        assert_eq!(analyzer.count_deployed_tokens("B").await, 0);
    }
}
