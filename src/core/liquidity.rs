//! Liquidity-pull detection
//!
//! Walks recent history oldest-first looking for AMM withdrawals signed by
//! the address, token burns it authorized, and single transactions that
//! drop an owned token balance by a large share of its observed peak.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::core::gateway::LedgerGateway;
use crate::models::config::{HeuristicWeights, ScanLimits};
use crate::models::types::{LiquidityRugCheck, RugType};
use crate::providers::ledger::ParsedTransaction;
use crate::utils::constants::{is_amm_program, is_token_program, lamports_to_sol, mentions_withdrawal};

/// True when the transaction hits an AMM and something in it reads like a
/// liquidity withdrawal (parsed instruction type or program log)
pub fn is_liquidity_withdrawal(tx: &ParsedTransaction) -> bool {
    let mut touches_amm = false;
    for ix in tx.all_instructions() {
        if is_amm_program(&ix.program_id) {
            touches_amm = true;
            if ix.instruction_type().is_some_and(mentions_withdrawal) {
                return true;
            }
        }
    }
    touches_amm && tx.log_messages().iter().any(|line| mentions_withdrawal(line))
}

/// Number of token burns authorized by `address`
fn burns_by(tx: &ParsedTransaction, address: &str) -> usize {
    tx.all_instructions()
        .filter(|ix| is_token_program(&ix.program_id))
        .filter(|ix| matches!(ix.instruction_type(), Some("burn") | Some("burnChecked")))
        .filter(|ix| {
            ix.info_str("authority") == Some(address)
                || ix.info_str("multisigAuthority") == Some(address)
        })
        .count()
}

#[derive(Clone)]
pub struct LiquidityRugDetector {
    gateway: LedgerGateway,
    limits: ScanLimits,
    weights: HeuristicWeights,
}

impl LiquidityRugDetector {
    pub fn new(gateway: LedgerGateway, limits: ScanLimits, weights: HeuristicWeights) -> Self {
        Self {
            gateway,
            limits,
            weights,
        }
    }

    pub async fn check(&self, address: &str) -> LiquidityRugCheck {
        let txs = self
            .gateway
            .recent_transactions(address, self.limits.recent_signature_limit)
            .await;
        let result = self.evaluate(address, txs.iter().rev().map(|tx| tx.as_ref()));

        if result.is_lp_rugger {
            info!(
                "🚨 {} withdrew liquidity {} times ({:.2} SOL)",
                address, result.withdrawal_count, result.total_withdrawn
            );
        } else {
            debug!("💧 No liquidity pulls found for {}", address);
        }
        result
    }

    /// Pure evaluation over transactions in chronological order
    pub fn evaluate<'a>(
        &self,
        address: &str,
        chronological: impl Iterator<Item = &'a ParsedTransaction>,
    ) -> LiquidityRugCheck {
        let mut result = LiquidityRugCheck::default();
        let mut peaks: HashMap<String, f64> = HashMap::new();

        for tx in chronological {
            if tx.is_failed() {
                continue;
            }
            let signed = tx.signers().any(|s| s == address);

            if signed && is_liquidity_withdrawal(tx) {
                let gained = tx.lamport_delta(address).unwrap_or(0).max(0);
                let amount = lamports_to_sol(gained);
                result.withdrawal_count += 1;
                result.total_withdrawn += amount;
                result.evidence.push(format!(
                    "LP withdrawal in {} (+{:.3} SOL)",
                    tx.signature(),
                    amount
                ));
                if result.first_withdrawal_at.is_none() {
                    result.first_withdrawal_at = tx.block_time;
                }
            }

            let burns = burns_by(tx, address);
            if burns > 0 {
                result.burn_count += burns;
                result
                    .evidence
                    .push(format!("Token burn authorized in {}", tx.signature()));
            }

            for mint in tx.owned_mints(address) {
                let (pre, post) = tx.token_balance_change(address, &mint);
                let peak = peaks.entry(mint.clone()).or_insert(0.0);
                *peak = peak.max(pre).max(post);
                let dropped = pre - post;
                if dropped > 0.0 && *peak > 0.0 && dropped >= self.weights.dump_fraction * *peak {
                    result.dump_count += 1;
                    result.evidence.push(format!(
                        "Dumped {:.0}% of peak {} balance in {}",
                        dropped / *peak * 100.0,
                        mint,
                        tx.signature()
                    ));
                }
            }
        }

        result.is_lp_rugger = result.withdrawal_count > 0;
        result.rug_type = if result.is_lp_rugger {
            RugType::LpPull
        } else if result.dump_count > 0 {
            RugType::DevDump
        } else {
            RugType::None
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gateway::test_support::gateway;
    use crate::providers::mock::{MockLedger, TxBuilder};
    use crate::utils::constants::{RAYDIUM_AMM_PROGRAM, TOKEN_PROGRAM};
    use serde_json::json;
    use std::sync::Arc;

    fn detector(mock: Arc<MockLedger>) -> LiquidityRugDetector {
        LiquidityRugDetector::new(
            gateway(mock),
            ScanLimits::default(),
            HeuristicWeights::default(),
        )
    }

    #[tokio::test]
    async fn test_detects_withdrawal_and_dump() {
        let mock = Arc::new(MockLedger::new());
        mock.add_transaction(
            TxBuilder::new("buy", 100)
                .signer("Dev")
                .token_balance("Dev", "MintA", 0.0, 1_000.0)
                .build(),
        );
        mock.add_transaction(
            TxBuilder::new("pull", 200)
                .signer("Dev")
                .transfer("Pool", "Dev", 40.0)
                .raw(RAYDIUM_AMM_PROGRAM, &["Pool", "Dev"])
                .log("Program log: Instruction: Withdraw")
                .build(),
        );
        mock.add_transaction(
            TxBuilder::new("dump", 300)
                .signer("Dev")
                .token_balance("Dev", "MintA", 1_000.0, 100.0)
                .parsed(TOKEN_PROGRAM, "burnChecked", json!({ "authority": "Dev", "mint": "MintA" }))
                .build(),
        );

        let result = detector(mock).check("Dev").await;
        assert!(result.is_lp_rugger);
        assert_eq!(result.rug_type, RugType::LpPull);
        assert_eq!(result.withdrawal_count, 1);
        assert!((result.total_withdrawn - 40.0).abs() < 1e-6);
        assert_eq!(result.first_withdrawal_at, Some(200));
        assert_eq!(result.dump_count, 1);
        assert_eq!(result.burn_count, 1);
    }

    #[tokio::test]
    async fn test_swap_is_not_withdrawal() {
        let mock = Arc::new(MockLedger::new());
        mock.add_transaction(
            TxBuilder::new("swap", 100)
                .signer("Trader")
                .raw(RAYDIUM_AMM_PROGRAM, &["Pool", "Trader"])
                .log("Program log: Instruction: SwapBaseIn")
                .token_balance("Trader", "MintA", 500.0, 400.0)
                .build(),
        );

        let result = detector(mock).check("Trader").await;
        assert!(!result.is_lp_rugger);
        assert_eq!(result.dump_count, 0);
        assert_eq!(result.rug_type, RugType::None);
    }
}
