//! In-memory ledger for tests
//!
//! Transactions added through `add_transaction` are indexed into the
//! signature history of every account they reference, newest first.
//! The ledger counts calls, tracks peak concurrency and can inject latency
//! or failures.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::models::errors::{AppError, AppResult};
use crate::providers::ledger::{
    AccountData, AccountKey, InnerInstructions, LedgerClient, ParsedAccountData,
    ParsedAccountInfo, ParsedInstruction, ParsedMessage, ParsedTransaction, SignatureInfo,
    SignatureQuery, TokenBalance, TokenLargestAccount, TransactionBody, TransactionMeta,
    UiTokenAmount,
};
use crate::utils::constants::{LAMPORTS_PER_SOL, SYSTEM_PROGRAM, TOKEN_PROGRAM};

#[derive(Default)]
struct MockState {
    balances: HashMap<String, u64>,
    /// Newest first
    histories: HashMap<String, Vec<SignatureInfo>>,
    transactions: HashMap<String, ParsedTransaction>,
    accounts: HashMap<String, ParsedAccountInfo>,
    largest: HashMap<String, Vec<TokenLargestAccount>>,
}

#[derive(Default)]
pub struct MockLedger {
    state: Mutex<MockState>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    delay: Mutex<Duration>,
    failure: Mutex<Option<AppError>>,
}

/// Decrements the active-call gauge on every exit path
struct ActiveCall<'a>(&'a AtomicUsize);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Index a transaction into the history of every referenced account
    pub fn add_transaction(&self, tx: ParsedTransaction) {
        let mut state = self.state();
        let info = SignatureInfo {
            signature: tx.signature().to_string(),
            slot: tx.slot,
            err: tx.meta.as_ref().and_then(|m| m.err.clone()),
            block_time: tx.block_time,
            memo: None,
        };
        for key in tx.account_keys() {
            let history = state.histories.entry(key.pubkey.clone()).or_default();
            if history.iter().any(|s| s.signature == info.signature) {
                continue;
            }
            history.push(info.clone());
            history.sort_by(|a, b| {
                (b.block_time, b.slot, &b.signature).cmp(&(a.block_time, a.slot, &a.signature))
            });
        }
        state.transactions.insert(info.signature.clone(), tx);
    }

    pub fn set_balance(&self, address: &str, lamports: u64) {
        self.state().balances.insert(address.to_string(), lamports);
    }

    pub fn set_account(&self, address: &str, account: ParsedAccountInfo) {
        self.state().accounts.insert(address.to_string(), account);
    }

    pub fn set_largest_accounts(&self, mint: &str, accounts: Vec<TokenLargestAccount>) {
        self.state().largest.insert(mint.to_string(), accounts);
    }

    /// Register a mint account plus its holders in one go.
    ///
    /// `holders` is `(owner, amount)`; a token account per owner is created.
    pub fn add_mint(
        &self,
        mint: &str,
        mint_authority: Option<&str>,
        freeze_authority: Option<&str>,
        holders: &[(&str, f64)],
    ) {
        let supply: f64 = holders.iter().map(|(_, amount)| amount).sum();
        self.set_account(mint, mint_account(mint_authority, freeze_authority, supply, 6));
        let mut largest = Vec::new();
        for (owner, amount) in holders {
            let token_account = format!("{}:{}", mint, owner);
            self.set_account(&token_account, token_account_info(owner, mint, *amount, 6));
            largest.push(TokenLargestAccount {
                address: token_account,
                amount: ((amount * 1e6) as u128).to_string(),
                decimals: 6,
                ui_amount: Some(*amount),
            });
        }
        largest.sort_by(|a, b| b.value().total_cmp(&a.value()));
        self.set_largest_accounts(mint, largest);
    }

    /// Added latency per call
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Fail every call with `error` (None restores normal service)
    pub fn fail_with(&self, error: Option<AppError>) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Peak number of calls in flight at once
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.calls.store(0, Ordering::SeqCst);
        self.max_active.store(0, Ordering::SeqCst);
    }

    async fn enter(&self) -> AppResult<ActiveCall<'_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let guard = ActiveCall(&self.active);

        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(guard),
        }
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_balance(&self, address: &str) -> AppResult<u64> {
        let _call = self.enter().await?;
        Ok(self.state().balances.get(address).copied().unwrap_or(0))
    }

    async fn get_signatures_for_address(
        &self,
        address: &str,
        query: &SignatureQuery,
    ) -> AppResult<Vec<SignatureInfo>> {
        let _call = self.enter().await?;
        let state = self.state();
        let Some(history) = state.histories.get(address) else {
            return Ok(Vec::new());
        };
        let start = match &query.before {
            Some(before) => match history.iter().position(|s| &s.signature == before) {
                Some(index) => index + 1,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };
        Ok(history
            .iter()
            .skip(start)
            .take_while(|s| query.until.as_deref() != Some(s.signature.as_str()))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn get_parsed_transaction(
        &self,
        signature: &str,
    ) -> AppResult<Option<ParsedTransaction>> {
        let _call = self.enter().await?;
        Ok(self.state().transactions.get(signature).cloned())
    }

    async fn get_parsed_account_info(
        &self,
        address: &str,
    ) -> AppResult<Option<ParsedAccountInfo>> {
        let _call = self.enter().await?;
        Ok(self.state().accounts.get(address).cloned())
    }

    async fn get_token_largest_accounts(&self, mint: &str) -> AppResult<Vec<TokenLargestAccount>> {
        let _call = self.enter().await?;
        Ok(self.state().largest.get(mint).cloned().unwrap_or_default())
    }
}

// ============================================
// FIXTURE BUILDERS
// ============================================

const DEFAULT_STARTING_LAMPORTS: u64 = 100 * LAMPORTS_PER_SOL as u64;

/// Builds `jsonParsed`-shaped transactions
pub struct TxBuilder {
    signature: String,
    block_time: i64,
    keys: Vec<AccountKey>,
    pre: Vec<u64>,
    post: Vec<u64>,
    instructions: Vec<ParsedInstruction>,
    inner: Vec<ParsedInstruction>,
    pre_tokens: Vec<TokenBalance>,
    post_tokens: Vec<TokenBalance>,
    logs: Vec<String>,
    err: Option<Value>,
}

impl TxBuilder {
    pub fn new(signature: &str, block_time: i64) -> Self {
        Self {
            signature: signature.to_string(),
            block_time,
            keys: Vec::new(),
            pre: Vec::new(),
            post: Vec::new(),
            instructions: Vec::new(),
            inner: Vec::new(),
            pre_tokens: Vec::new(),
            post_tokens: Vec::new(),
            logs: Vec::new(),
            err: None,
        }
    }

    fn key_index(&mut self, address: &str, signer: bool) -> usize {
        if let Some(index) = self.keys.iter().position(|k| k.pubkey == address) {
            if signer {
                self.keys[index].signer = true;
            }
            return index;
        }
        self.keys.push(AccountKey {
            pubkey: address.to_string(),
            signer,
            writable: true,
        });
        self.pre.push(DEFAULT_STARTING_LAMPORTS);
        self.post.push(DEFAULT_STARTING_LAMPORTS);
        self.keys.len() - 1
    }

    pub fn signer(mut self, address: &str) -> Self {
        self.key_index(address, true);
        self
    }

    pub fn account(mut self, address: &str) -> Self {
        self.key_index(address, false);
        self
    }

    /// Native transfer signed by `from`
    pub fn transfer(mut self, from: &str, to: &str, sol: f64) -> Self {
        let lamports = (sol * LAMPORTS_PER_SOL) as u64;
        let from_index = self.key_index(from, true);
        let to_index = self.key_index(to, false);
        self.post[from_index] = self.post[from_index].saturating_sub(lamports);
        self.post[to_index] += lamports;
        self.instructions.push(ParsedInstruction {
            program: Some("system".to_string()),
            program_id: SYSTEM_PROGRAM.to_string(),
            parsed: Some(json!({
                "type": "transfer",
                "info": { "source": from, "destination": to, "lamports": lamports }
            })),
            accounts: None,
            data: None,
        });
        self
    }

    /// Parsed instruction, e.g. `initializeMint2` under the token program
    pub fn parsed(mut self, program_id: &str, kind: &str, info: Value) -> Self {
        self.instructions.push(parsed_instruction(program_id, kind, info));
        self
    }

    pub fn inner_parsed(mut self, program_id: &str, kind: &str, info: Value) -> Self {
        self.inner.push(parsed_instruction(program_id, kind, info));
        self
    }

    /// Undecoded instruction against `program_id`
    pub fn raw(mut self, program_id: &str, accounts: &[&str]) -> Self {
        self.key_index(program_id, false);
        self.instructions.push(ParsedInstruction {
            program: None,
            program_id: program_id.to_string(),
            parsed: None,
            accounts: Some(accounts.iter().map(|a| a.to_string()).collect()),
            data: Some(String::new()),
        });
        self
    }

    /// Token balance of `owner` for `mint` before and after
    pub fn token_balance(mut self, owner: &str, mint: &str, pre: f64, post: f64) -> Self {
        let token_account = format!("{}:{}", mint, owner);
        let index = self.key_index(&token_account, false) as u32;
        let balance = |amount: f64| TokenBalance {
            account_index: index,
            mint: mint.to_string(),
            owner: Some(owner.to_string()),
            ui_token_amount: UiTokenAmount::from_ui(amount, 6),
        };
        self.pre_tokens.push(balance(pre));
        self.post_tokens.push(balance(post));
        self
    }

    pub fn log(mut self, line: &str) -> Self {
        self.logs.push(line.to_string());
        self
    }

    pub fn failed(mut self) -> Self {
        self.err = Some(json!({ "InstructionError": [0, "Custom"] }));
        self
    }

    pub fn build(self) -> ParsedTransaction {
        let inner_instructions = if self.inner.is_empty() {
            Vec::new()
        } else {
            vec![InnerInstructions {
                index: 0,
                instructions: self.inner,
            }]
        };
        ParsedTransaction {
            slot: self.block_time.max(0) as u64,
            block_time: Some(self.block_time),
            transaction: TransactionBody {
                signatures: vec![self.signature],
                message: ParsedMessage {
                    account_keys: self.keys,
                    instructions: self.instructions,
                },
            },
            meta: Some(TransactionMeta {
                err: self.err,
                fee: 5_000,
                pre_balances: self.pre,
                post_balances: self.post,
                pre_token_balances: self.pre_tokens,
                post_token_balances: self.post_tokens,
                inner_instructions,
                log_messages: self.logs,
            }),
        }
    }
}

fn parsed_instruction(program_id: &str, kind: &str, info: Value) -> ParsedInstruction {
    ParsedInstruction {
        program: Some("spl-token".to_string()),
        program_id: program_id.to_string(),
        parsed: Some(json!({ "type": kind, "info": info })),
        accounts: None,
        data: None,
    }
}

/// `initializeMint2` transaction signed by `deployer`
pub fn mint_creation_tx(signature: &str, block_time: i64, deployer: &str, mint: &str) -> ParsedTransaction {
    TxBuilder::new(signature, block_time)
        .signer(deployer)
        .account(mint)
        .parsed(
            TOKEN_PROGRAM,
            "initializeMint2",
            json!({ "mint": mint, "decimals": 6, "mintAuthority": deployer, "freezeAuthority": null }),
        )
        .build()
}

pub fn mint_account(
    mint_authority: Option<&str>,
    freeze_authority: Option<&str>,
    supply: f64,
    decimals: u8,
) -> ParsedAccountInfo {
    ParsedAccountInfo {
        lamports: 1_461_600,
        owner: TOKEN_PROGRAM.to_string(),
        executable: false,
        data: AccountData::Parsed(ParsedAccountData {
            program: "spl-token".to_string(),
            space: 82,
            parsed: json!({
                "type": "mint",
                "info": {
                    "mintAuthority": mint_authority,
                    "freezeAuthority": freeze_authority,
                    "supply": ((supply * 10f64.powi(decimals as i32)) as u128).to_string(),
                    "decimals": decimals,
                    "isInitialized": true
                }
            }),
        }),
    }
}

pub fn token_account_info(owner: &str, mint: &str, amount: f64, decimals: u8) -> ParsedAccountInfo {
    ParsedAccountInfo {
        lamports: 2_039_280,
        owner: TOKEN_PROGRAM.to_string(),
        executable: false,
        data: AccountData::Parsed(ParsedAccountData {
            program: "spl-token".to_string(),
            space: 165,
            parsed: json!({
                "type": "account",
                "info": {
                    "mint": mint,
                    "owner": owner,
                    "tokenAmount": {
                        "amount": ((amount * 10f64.powi(decimals as i32)) as u128).to_string(),
                        "decimals": decimals,
                        "uiAmount": amount
                    }
                }
            }),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_is_newest_first_and_paginates() {
        let ledger = MockLedger::new();
        for i in 0..5 {
            ledger.add_transaction(
                TxBuilder::new(&format!("sig{}", i), 1_000 + i)
                    .transfer("Funder", "Wallet", 1.0)
                    .build(),
            );
        }

        let page = ledger
            .get_signatures_for_address("Wallet", &SignatureQuery::recent(2))
            .await
            .unwrap();
        let sigs: Vec<_> = page.iter().map(|s| s.signature.as_str()).collect();
        assert_eq!(sigs, vec!["sig4", "sig3"]);

        let next = ledger
            .get_signatures_for_address(
                "Wallet",
                &SignatureQuery::before(10, Some("sig3".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(next.len(), 3);
        assert_eq!(next.last().unwrap().signature, "sig0");
        assert_eq!(ledger.call_count(), 2);
    }

    #[tokio::test]
    async fn test_transfer_balances() {
        let tx = TxBuilder::new("sig", 10)
            .transfer("A", "B", 2.5)
            .build();
        assert_eq!(tx.lamport_delta("A"), Some(-2_500_000_000));
        assert_eq!(tx.lamport_delta("B"), Some(2_500_000_000));
        assert_eq!(tx.signers().collect::<Vec<_>>(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let ledger = MockLedger::new();
        ledger.fail_with(Some(AppError::rpc_rate_limited()));
        assert!(ledger.get_balance("x").await.is_err());
        ledger.fail_with(None);
        assert_eq!(ledger.get_balance("x").await.unwrap(), 0);
    }
}
