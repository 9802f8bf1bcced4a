//! Ledger access seam
//!
//! The analyzers only ever talk to a `LedgerClient`. Records follow the
//! ledger's `jsonParsed` encoding so an HTTP provider can deserialize
//! responses straight into them.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::errors::AppResult;

/// Pagination window for `getSignaturesForAddress`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SignatureQuery {
    pub limit: usize,
    /// Start searching backwards from this signature
    pub before: Option<String>,
    /// Stop once this signature is reached
    pub until: Option<String>,
}

impl SignatureQuery {
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn before(limit: usize, before: Option<String>) -> Self {
        Self {
            limit,
            before,
            until: None,
        }
    }
}

/// The five primitives the scanner needs from a ledger node
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Native balance in lamports
    async fn get_balance(&self, address: &str) -> AppResult<u64>;

    /// Newest-first signature history
    async fn get_signatures_for_address(
        &self,
        address: &str,
        query: &SignatureQuery,
    ) -> AppResult<Vec<SignatureInfo>>;

    /// `None` when the node does not know the signature
    async fn get_parsed_transaction(&self, signature: &str)
        -> AppResult<Option<ParsedTransaction>>;

    /// `None` when the account does not exist
    async fn get_parsed_account_info(&self, address: &str)
        -> AppResult<Option<ParsedAccountInfo>>;

    /// Largest token accounts of a mint, biggest first
    async fn get_token_largest_accounts(&self, mint: &str) -> AppResult<Vec<TokenLargestAccount>>;
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================
// SIGNATURES
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub memo: Option<String>,
}

// ============================================
// TRANSACTIONS
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransaction {
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    pub transaction: TransactionBody,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionBody {
    pub signatures: Vec<String>,
    pub message: ParsedMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage {
    pub account_keys: Vec<AccountKey>,
    pub instructions: Vec<ParsedInstruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountKey {
    pub pubkey: String,
    #[serde(default)]
    pub signer: bool,
    #[serde(default)]
    pub writable: bool,
}

/// Either a parsed instruction (`program`, `parsed`) or a partially decoded
/// one (`accounts`, `data`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedInstruction {
    #[serde(default)]
    pub program: Option<String>,
    pub program_id: String,
    #[serde(default)]
    pub parsed: Option<Value>,
    #[serde(default)]
    pub accounts: Option<Vec<String>>,
    #[serde(default)]
    pub data: Option<String>,
}

impl ParsedInstruction {
    /// `parsed.type`, e.g. `initializeMint2`
    pub fn instruction_type(&self) -> Option<&str> {
        self.parsed.as_ref()?.get("type")?.as_str()
    }

    /// `parsed.info`
    pub fn info(&self) -> Option<&Value> {
        self.parsed.as_ref()?.get("info")
    }

    pub fn info_str(&self, field: &str) -> Option<&str> {
        self.info()?.get(field)?.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub pre_balances: Vec<u64>,
    #[serde(default)]
    pub post_balances: Vec<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pre_token_balances: Vec<TokenBalance>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub post_token_balances: Vec<TokenBalance>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub inner_instructions: Vec<InnerInstructions>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub log_messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnerInstructions {
    pub index: u32,
    pub instructions: Vec<ParsedInstruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub account_index: u32,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    pub amount: String,
    pub decimals: u8,
    #[serde(default)]
    pub ui_amount: Option<f64>,
}

impl UiTokenAmount {
    pub fn from_ui(ui_amount: f64, decimals: u8) -> Self {
        Self {
            amount: ((ui_amount * 10f64.powi(decimals as i32)) as u128).to_string(),
            decimals,
            ui_amount: Some(ui_amount),
        }
    }

    /// Human-unit amount, falling back to the raw integer string
    pub fn value(&self) -> f64 {
        self.ui_amount.unwrap_or_else(|| {
            self.amount.parse::<f64>().unwrap_or(0.0) / 10f64.powi(self.decimals as i32)
        })
    }
}

impl ParsedTransaction {
    pub fn signature(&self) -> &str {
        self.transaction
            .signatures
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn account_keys(&self) -> &[AccountKey] {
        &self.transaction.message.account_keys
    }

    /// Signer addresses in message order (fee payer first)
    pub fn signers(&self) -> impl Iterator<Item = &str> {
        self.account_keys()
            .iter()
            .filter(|k| k.signer)
            .map(|k| k.pubkey.as_str())
    }

    pub fn fee_payer(&self) -> Option<&str> {
        self.account_keys().first().map(|k| k.pubkey.as_str())
    }

    pub fn account_index(&self, address: &str) -> Option<usize> {
        self.account_keys().iter().position(|k| k.pubkey == address)
    }

    pub fn is_failed(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.err.is_some())
    }

    /// Net lamport change of the account at `index`
    pub fn lamport_delta_at(&self, index: usize) -> Option<i128> {
        let meta = self.meta.as_ref()?;
        let pre = *meta.pre_balances.get(index)? as i128;
        let post = *meta.post_balances.get(index)? as i128;
        Some(post - pre)
    }

    /// Net lamport change of `address`, `None` when it is not in the message
    pub fn lamport_delta(&self, address: &str) -> Option<i128> {
        self.lamport_delta_at(self.account_index(address)?)
    }

    /// Top-level instructions followed by every inner instruction
    pub fn all_instructions(&self) -> impl Iterator<Item = &ParsedInstruction> {
        let inner = self
            .meta
            .iter()
            .flat_map(|m| m.inner_instructions.iter())
            .flat_map(|group| group.instructions.iter());
        self.transaction.message.instructions.iter().chain(inner)
    }

    pub fn log_messages(&self) -> &[String] {
        self.meta
            .as_ref()
            .map(|m| m.log_messages.as_slice())
            .unwrap_or_default()
    }

    pub fn pre_token_balances(&self) -> &[TokenBalance] {
        self.meta
            .as_ref()
            .map(|m| m.pre_token_balances.as_slice())
            .unwrap_or_default()
    }

    pub fn post_token_balances(&self) -> &[TokenBalance] {
        self.meta
            .as_ref()
            .map(|m| m.post_token_balances.as_slice())
            .unwrap_or_default()
    }

    /// True when any pre/post token balance references `mint`
    pub fn touches_mint(&self, mint: &str) -> bool {
        self.pre_token_balances()
            .iter()
            .chain(self.post_token_balances())
            .any(|b| b.mint == mint)
    }

    /// Token balance of `owner` for `mint` before and after, in human units
    pub fn token_balance_change(&self, owner: &str, mint: &str) -> (f64, f64) {
        let sum = |balances: &[TokenBalance]| -> f64 {
            balances
                .iter()
                .filter(|b| b.mint == mint && b.owner.as_deref() == Some(owner))
                .map(|b| b.ui_token_amount.value())
                .sum()
        };
        (
            sum(self.pre_token_balances()),
            sum(self.post_token_balances()),
        )
    }

    /// Mints whose balances owned by `owner` appear in this transaction
    pub fn owned_mints(&self, owner: &str) -> Vec<String> {
        let mut mints: Vec<String> = Vec::new();
        for balance in self.pre_token_balances().iter().chain(self.post_token_balances()) {
            if balance.owner.as_deref() == Some(owner) && !mints.contains(&balance.mint) {
                mints.push(balance.mint.clone());
            }
        }
        mints
    }
}

// ============================================
// ACCOUNTS
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedAccountInfo {
    pub lamports: u64,
    pub owner: String,
    pub data: AccountData,
    #[serde(default)]
    pub executable: bool,
}

/// Account data (parsed when the node knows the program, raw otherwise)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountData {
    Parsed(ParsedAccountData),
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAccountData {
    pub program: String,
    pub parsed: Value,
    #[serde(default)]
    pub space: u64,
}

/// Fields the scanner reads from a mint account
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MintState {
    pub mint_authority: Option<String>,
    pub freeze_authority: Option<String>,
    pub supply: f64,
    pub decimals: u8,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

impl ParsedAccountInfo {
    fn parsed_info(&self, kind: &str) -> Option<&Value> {
        let AccountData::Parsed(data) = &self.data else {
            return None;
        };
        if data.parsed.get("type")?.as_str()? != kind {
            return None;
        }
        data.parsed.get("info")
    }

    /// Decode a mint account; `None` for anything else
    pub fn mint_state(&self) -> Option<MintState> {
        let info = self.parsed_info("mint")?;
        let decimals = info.get("decimals").and_then(Value::as_u64).unwrap_or(0) as u8;
        let supply = info
            .get("supply")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .map(|raw| raw / 10f64.powi(decimals as i32))
            .unwrap_or(0.0);

        // Token-2022 metadata extension
        let metadata = info
            .get("extensions")
            .and_then(Value::as_array)
            .and_then(|exts| {
                exts.iter().find(|e| {
                    e.get("extension").and_then(Value::as_str) == Some("tokenMetadata")
                })
            })
            .and_then(|e| e.get("state"));
        let meta_str = |field: &str| {
            metadata
                .and_then(|m| m.get(field))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Some(MintState {
            mint_authority: info
                .get("mintAuthority")
                .and_then(Value::as_str)
                .map(str::to_string),
            freeze_authority: info
                .get("freezeAuthority")
                .and_then(Value::as_str)
                .map(str::to_string),
            supply,
            decimals,
            name: meta_str("name"),
            symbol: meta_str("symbol"),
        })
    }

    /// Owner wallet of a token account
    pub fn token_account_owner(&self) -> Option<String> {
        self.parsed_info("account")?
            .get("owner")?
            .as_str()
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLargestAccount {
    pub address: String,
    pub amount: String,
    pub decimals: u8,
    #[serde(default)]
    pub ui_amount: Option<f64>,
}

impl TokenLargestAccount {
    pub fn value(&self) -> f64 {
        self.ui_amount.unwrap_or_else(|| {
            self.amount.parse::<f64>().unwrap_or(0.0) / 10f64.powi(self.decimals as i32)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_parsed_transaction() {
        let raw = serde_json::json!({
            "slot": 250000000u64,
            "blockTime": 1700000000,
            "transaction": {
                "signatures": ["sig1"],
                "message": {
                    "accountKeys": [
                        {"pubkey": "Payer", "signer": true, "writable": true, "source": "transaction"},
                        {"pubkey": "Dest", "signer": false, "writable": true, "source": "transaction"}
                    ],
                    "instructions": [{
                        "program": "system",
                        "programId": "11111111111111111111111111111111",
                        "parsed": {"type": "transfer", "info": {"source": "Payer", "destination": "Dest", "lamports": 5}},
                        "stackHeight": null
                    }]
                }
            },
            "meta": {
                "err": null,
                "fee": 5000,
                "preBalances": [2000000000u64, 0],
                "postBalances": [999995000u64, 1000000000u64],
                "preTokenBalances": [],
                "postTokenBalances": null,
                "innerInstructions": [],
                "logMessages": ["Program 11111111111111111111111111111111 invoke [1]"]
            }
        });

        let tx: ParsedTransaction = serde_json::from_value(raw).unwrap();
        assert_eq!(tx.signature(), "sig1");
        assert_eq!(tx.signers().collect::<Vec<_>>(), vec!["Payer"]);
        assert_eq!(tx.lamport_delta("Dest"), Some(1_000_000_000));
        assert_eq!(tx.lamport_delta("Nobody"), None);
        assert!(!tx.is_failed());
        assert!(tx.post_token_balances().is_empty());
        let ix = tx.all_instructions().next().unwrap();
        assert_eq!(ix.instruction_type(), Some("transfer"));
        assert_eq!(ix.info_str("destination"), Some("Dest"));
    }

    #[test]
    fn test_mint_state_with_metadata_extension() {
        let raw = serde_json::json!({
            "lamports": 1461600,
            "owner": "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb",
            "executable": false,
            "data": {
                "program": "spl-token-2022",
                "space": 82,
                "parsed": {
                    "type": "mint",
                    "info": {
                        "mintAuthority": null,
                        "freezeAuthority": "Dev",
                        "supply": "1000000000",
                        "decimals": 6,
                        "isInitialized": true,
                        "extensions": [{
                            "extension": "tokenMetadata",
                            "state": {"name": "Moon", "symbol": "MOON"}
                        }]
                    }
                }
            }
        });

        let account: ParsedAccountInfo = serde_json::from_value(raw).unwrap();
        let mint = account.mint_state().unwrap();
        assert_eq!(mint.mint_authority, None);
        assert_eq!(mint.freeze_authority.as_deref(), Some("Dev"));
        assert!((mint.supply - 1000.0).abs() < 1e-9);
        assert_eq!(mint.symbol.as_deref(), Some("MOON"));
        assert!(account.token_account_owner().is_none());
    }

    #[test]
    fn test_ui_amount_fallback() {
        let amount = UiTokenAmount {
            amount: "2500000".to_string(),
            decimals: 6,
            ui_amount: None,
        };
        assert!((amount.value() - 2.5).abs() < 1e-9);
    }
}
