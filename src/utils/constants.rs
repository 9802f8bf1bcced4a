//! Constants Module - Single Source of Truth
//!
//! Program IDs, address prefixes and unit conversions shared by the analyzers.
//! Tunable thresholds live in `models::config` instead.

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "RugSentry";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for HTTP requests
pub const USER_AGENT: &str = concat!("RugSentry/", env!("CARGO_PKG_VERSION"));

// ============================================
// RPC CONSTANTS
// ============================================

/// Default timeout for pooled RPC clients (seconds)
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 15;

/// Default report cache TTL (seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Alchemy Solana mainnet endpoint prefix (key appended)
pub const SOLANA_ALCHEMY_URL_PREFIX: &str = "https://solana-mainnet.g.alchemy.com/v2/";

/// JSON-RPC error codes providers use for rate limiting
pub const RPC_RATE_LIMIT_CODES: [i64; 2] = [-32005, -32429];

// ============================================
// LEDGER UNITS
// ============================================

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Convert lamports to whole units
#[inline]
pub fn lamports_to_sol(lamports: i128) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL
}

/// Seconds per day, used for age math
pub const SECS_PER_DAY: f64 = 86_400.0;

// ============================================
// PROGRAM IDS
// ============================================

/// SPL Token program
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Token-2022 program
pub const TOKEN_2022_PROGRAM: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// Associated Token program
pub const ASSOCIATED_TOKEN_PROGRAM: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

/// System program
pub const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";

/// Compute budget program
pub const COMPUTE_BUDGET_PROGRAM: &str = "ComputeBudget111111111111111111111111111111";

/// Raydium AMM v4
pub const RAYDIUM_AMM_PROGRAM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

/// Raydium CLMM
pub const RAYDIUM_CLMM_PROGRAM: &str = "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK";

/// Raydium CPMM
pub const RAYDIUM_CPMM_PROGRAM: &str = "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C";

/// Orca Whirlpool
pub const ORCA_WHIRLPOOL_PROGRAM: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";

/// Meteora DLMM
pub const METEORA_DLMM_PROGRAM: &str = "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo";

/// Jupiter aggregator (swap routing, not a pool)
pub const JUPITER_PROGRAM: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";

/// Token programs that can initialize mints
pub const TOKEN_PROGRAMS: [&str; 2] = [TOKEN_PROGRAM, TOKEN_2022_PROGRAM];

/// AMM programs whose instructions move pool liquidity
pub const AMM_PROGRAMS: [&str; 5] = [
    RAYDIUM_AMM_PROGRAM,
    RAYDIUM_CLMM_PROGRAM,
    RAYDIUM_CPMM_PROGRAM,
    ORCA_WHIRLPOOL_PROGRAM,
    METEORA_DLMM_PROGRAM,
];

/// Address prefixes that belong to programs/sysvars rather than wallets
pub const SYSTEM_PREFIXES: [&str; 6] = [
    "11111111",
    "Sysvar",
    "Token",
    "ATokenGP",
    "ComputeBudget",
    "Vote111",
];

/// Log/instruction fragments that mark a liquidity withdrawal
pub const WITHDRAW_MARKERS: [&str; 4] = [
    "withdraw",
    "removeliquidity",
    "remove_liquidity",
    "decreaseliquidity",
];

// ============================================
// HELPERS
// ============================================

/// True for program/sysvar namespaces that never represent a counterparty
pub fn is_system_address(address: &str) -> bool {
    SYSTEM_PREFIXES.iter().any(|p| address.starts_with(p))
        || AMM_PROGRAMS.contains(&address)
        || address == JUPITER_PROGRAM
}

pub fn is_amm_program(program_id: &str) -> bool {
    AMM_PROGRAMS.contains(&program_id)
}

pub fn is_token_program(program_id: &str) -> bool {
    TOKEN_PROGRAMS.contains(&program_id)
}

/// Case-insensitive match against withdraw markers, ignoring spaces
pub fn mentions_withdrawal(text: &str) -> bool {
    let normalized: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    WITHDRAW_MARKERS.iter().any(|m| normalized.contains(m))
}

/// Cheap base58 shape check, no decoding
pub fn is_valid_address(address: &str) -> bool {
    (32..=44).contains(&address.len())
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l'))
}
