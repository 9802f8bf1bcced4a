//! Rug Sentry Library
//!
//! Heuristic rug-pull risk scanner for account-based ledgers:
//! - Deployer analysis of minted tokens (authorities, holder concentration)
//! - Funding chain tracing
//! - Connected wallet graph scoring
//! - Liquidity pull and dump detection
//! - Pooled, circuit-broken RPC access with cached, coalesced lookups

pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::{RiskAggregator, RiskScanner, ScannerStats};
pub use models::{AppError, AppResult, ErrorCode, RiskLevel, ScannerConfig, SecurityReport};
pub use providers::{Blocklist, BlocklistEntry, InMemoryBlocklist, LedgerClient, RpcProvider};
#[cfg(any(test, feature = "test-utils"))]
pub use providers::MockLedger;
pub use utils::{MetricsSink, NoopMetrics, TelemetryCollector};
