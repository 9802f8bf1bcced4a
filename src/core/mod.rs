//! Core Module - Risk Analysis Engine
//!
//! Guarded ledger access (breaker, safe calls, gateway), the individual
//! analyzers, risk aggregation and the scan orchestrator.

pub mod activity;
pub mod circuit_breaker;
pub mod connections;
pub mod deployer;
pub mod funding;
pub mod gateway;
pub mod liquidity;
pub mod risk_score;
pub mod safe_call;
pub mod scanner;

pub use activity::ActivityAnalyzer;
pub use circuit_breaker::{BreakerSignal, CircuitBreaker, CircuitBreakerState, CircuitState};
pub use connections::{ConnectedWalletAnalyzer, InteractionGraph};
pub use deployer::DeployerAnalyzer;
pub use funding::FundingChainTracer;
pub use gateway::LedgerGateway;
pub use liquidity::{is_liquidity_withdrawal, LiquidityRugDetector};
pub use risk_score::{Assessment, RiskAggregator};
pub use safe_call::{CallCounts, SafeCaller};
pub use scanner::{RiskScanner, ScannerStats};
