//! Rug Sentry - heuristic rug-pull risk scanner
//!
//! Usage: `rug_sentry [--quick] [--json] <ADDRESS>...`
//!
//! Endpoint and tuning come from the environment (`SOLANA_RPC_URL`,
//! `ALCHEMY_API_KEY`, `RUG_SENTRY_*`). Logging honours `RUST_LOG`.

use rug_sentry::utils::constants::{is_valid_address, APP_NAME};
use rug_sentry::{InMemoryBlocklist, RiskScanner, ScannerConfig, TelemetryCollector};

use eyre::{bail, Result};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut deep = true;
    let mut json = false;
    let mut addresses = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--quick" => deep = false,
            "--json" => json = true,
            other => addresses.push(other.to_string()),
        }
    }
    if addresses.is_empty() {
        bail!("usage: rug_sentry [--quick] [--json] <ADDRESS>...");
    }

    println!("\n🛡️  {} v{}\n", APP_NAME, env!("CARGO_PKG_VERSION"));

    let config = ScannerConfig::from_env()?;
    let telemetry = Arc::new(TelemetryCollector::new());
    let scanner = RiskScanner::from_config(
        config,
        Arc::new(InMemoryBlocklist::new()),
        telemetry.clone(),
    )?;

    let run = async {
        for address in &addresses {
            if !is_valid_address(address) {
                warn!("⚠️ {} does not look like a base58 address, skipping", address);
                continue;
            }
            let report = scanner.scan(address, deep).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
            }
        }
        Ok::<(), eyre::Report>(())
    };

    tokio::select! {
        result = run => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\n🛑 Interrupted, shutting down...");
        }
    }

    let stats = telemetry.get_stats();
    println!("\n📊 Session Statistics:");
    println!("   Scans:        {} ({} cached, {} failed)", stats.scans_total, stats.scans_cached, stats.scans_failed);
    println!("   RPC calls:    {} ({:.1}% errors)", stats.rpc_total(), stats.rpc_error_rate());
    println!("   Avg Latency:  {:.0}ms", stats.avg_scan_latency_ms);

    Ok(())
}
