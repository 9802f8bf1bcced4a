//! End-to-end scans against the in-memory ledger

use chrono::Utc;
use rug_sentry::models::types::{PatternSeverity, RugRole, RugType};
use rug_sentry::providers::mock::{mint_creation_tx, TxBuilder};
use rug_sentry::{
    BlocklistEntry, InMemoryBlocklist, MockLedger, NoopMetrics, RiskLevel, RiskScanner,
    ScannerConfig,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn scanner_with(
    mock: Arc<MockLedger>,
    blocklist: Arc<InMemoryBlocklist>,
    config: ScannerConfig,
) -> RiskScanner {
    RiskScanner::new(mock, blocklist, Arc::new(NoopMetrics), config)
}

fn scanner(mock: Arc<MockLedger>) -> RiskScanner {
    scanner_with(mock, Arc::new(InMemoryBlocklist::new()), ScannerConfig::default())
}

fn busy_wallet(mock: &MockLedger, wallet: &str) {
    for i in 0..6 {
        mock.add_transaction(
            TxBuilder::new(&format!("{}-in{}", wallet, i), 1_650_000_000 + i * 3_600)
                .transfer(&format!("Peer{}", i % 3), wallet, 1.0 + i as f64)
                .build(),
        );
    }
    mock.add_transaction(
        TxBuilder::new(&format!("{}-out", wallet), 1_650_100_000)
            .transfer(wallet, "Exchange", 4.0)
            .build(),
    );
}

#[tokio::test]
async fn test_score_and_level_are_consistent() {
    let mock = Arc::new(MockLedger::new());
    busy_wallet(&mock, "Wallet");
    let report = scanner(mock).scan("Wallet", true).await;

    assert!(report.risk_score <= 100);
    assert_eq!(report.risk_level, RiskLevel::from_score(report.risk_score));
    assert!(!report.verdict.is_empty());
    assert!(report.deep_scan);
    assert!(!report.degraded);
}

#[tokio::test]
async fn test_repeat_scan_is_served_from_cache() {
    let mock = Arc::new(MockLedger::new());
    busy_wallet(&mock, "Wallet");
    let scanner = scanner(mock.clone());

    let first = scanner.scan("Wallet", true).await;
    mock.reset_counters();
    let second = scanner.scan("Wallet", true).await;

    assert_eq!(mock.call_count(), 0);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_concurrent_identical_scans_share_one_run() {
    let mock = Arc::new(MockLedger::new());
    busy_wallet(&mock, "Wallet");
    mock.set_delay(Duration::from_millis(5));
    let scanner = scanner(mock);

    let (a, b) = tokio::join!(scanner.scan("Wallet", false), scanner.scan("Wallet", false));
    assert_eq!(a.scan_id, b.scan_id);
}

#[tokio::test]
async fn test_funding_chain_is_bounded_and_unique() {
    let mock = Arc::new(MockLedger::new());
    let start = 1_500_000_000;
    for hop in 0..6i64 {
        mock.add_transaction(
            TxBuilder::new(&format!("fund{}", hop), start - hop * 1_000)
                .transfer(&format!("W{}", hop + 1), &format!("W{}", hop), 2.0)
                .build(),
        );
    }

    let config = ScannerConfig::default();
    let max_hops = config.limits.funding_max_hops;
    let report = scanner_with(mock, Arc::new(InMemoryBlocklist::new()), config)
        .scan("W0", true)
        .await;

    assert_eq!(report.funding_chain.len(), max_hops);
    let unique: HashSet<&String> = report.funding_chain.iter().collect();
    assert_eq!(unique.len(), report.funding_chain.len());
    assert!(!report.funding_chain.contains(&"W0".to_string()));
    assert_eq!(report.funding_source.as_deref(), Some("W1"));
}

#[tokio::test]
async fn test_serial_deployer_with_rugs_is_critical() {
    let mock = Arc::new(MockLedger::new());
    for i in 0..12i64 {
        let mint = format!("Mint{:02}", i);
        mock.add_transaction(mint_creation_tx(&format!("create{}", i), 1_600_000_000 + i * 60, "Dev", &mint));
        if i >= 8 {
            // Newest four keep their mint authority
            mock.add_mint(&mint, Some("Dev"), None, &[("Dev", 900.0), ("Buyer", 100.0)]);
        } else {
            mock.add_mint(&mint, None, None, &[("A", 30.0), ("B", 30.0), ("C", 40.0)]);
        }
    }

    let report = scanner(mock).scan("Dev", true).await;

    assert!(report.is_deployer);
    assert_eq!(report.deployed_tokens.len(), 12);
    assert_eq!(report.token_analyses.len(), 10);
    assert_eq!(report.rugpull_count(), 4);
    let serial = report
        .suspicious_patterns
        .iter()
        .find(|p| p.kind == "serial_deployer")
        .expect("serial deployer pattern");
    assert_eq!(serial.severity, PatternSeverity::Critical);
    assert!(report.risk_score >= 70, "score was {}", report.risk_score);
    assert_eq!(report.risk_level, RiskLevel::Critical);
}

#[tokio::test]
async fn test_young_funder_backed_by_serial_deployer() {
    let mock = Arc::new(MockLedger::new());
    let two_days_ago = Utc::now().timestamp() - 2 * 86_400;
    mock.add_transaction(
        TxBuilder::new("fund-target", two_days_ago + 600)
            .transfer("F1", "Target", 3.0)
            .build(),
    );
    mock.add_transaction(
        TxBuilder::new("fund-f1", two_days_ago)
            .transfer("F2", "F1", 10.0)
            .build(),
    );
    for i in 0..8i64 {
        mock.add_transaction(mint_creation_tx(
            &format!("f2-mint{}", i),
            1_600_000_000 + i,
            "F2",
            &format!("F2Mint{}", i),
        ));
    }

    let report = scanner(mock).scan("Target", true).await;

    assert_eq!(report.funding_chain, vec!["F1".to_string(), "F2".to_string()]);
    assert_eq!(report.funding_source.as_deref(), Some("F1"));
    assert_eq!(report.funding_source_risk, RiskLevel::Critical);
    assert!(report.has_pattern("risky_funding"));
    assert!(report
        .score_breakdown
        .iter()
        .any(|f| f.name == "funding" && f.score == 25));
}

#[tokio::test]
async fn test_major_funder_connection() {
    let mock = Arc::new(MockLedger::new());
    for (i, amount) in [10.0, 10.0, 10.0, 10.0, 10.0, 5.0, 5.0].iter().enumerate() {
        mock.add_transaction(
            TxBuilder::new(&format!("in{}", i), 1_650_000_000 + i as i64 * 600)
                .transfer("Whale", "Target", *amount)
                .build(),
        );
    }
    mock.add_transaction(
        TxBuilder::new("back", 1_650_010_000)
            .transfer("Target", "Whale", 0.2)
            .build(),
    );

    let report = scanner(mock).scan("Target", true).await;
    let whale = report
        .connected_wallets
        .iter()
        .find(|w| w.address == "Whale")
        .expect("whale is connected");

    assert_eq!(whale.data.interaction_count, 8);
    assert!((whale.data.sent - 60.0).abs() < 1e-6);
    assert!((whale.data.received - 0.2).abs() < 1e-6);
    assert_eq!(whale.pattern.as_deref(), Some("major_funder"));
    assert_eq!(whale.risk_level, RiskLevel::Medium);
    assert_eq!(report.risky_connection_count, 0);
}

#[tokio::test]
async fn test_connected_rugger_raises_report() {
    let mock = Arc::new(MockLedger::new());
    busy_wallet(&mock, "Wallet");
    let blocklist = Arc::new(InMemoryBlocklist::new());
    blocklist.insert(
        "Peer1",
        BlocklistEntry::listed("Rugged MOON").with_involvement("Moon", RugType::LpPull, RugRole::LpRemover),
    );

    let report = scanner_with(mock, blocklist, ScannerConfig::default())
        .scan("Wallet", true)
        .await;

    assert_eq!(report.connected_wallets[0].address, "Peer1");
    assert_eq!(report.risky_connection_count, 1);
    assert!(report.has_pattern("connected_to_rugger"));
    assert!(report.risk_score >= 10);
}

#[tokio::test(start_paused = true)]
async fn test_all_calls_timing_out_falls_back_to_blocklist() {
    let mock = Arc::new(MockLedger::new());
    busy_wallet(&mock, "Wallet");
    mock.set_delay(Duration::from_secs(120));
    let blocklist = Arc::new(InMemoryBlocklist::new());
    blocklist.insert("Wallet", BlocklistEntry::listed("Reported scam").malicious());

    let config = ScannerConfig::default();
    let deadline = config.limits.scan_deadline;
    let scanner = scanner_with(mock, blocklist, config);

    let started = Instant::now();
    let report = scanner.scan("Wallet", true).await;

    assert!(started.elapsed() <= deadline + Duration::from_secs(1));
    assert!(report.degraded);
    assert_ne!(report.risk_level, RiskLevel::Unknown);
    assert!(report.has_blacklist_history);
    assert!(report.malicious_activity);
    assert_eq!(report.risk_level, RiskLevel::Critical);
    assert!(report.warnings.iter().any(|w| w.starts_with("Scan incomplete")));
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_scan_stops_calling_the_ledger() {
    let mock = Arc::new(MockLedger::new());
    busy_wallet(&mock, "Alpha");
    mock.set_delay(Duration::from_millis(400));

    let mut config = ScannerConfig::default();
    config.limits.scan_deadline = Duration::from_secs(2);
    config.limits.fetch_concurrency = 1;
    let scanner = scanner_with(mock.clone(), Arc::new(InMemoryBlocklist::new()), config);

    let report = scanner.scan("Alpha", true).await;
    assert!(report.degraded);

    // Let the abandoned task drain whatever it already had in flight
    tokio::time::sleep(Duration::from_secs(1)).await;
    let settled = mock.call_count();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(mock.call_count(), settled);
    assert!(!scanner.stats().scan_in_progress);
}

#[tokio::test]
async fn test_scans_never_overlap() {
    let mock = Arc::new(MockLedger::new());
    busy_wallet(&mock, "Alpha");
    busy_wallet(&mock, "Beta");
    mock.set_delay(Duration::from_millis(10));

    let mut config = ScannerConfig::default();
    config.limits.fetch_concurrency = 1;
    config.limits.connection_concurrency = 1;
    let scanner = scanner_with(mock.clone(), Arc::new(InMemoryBlocklist::new()), config);

    let (alpha, beta) = tokio::join!(scanner.scan("Alpha", false), scanner.scan("Beta", false));

    assert_eq!(alpha.address, "Alpha");
    assert_eq!(beta.address, "Beta");
    // One scan runs its deployer and activity fetches side by side, never more
    assert!(mock.max_concurrency() <= 2, "peak was {}", mock.max_concurrency());
}

#[tokio::test]
async fn test_pre_scan_warms_cache() {
    let mock = Arc::new(MockLedger::new());
    busy_wallet(&mock, "Wallet");
    let scanner = scanner(mock.clone());

    scanner.pre_scan("Wallet").await.unwrap().unwrap();
    mock.reset_counters();
    let report = scanner.scan("Wallet", false).await;

    assert_eq!(mock.call_count(), 0);
    assert!(report.deep_scan);
}
