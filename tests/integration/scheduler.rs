//! Whole-cycle behaviour: isolation, status publishing, admin cleanup.

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use prophet::config::{AgentConfig, CreationConfig};
use prophet::engine::{CreationEngine, CycleScheduler, ResolutionEngine};
use prophet::oracle::OutcomeEvaluator;
use prophet::report;
use prophet::types::MarketCategory;

use crate::mock_ledger::{market, MockLedger};
use crate::mock_sources::{FakeFixtures, FakePrices};

const BTC_105K: &str =
    "Crypto: Will Bitcoin (BTC) reach $105000.00 in next 2 hours? (Current: $103448.28)";

fn scheduler(ledger: Arc<MockLedger>, prices: Arc<FakePrices>) -> CycleScheduler {
    let fixtures = Arc::new(FakeFixtures::default());
    let evaluator = OutcomeEvaluator::new(fixtures.clone(), prices.clone(), 2);
    let resolution = ResolutionEngine::new(ledger.clone(), evaluator, 50, StdDuration::ZERO);
    let creation = CreationEngine::new(
        ledger,
        fixtures,
        prices,
        CreationConfig::default(),
        50,
        StdDuration::ZERO,
    );
    let agent = AgentConfig {
        name: "PROPHET-TEST".into(),
        ..Default::default()
    };
    CycleScheduler::new(resolution, creation, &agent)
        .with_timing(StdDuration::from_secs(3600), StdDuration::from_secs(3600))
}

#[tokio::test]
async fn test_cycle_resolves_then_creates() {
    let ledger = Arc::new(MockLedger::with_markets(vec![market(
        55,
        BTC_105K,
        MarketCategory::Crypto,
        Utc::now() + Duration::hours(1),
    )]));
    let prices = Arc::new(FakePrices::default());
    prices.set_spot("BTC", dec!(106200));
    let mut scheduler = scheduler(ledger.clone(), prices);
    let status = scheduler.subscribe();

    let report = scheduler.run_guarded().await.unwrap();
    assert_eq!(report.cycle_number, 1);
    assert_eq!(report.resolution.resolved, 1);
    // The BTC market was just resolved, so a fresh one is created.
    assert_eq!(report.creation.created, 1);
    assert_eq!(ledger.resolutions(), vec![(55, true)]);

    let snap = status.borrow().clone();
    assert_eq!(snap.agent_name, "PROPHET-TEST");
    assert_eq!(snap.cycles_completed, 1);
    assert_eq!(snap.total_resolved, 1);
    assert_eq!(snap.total_created, 1);
    assert!(snap.last_error.is_none());
}

#[tokio::test]
async fn test_failed_cycle_is_recorded_and_next_cycle_runs() {
    let ledger = Arc::new(MockLedger::default());
    let mut scheduler = scheduler(ledger.clone(), Arc::new(FakePrices::default()));
    let status = scheduler.subscribe();

    ledger.set_read_error(Some("rpc timeout"));
    assert!(scheduler.run_guarded().await.is_err());
    {
        let snap = status.borrow();
        assert_eq!(snap.cycles_failed, 1);
        assert!(snap.last_error.as_deref().unwrap().contains("rpc timeout"));
    }

    ledger.set_read_error(None);
    let report = scheduler.run_guarded().await.unwrap();
    assert_eq!(report.cycle_number, 2);
    assert_eq!(status.borrow().cycles_completed, 1);
    assert!(status.borrow().last_error.is_none());
}

#[tokio::test]
async fn test_panicking_cycle_is_contained() {
    let ledger = Arc::new(MockLedger::default());
    let mut scheduler = scheduler(ledger.clone(), Arc::new(FakePrices::default()));

    ledger.set_panic_on_read(true);
    let err = scheduler.run_guarded().await.unwrap_err();
    assert!(err.to_string().contains("ledger exploded"));

    ledger.set_panic_on_read(false);
    assert!(scheduler.run_guarded().await.is_ok());
}

#[tokio::test]
async fn test_run_until_stops_on_shutdown() {
    let ledger = Arc::new(MockLedger::default());
    let mut scheduler = scheduler(ledger, Arc::new(FakePrices::default()));
    let status = scheduler.subscribe();

    scheduler.run_until(async {}).await;
    assert_eq!(status.borrow().cycles_completed, 1);
}

#[tokio::test]
async fn test_pending_count_is_published() {
    let ledger = Arc::new(MockLedger::with_markets(vec![market(
        3,
        "Football: Liverpool vs Man City (EPL) - Will Liverpool win?",
        MarketCategory::Football,
        Utc::now() - Duration::hours(2),
    )]));
    let mut scheduler = scheduler(ledger, Arc::new(FakePrices::default()));
    let status = scheduler.subscribe();

    scheduler.run_guarded().await.unwrap();
    assert_eq!(status.borrow().pending_resolution, 1);
}

#[tokio::test]
async fn test_cleanup_requires_confirm() {
    let ledger = Arc::new(MockLedger::with_markets(vec![market(
        1,
        BTC_105K,
        MarketCategory::Crypto,
        Utc::now() + Duration::hours(1),
    )]));
    let err = report::cleanup(ledger.clone(), 50, StdDuration::ZERO, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("--confirm"));
    assert!(ledger.writes().is_empty());
}

#[tokio::test]
async fn test_cleanup_force_resolves_open_markets_as_no() {
    let now = Utc::now();
    let mut resolved = market(2, BTC_105K, MarketCategory::Crypto, now);
    resolved.resolved = true;
    let ledger = Arc::new(MockLedger::with_markets(vec![
        market(1, BTC_105K, MarketCategory::Crypto, now + Duration::hours(1)),
        resolved,
        market(3, "anything", MarketCategory::Other("Misc".into()), now),
    ]));

    let outcome = report::cleanup(ledger.clone(), 50, StdDuration::ZERO, true)
        .await
        .unwrap();
    assert_eq!(outcome.attempted, 2);
    assert_eq!(outcome.resolved, 2);
    assert_eq!(ledger.resolutions(), vec![(3, false), (1, false)]);
}
