//! Resolution pass against the in-memory ledger and fake sources.

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use prophet::engine::ResolutionEngine;
use prophet::ledger::DryRunLedger;
use prophet::oracle::OutcomeEvaluator;
use prophet::types::MarketCategory;

use crate::mock_ledger::{market, LedgerWrite, MockLedger};
use crate::mock_sources::{FakeFixtures, FakePrices};

const LIVERPOOL_CITY: &str = "Football: Liverpool vs Man City (EPL) - Will Liverpool win?";
const BTC_105K: &str =
    "Crypto: Will Bitcoin (BTC) reach $105000.00 in next 2 hours? (Current: $103448.28)";

struct Harness {
    ledger: Arc<MockLedger>,
    fixtures: Arc<FakeFixtures>,
    prices: Arc<FakePrices>,
    engine: ResolutionEngine,
}

fn harness(ledger: MockLedger) -> Harness {
    let ledger = Arc::new(ledger);
    let fixtures = Arc::new(FakeFixtures::default());
    let prices = Arc::new(FakePrices::default());
    let evaluator = OutcomeEvaluator::new(fixtures.clone(), prices.clone(), 2);
    let engine = ResolutionEngine::new(ledger.clone(), evaluator, 50, std::time::Duration::ZERO);
    Harness {
        ledger,
        fixtures,
        prices,
        engine,
    }
}

#[tokio::test]
async fn test_finished_fixture_resolves_once() {
    let now = Utc::now();
    let h = harness(MockLedger::with_markets(vec![market(
        41,
        LIVERPOOL_CITY,
        MarketCategory::Football,
        now - Duration::hours(1),
    )]));
    h.fixtures.add_result("Liverpool", "Manchester City", 2, 1);

    let report = h.engine.run_pass(now).await.unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(report.early_resolved, 0);
    assert_eq!(h.ledger.resolutions(), vec![(41, true)]);

    // Second pass sees the market as resolved and writes nothing.
    let report = h.engine.run_pass(now).await.unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(h.ledger.resolutions(), vec![(41, true)]);
}

#[tokio::test]
async fn test_unreadable_market_does_not_block_the_rest() {
    let now = Utc::now();
    let h = harness(MockLedger::with_markets(vec![
        market(1, LIVERPOOL_CITY, MarketCategory::Football, now - Duration::hours(1)),
        market(2, BTC_105K, MarketCategory::Crypto, now + Duration::hours(1)),
        market(3, BTC_105K, MarketCategory::Crypto, now + Duration::hours(1)),
    ]));
    h.ledger.break_market(3);
    h.fixtures.add_result("Liverpool", "Man City", 2, 1);
    h.prices.set_spot("BTC", dec!(106200));

    let report = h.engine.run_pass(now).await.unwrap();
    assert_eq!(report.unreadable, 1);
    assert_eq!(report.scanned, 2);
    assert_eq!(report.resolved, 2);
    assert_eq!(h.ledger.resolutions(), vec![(2, true), (1, true)]);

    // Still skipped, not fatal, on the next pass.
    let report = h.engine.run_pass(now).await.unwrap();
    assert_eq!(report.unreadable, 1);
    assert_eq!(report.resolved, 0);
}

#[tokio::test]
async fn test_crypto_resolves_early_when_spot_clears_target() {
    let now = Utc::now();
    let h = harness(MockLedger::with_markets(vec![market(
        55,
        BTC_105K,
        MarketCategory::Crypto,
        now + Duration::hours(1),
    )]));
    h.prices.set_spot("BTC", dec!(106200));

    let report = h.engine.run_pass(now).await.unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(report.early_resolved, 1);
    assert_eq!(h.ledger.resolutions(), vec![(55, true)]);
}

#[tokio::test]
async fn test_crypto_below_target_waits_then_resolves_on_window_high() {
    let now = Utc::now();
    let h = harness(MockLedger::with_markets(vec![
        market(1, BTC_105K, MarketCategory::Crypto, now + Duration::hours(1)),
        market(2, BTC_105K, MarketCategory::Crypto, now - Duration::minutes(5)),
    ]));
    h.prices.set_spot("BTC", dec!(104000));
    h.prices.set_window_high("BTC", dec!(105100));

    let report = h.engine.run_pass(now).await.unwrap();
    assert_eq!(report.undecided, 1);
    assert_eq!(report.resolved, 1);
    assert_eq!(h.ledger.resolutions(), vec![(2, true)]);
}

#[tokio::test]
async fn test_expired_crypto_below_target_resolves_no() {
    let now = Utc::now();
    let h = harness(MockLedger::with_markets(vec![market(
        3,
        BTC_105K,
        MarketCategory::Crypto,
        now - Duration::minutes(5),
    )]));
    h.prices.set_spot("BTC", dec!(101000));
    h.prices.set_window_high("BTC", dec!(104999));

    h.engine.run_pass(now).await.unwrap();
    assert_eq!(h.ledger.resolutions(), vec![(3, false)]);
}

#[tokio::test]
async fn test_unfinished_fixture_stays_pending_every_cycle() {
    let now = Utc::now();
    let h = harness(MockLedger::with_markets(vec![market(
        7,
        LIVERPOOL_CITY,
        MarketCategory::Football,
        now - Duration::hours(1),
    )]));

    for _ in 0..3 {
        let report = h.engine.run_pass(now).await.unwrap();
        assert_eq!(report.pending_resolution, 1);
        assert_eq!(report.resolved, 0);
    }
    assert_eq!(h.fixtures.lookups.load(Ordering::SeqCst), 3);
    assert!(h.ledger.writes().is_empty());
}

#[tokio::test]
async fn test_active_football_is_not_evaluated() {
    let now = Utc::now();
    let h = harness(MockLedger::with_markets(vec![market(
        8,
        LIVERPOOL_CITY,
        MarketCategory::Football,
        now + Duration::hours(2),
    )]));
    h.fixtures.add_result("Liverpool", "Man City", 3, 0);

    let report = h.engine.run_pass(now).await.unwrap();
    assert_eq!(report.undecided, 1);
    assert_eq!(h.fixtures.lookups.load(Ordering::SeqCst), 0);
    assert!(h.ledger.writes().is_empty());
}

#[tokio::test]
async fn test_unrecognised_description_counts_parse_miss() {
    let now = Utc::now();
    let h = harness(MockLedger::with_markets(vec![market(
        9,
        "Will it rain in Sydney tomorrow?",
        MarketCategory::Other("Weather".into()),
        now - Duration::hours(1),
    )]));

    let report = h.engine.run_pass(now).await.unwrap();
    assert_eq!(report.parse_misses, 1);
    assert_eq!(report.pending_resolution, 0);
    assert!(h.ledger.writes().is_empty());
}

#[tokio::test]
async fn test_submission_failure_is_retried_next_cycle() {
    let now = Utc::now();
    let h = harness(MockLedger::with_markets(vec![market(
        41,
        LIVERPOOL_CITY,
        MarketCategory::Football,
        now - Duration::hours(1),
    )]));
    h.fixtures.add_result("Liverpool", "Man City", 2, 1);
    h.ledger.set_write_error(Some("nonce too low"));

    let report = h.engine.run_pass(now).await.unwrap();
    assert_eq!(report.submission_failures, 1);
    assert_eq!(report.resolved, 0);
    assert!(h.ledger.writes().is_empty());

    h.ledger.set_write_error(None);
    let report = h.engine.run_pass(now).await.unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(h.ledger.resolutions(), vec![(41, true)]);
}

#[tokio::test]
async fn test_resolved_elsewhere_before_submit_is_skipped() {
    let now = Utc::now();
    let h = harness(MockLedger::with_markets(vec![market(
        41,
        LIVERPOOL_CITY,
        MarketCategory::Football,
        now - Duration::hours(1),
    )]));
    h.fixtures.add_result("Liverpool", "Man City", 2, 1);
    h.ledger.resolve_elsewhere_after_first_read(41);

    let report = h.engine.run_pass(now).await.unwrap();
    assert_eq!(report.already_resolved, 1);
    assert_eq!(report.resolved, 0);
    assert_eq!(h.ledger.reads_of(41), 2);
    assert!(h.ledger.writes().is_empty());
}

#[tokio::test]
async fn test_two_engines_in_sequence_write_once() {
    let now = Utc::now();
    let h = harness(MockLedger::with_markets(vec![market(
        41,
        LIVERPOOL_CITY,
        MarketCategory::Football,
        now - Duration::hours(1),
    )]));
    h.fixtures.add_result("Liverpool", "Man City", 2, 1);
    let second = ResolutionEngine::new(
        h.ledger.clone(),
        OutcomeEvaluator::new(h.fixtures.clone(), h.prices.clone(), 2),
        50,
        std::time::Duration::ZERO,
    );

    h.engine.run_pass(now).await.unwrap();
    second.run_pass(now).await.unwrap();
    assert_eq!(
        h.ledger.writes(),
        vec![LedgerWrite::Resolve { id: 41, result: true }]
    );
}

#[tokio::test]
async fn test_scan_window_is_bounded() {
    let now = Utc::now();
    let markets = (1..=10)
        .map(|id| market(id, LIVERPOOL_CITY, MarketCategory::Football, now - Duration::hours(1)))
        .collect();
    let ledger = Arc::new(MockLedger::with_markets(markets));
    let fixtures = Arc::new(FakeFixtures::default());
    let evaluator = OutcomeEvaluator::new(fixtures, Arc::new(FakePrices::default()), 2);
    let engine = ResolutionEngine::new(ledger.clone(), evaluator, 4, std::time::Duration::ZERO);

    let report = engine.run_pass(now).await.unwrap();
    assert_eq!(report.scanned, 4);
    assert_eq!(ledger.reads_of(6), 0);
    assert_eq!(ledger.reads_of(7), 1);
}

#[tokio::test]
async fn test_source_outages_are_counted_per_pass() {
    let now = Utc::now();
    let h = harness(MockLedger::with_markets(vec![market(
        5,
        BTC_105K,
        MarketCategory::Crypto,
        now + Duration::hours(1),
    )]));

    let report = h.engine.run_pass(now).await.unwrap();
    assert_eq!(report.source_outages, 1);
    assert_eq!(report.undecided, 1);
}

#[tokio::test]
async fn test_dry_run_counts_but_does_not_write() {
    let now = Utc::now();
    let ledger = Arc::new(MockLedger::with_markets(vec![market(
        55,
        BTC_105K,
        MarketCategory::Crypto,
        now + Duration::hours(1),
    )]));
    let prices = Arc::new(FakePrices::default());
    prices.set_spot("BTC", dec!(106200));
    let evaluator = OutcomeEvaluator::new(Arc::new(FakeFixtures::default()), prices, 2);
    let engine = ResolutionEngine::new(
        Arc::new(DryRunLedger::new(ledger.clone())),
        evaluator,
        50,
        std::time::Duration::ZERO,
    );

    let report = engine.run_pass(now).await.unwrap();
    assert_eq!(report.resolved, 1);
    assert!(ledger.writes().is_empty());
}
