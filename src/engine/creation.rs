//! Creation pass: discover events, dedupe against the ledger, deploy.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::CreationConfig;
use crate::ledger::{Ledger, MarketRegistry};
use crate::oracle::description;
use crate::sources::{FixtureSource, PriceSource};
use crate::types::{CreationReport, MarketCategory};

/// A market the engine would like to deploy.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDraft {
    pub description: String,
    pub category: MarketCategory,
    pub duration_secs: u64,
    /// Set for Crypto drafts; at most one open market per symbol.
    pub symbol: Option<String>,
}

pub struct CreationEngine {
    ledger: Arc<dyn Ledger>,
    registry: MarketRegistry,
    fixtures: Arc<dyn FixtureSource>,
    prices: Arc<dyn PriceSource>,
    config: CreationConfig,
    scan_depth: u64,
    submit_pause: Duration,
}

impl CreationEngine {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        fixtures: Arc<dyn FixtureSource>,
        prices: Arc<dyn PriceSource>,
        config: CreationConfig,
        scan_depth: u64,
        submit_pause: Duration,
    ) -> Self {
        Self {
            registry: MarketRegistry::new(ledger.clone()),
            ledger,
            fixtures,
            prices,
            config,
            scan_depth,
            submit_pause,
        }
    }

    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<CreationReport> {
        let mut report = CreationReport::default();
        if !self.config.enabled {
            return Ok(report);
        }

        let snapshot = self.registry.snapshot(self.scan_depth).await?;
        let mut active = snapshot.active_descriptions();
        let mut open_symbols = snapshot.open_crypto_symbols();

        let mut drafts = self.fixture_drafts(now, &mut report).await;
        drafts.extend(self.crypto_drafts(&open_symbols, &mut report).await);

        let mut wrote = false;
        for draft in drafts {
            report.candidates += 1;
            let key = description::normalize(&draft.description);
            if active.contains(&key) {
                report.duplicates += 1;
                debug!(description = %draft.description, "Identical market already open");
                continue;
            }
            if let Some(symbol) = draft.symbol.as_deref() {
                if open_symbols.contains(symbol) {
                    report.duplicates += 1;
                    debug!(symbol, "Crypto market already open for symbol");
                    continue;
                }
            }

            if wrote && !self.submit_pause.is_zero() {
                tokio::time::sleep(self.submit_pause).await;
            }
            wrote = true;

            match self
                .ledger
                .create_market(&draft.description, &draft.category, draft.duration_secs)
                .await
            {
                Ok(receipt) => {
                    report.created += 1;
                    info!(
                        description = %draft.description,
                        category = %draft.category,
                        duration_secs = draft.duration_secs,
                        tx_hash = %receipt.tx_hash,
                        "Market deployed"
                    );
                    active.insert(key);
                    if let Some(symbol) = draft.symbol {
                        open_symbols.insert(symbol);
                    }
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(kind = "submission_failed", description = %draft.description, error = %e, "Market creation failed");
                }
            }
        }

        info!(
            candidates = report.candidates,
            created = report.created,
            duplicates = report.duplicates,
            stale = report.stale,
            failures = report.failures,
            "Creation pass complete"
        );
        Ok(report)
    }

    /// Upcoming fixtures that still have a future deadline, bounded per
    /// cycle.
    async fn fixture_drafts(&self, now: DateTime<Utc>, report: &mut CreationReport) -> Vec<MarketDraft> {
        if self.config.leagues.is_empty() || self.config.max_fixtures_per_cycle == 0 {
            return Vec::new();
        }
        let fixtures = self
            .fixtures
            .list_upcoming(&self.config.leagues, self.config.horizon_days)
            .await;

        let buffer = ChronoDuration::hours(self.config.fixture_buffer_hours);
        let mut drafts = Vec::new();
        for fixture in fixtures {
            let deadline = fixture.kickoff + buffer;
            if deadline <= now {
                report.stale += 1;
                debug!(event_id = %fixture.event_id, %deadline, "Fixture deadline already past");
                continue;
            }
            drafts.push(MarketDraft {
                description: description::football_description(&fixture),
                category: MarketCategory::Football,
                duration_secs: (deadline - now).num_seconds().max(1) as u64,
                symbol: None,
            });
            if drafts.len() >= self.config.max_fixtures_per_cycle {
                break;
            }
        }
        drafts
    }

    /// One draft per configured asset without an open market.
    async fn crypto_drafts(
        &self,
        open_symbols: &std::collections::HashSet<String>,
        report: &mut CreationReport,
    ) -> Vec<MarketDraft> {
        let hours = self.config.crypto_window_hours;
        let mut drafts = Vec::new();
        for asset in &self.config.crypto_assets {
            if open_symbols.contains(&asset.symbol) {
                report.candidates += 1;
                report.duplicates += 1;
                debug!(symbol = %asset.symbol, "Crypto market already open for symbol");
                continue;
            }
            let Some(quote) = self.prices.current(&asset.symbol).await else {
                debug!(symbol = %asset.symbol, "No spot price; skipping crypto market");
                continue;
            };
            let spot = quote.price;
            let Some(target) = crypto_target(spot, asset.target_pct) else {
                warn!(symbol = %asset.symbol, target_pct = asset.target_pct, "Invalid target percentage");
                continue;
            };
            drafts.push(MarketDraft {
                description: description::crypto_description(
                    &asset.name,
                    &asset.symbol,
                    target,
                    hours,
                    spot,
                ),
                category: MarketCategory::Crypto,
                duration_secs: u64::from(hours) * 3600,
                symbol: Some(asset.symbol.clone()),
            });
        }
        drafts
    }
}

/// `spot * (1 + pct/100)`, rounded to cents.
pub fn crypto_target(spot: Decimal, target_pct: f64) -> Option<Decimal> {
    let pct = Decimal::from_f64(target_pct)?;
    Some((spot * (Decimal::ONE + pct / Decimal::ONE_HUNDRED)).round_dp(2))
}
