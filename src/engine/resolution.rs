//! Resolution pass: parse -> fetch -> evaluate -> submit.
//!
//! Per market: `Active -> (Expired | EarlyDecided) -> Resolved`. Only
//! Crypto markets are evaluated while still active. Expired markets that
//! cannot be decided stay pending and are retried every cycle without
//! limit. Writes are one at a time with a pause between them.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ledger::{Ledger, MarketRegistry};
use crate::oracle::{description, OutcomeEvaluator};
use crate::types::{Market, MarketPhase, Prediction, ResolutionOutcome, ResolutionReport};

pub struct ResolutionEngine {
    ledger: Arc<dyn Ledger>,
    registry: MarketRegistry,
    evaluator: OutcomeEvaluator,
    scan_depth: u64,
    submit_pause: Duration,
}

impl ResolutionEngine {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        evaluator: OutcomeEvaluator,
        scan_depth: u64,
        submit_pause: Duration,
    ) -> Self {
        Self {
            registry: MarketRegistry::new(ledger.clone()),
            ledger,
            evaluator,
            scan_depth,
            submit_pause,
        }
    }

    /// One pass over the unresolved markets in the scan window. Errors
    /// only when the market count cannot be read.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<ResolutionReport> {
        let outages_before = self.evaluator.outage_count();
        let snapshot = self.registry.snapshot(self.scan_depth).await?;
        let mut report = ResolutionReport {
            unreadable: snapshot.unreadable.len(),
            ..Default::default()
        };
        let mut wrote = false;

        for market in snapshot.unresolved() {
            report.scanned += 1;
            let Some(outcome) = self.decide(market, now, &mut report).await else {
                continue;
            };

            if wrote && !self.submit_pause.is_zero() {
                tokio::time::sleep(self.submit_pause).await;
            }
            wrote |= self.submit(&outcome, &mut report).await;
        }

        report.source_outages = self.evaluator.outage_count().saturating_sub(outages_before);
        info!(
            scanned = report.scanned,
            resolved = report.resolved,
            early = report.early_resolved,
            pending = report.pending_resolution,
            parse_misses = report.parse_misses,
            unreadable = report.unreadable,
            submit_failures = report.submission_failures,
            outages = report.source_outages,
            "Resolution pass complete"
        );
        Ok(report)
    }

    async fn decide(
        &self,
        market: &Market,
        now: DateTime<Utc>,
        report: &mut ResolutionReport,
    ) -> Option<ResolutionOutcome> {
        let prediction = description::parse(&market.description, &market.category);
        if prediction.is_unknown() {
            report.parse_misses += 1;
            debug!(kind = "parse_miss", market_id = market.id, category = %market.category, "Description not recognised; skipping");
            return None;
        }

        let phase = market.phase(now);
        let is_crypto = matches!(prediction, Prediction::Crypto { .. });
        if phase == MarketPhase::Active && !is_crypto {
            report.undecided += 1;
            return None;
        }

        match self.evaluator.evaluate(&prediction, market.deadline, now).await {
            Some(decision) => Some(ResolutionOutcome {
                market_id: market.id,
                decision,
                evaluated_at: now,
                phase: if phase == MarketPhase::Active {
                    MarketPhase::EarlyDecided
                } else {
                    phase
                },
            }),
            None if phase == MarketPhase::Expired => {
                report.pending_resolution += 1;
                info!(kind = "pending", market_id = market.id, prediction = %prediction, "Expired market not decidable yet");
                None
            }
            None => {
                report.undecided += 1;
                debug!(kind = "undecidable", market_id = market.id, prediction = %prediction, "No decision yet");
                None
            }
        }
    }

    /// Re-read, then write. Returns whether a write was attempted.
    async fn submit(&self, outcome: &ResolutionOutcome, report: &mut ResolutionReport) -> bool {
        let id = outcome.market_id;
        match self.registry.reload(id).await {
            Ok(Some(market)) if market.resolved => {
                report.already_resolved += 1;
                debug!(market_id = id, "Already resolved on ledger; skipping");
                return false;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(market_id = id, "Market vanished between scan and submit");
                return false;
            }
            Err(e) => {
                report.submission_failures += 1;
                warn!(kind = "submission_failed", market_id = id, error = %e, "Pre-submit re-read failed; retrying next cycle");
                return false;
            }
        }

        match self.ledger.resolve_market(id, outcome.decision).await {
            Ok(receipt) => {
                report.resolved += 1;
                if outcome.phase == MarketPhase::EarlyDecided {
                    report.early_resolved += 1;
                }
                info!(
                    market_id = id,
                    result = outcome.decision,
                    phase = %outcome.phase,
                    tx_hash = %receipt.tx_hash,
                    "Market resolution submitted"
                );
            }
            Err(e) => {
                report.submission_failures += 1;
                warn!(kind = "submission_failed", market_id = id, error = %e, "Resolution submit failed; retrying next cycle");
            }
        }
        true
    }
}
