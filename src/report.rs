//! Admin utilities: read-only market report and force-resolve cleanup.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::ledger::registry::MarketSnapshot;
use crate::ledger::{Ledger, MarketRegistry};
use crate::types::Market;

const LIST_PREVIEW: usize = 5;

/// What `prophet check` prints.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub market_count: u64,
    pub scanned: usize,
    pub resolved: usize,
    /// Unresolved and before the deadline.
    pub active: Vec<Market>,
    /// Unresolved and past the deadline.
    pub pending: Vec<Market>,
    /// Scanned markets per category tag, resolved or not.
    pub by_category: BTreeMap<String, usize>,
    /// Ids in the window that could not be read.
    pub unreadable: Vec<u64>,
}

impl CheckReport {
    pub fn build(snapshot: &MarketSnapshot, now: DateTime<Utc>) -> Self {
        let mut report = CheckReport {
            market_count: snapshot.market_count,
            scanned: snapshot.markets.len(),
            resolved: 0,
            active: Vec::new(),
            pending: Vec::new(),
            by_category: BTreeMap::new(),
            unreadable: snapshot.unreadable.clone(),
        };
        for market in &snapshot.markets {
            *report
                .by_category
                .entry(market.category.as_tag().to_string())
                .or_default() += 1;
            if market.resolved {
                report.resolved += 1;
                continue;
            }
            if market.is_expired(now) {
                report.pending.push(market.clone());
            } else {
                report.active.push(market.clone());
            }
        }
        report
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total markets on ledger: {}", self.market_count)?;
        writeln!(f, "Scanned (newest first): {}", self.scanned)?;
        writeln!(f, "Resolved in window:     {}", self.resolved)?;
        writeln!(f, "Active:                 {}", self.active.len())?;
        writeln!(f, "Pending resolution:     {}", self.pending.len())?;
        if !self.unreadable.is_empty() {
            writeln!(f, "Unreadable:             {:?}", self.unreadable)?;
        }
        writeln!(f, "By category:")?;
        for (category, count) in &self.by_category {
            writeln!(f, "  {category}: {count}")?;
        }
        for (title, list) in [("Active", &self.active), ("Pending", &self.pending)] {
            if list.is_empty() {
                continue;
            }
            writeln!(f, "{title} (first {}):", LIST_PREVIEW.min(list.len()))?;
            for market in list.iter().take(LIST_PREVIEW) {
                writeln!(f, "  {market}")?;
            }
        }
        Ok(())
    }
}

/// Outcome of a cleanup run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub attempted: usize,
    pub resolved: usize,
    pub failed: usize,
}

/// Force-resolve every unresolved market in the scan window as No, one
/// write at a time. Refuses to run without `confirm`.
pub async fn cleanup(
    ledger: Arc<dyn Ledger>,
    scan_depth: u64,
    pause: Duration,
    confirm: bool,
) -> Result<CleanupReport> {
    if !confirm {
        bail!("cleanup force-resolves markets as No; re-run with --confirm");
    }

    let registry = MarketRegistry::new(ledger.clone());
    let open = registry.list_unresolved(scan_depth).await?;
    let mut report = CleanupReport::default();

    for (i, market) in open.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        if matches!(registry.reload(market.id).await, Ok(Some(m)) if m.resolved) {
            continue;
        }
        report.attempted += 1;
        match ledger.resolve_market(market.id, false).await {
            Ok(receipt) => {
                report.resolved += 1;
                info!(market_id = market.id, tx_hash = %receipt.tx_hash, "Force-resolved as No");
            }
            Err(e) => {
                report.failed += 1;
                warn!(kind = "submission_failed", market_id = market.id, error = %e, "Force-resolve failed");
            }
        }
    }
    Ok(report)
}
