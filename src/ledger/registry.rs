//! Read-side projection over the ledger.
//!
//! Every read is bounded to the newest `scan_depth` market ids so a cycle
//! costs the same no matter how many markets the contract holds.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::Ledger;
use crate::oracle::description;
use crate::types::{Market, Prediction};

/// Markets read in one pass, newest first.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub markets: Vec<Market>,
    pub market_count: u64,
    /// Ids in the window whose read failed; retried next snapshot.
    pub unreadable: Vec<u64>,
}

impl MarketSnapshot {
    pub fn unresolved(&self) -> impl Iterator<Item = &Market> {
        self.markets.iter().filter(|m| !m.resolved)
    }

    /// Normalized descriptions of every unresolved market (dedup keys).
    pub fn active_descriptions(&self) -> HashSet<String> {
        self.unresolved()
            .map(|m| description::normalize(&m.description))
            .collect()
    }

    /// Symbols with an unresolved Crypto prediction.
    pub fn open_crypto_symbols(&self) -> HashSet<String> {
        self.unresolved()
            .filter_map(|m| match description::parse(&m.description, &m.category) {
                Prediction::Crypto { symbol, .. } => Some(symbol),
                _ => None,
            })
            .collect()
    }
}

pub struct MarketRegistry {
    ledger: Arc<dyn Ledger>,
}

impl MarketRegistry {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// The newest `scan_depth` markets, newest first. Only a failed
    /// `market_count` read is an error; a market that cannot be read is
    /// logged, listed in `unreadable` and left out.
    pub async fn snapshot(&self, scan_depth: u64) -> Result<MarketSnapshot> {
        let market_count = self.ledger.market_count().await?;
        let mut markets = Vec::new();
        let mut unreadable = Vec::new();
        for id in scan_window(market_count, scan_depth) {
            match self.ledger.market(id).await {
                Ok(Some(market)) => markets.push(market),
                Ok(None) => {}
                Err(e) => {
                    warn!(kind = "market_unreadable", market_id = id, error = %e, "Skipping market that cannot be read");
                    unreadable.push(id);
                }
            }
        }
        debug!(market_count, read = markets.len(), unreadable = unreadable.len(), "Registry snapshot taken");
        Ok(MarketSnapshot {
            markets,
            market_count,
            unreadable,
        })
    }

    /// Unresolved markets within the scan window, newest first.
    pub async fn list_unresolved(&self, scan_depth: u64) -> Result<Vec<Market>> {
        let snapshot = self.snapshot(scan_depth).await?;
        Ok(snapshot.markets.into_iter().filter(|m| !m.resolved).collect())
    }

    /// Fresh read of one market, bypassing any snapshot.
    pub async fn reload(&self, id: u64) -> Result<Option<Market>> {
        self.ledger.market(id).await
    }
}

/// Ids `count, count-1, ..` down to at most `depth` entries, never below 1.
fn scan_window(count: u64, depth: u64) -> impl Iterator<Item = u64> {
    let lowest = count.saturating_sub(depth).saturating_add(1).max(1);
    (lowest..=count).rev()
}
