//! In-memory ledger for integration testing.
//!
//! Stores markets in a `Vec`, records every write, and can be told to
//! fail reads or writes (or panic) to exercise the engine's error paths.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

use prophet::ledger::Ledger;
use prophet::types::{Market, MarketCategory, TxReceipt};

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerWrite {
    Create {
        description: String,
        category: MarketCategory,
        duration_secs: u64,
    },
    Resolve {
        id: u64,
        result: bool,
    },
}

#[derive(Default)]
pub struct MockLedger {
    markets: Mutex<Vec<Market>>,
    writes: Mutex<Vec<LedgerWrite>>,
    fail_writes: Mutex<Option<String>>,
    fail_reads: Mutex<Option<String>>,
    panic_on_read: Mutex<bool>,
    /// Ids that flip to resolved (by someone else) after their first read.
    resolved_elsewhere: Mutex<HashSet<u64>>,
    /// Ids whose reads always fail, e.g. an undecodable deadline.
    broken: Mutex<HashSet<u64>>,
    reads: Mutex<Vec<u64>>,
}

impl MockLedger {
    pub fn with_markets(markets: Vec<Market>) -> Self {
        Self {
            markets: Mutex::new(markets),
            ..Default::default()
        }
    }

    pub fn writes(&self) -> Vec<LedgerWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn resolutions(&self) -> Vec<(u64, bool)> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                LedgerWrite::Resolve { id, result } => Some((id, result)),
                _ => None,
            })
            .collect()
    }

    pub fn created_descriptions(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                LedgerWrite::Create { description, .. } => Some(description),
                _ => None,
            })
            .collect()
    }

    pub fn set_write_error(&self, msg: Option<&str>) {
        *self.fail_writes.lock().unwrap() = msg.map(str::to_string);
    }

    pub fn set_read_error(&self, msg: Option<&str>) {
        *self.fail_reads.lock().unwrap() = msg.map(str::to_string);
    }

    pub fn set_panic_on_read(&self, panic: bool) {
        *self.panic_on_read.lock().unwrap() = panic;
    }

    pub fn resolve_elsewhere_after_first_read(&self, id: u64) {
        self.resolved_elsewhere.lock().unwrap().insert(id);
    }

    pub fn break_market(&self, id: u64) {
        self.broken.lock().unwrap().insert(id);
    }

    pub fn reads_of(&self, id: u64) -> usize {
        self.reads.lock().unwrap().iter().filter(|r| **r == id).count()
    }

    fn check_reads(&self) -> Result<()> {
        if *self.panic_on_read.lock().unwrap() {
            panic!("ledger exploded");
        }
        match self.fail_reads.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn market_count(&self) -> Result<u64> {
        self.check_reads()?;
        Ok(self.markets.lock().unwrap().iter().map(|m| m.id).max().unwrap_or(0))
    }

    async fn market(&self, id: u64) -> Result<Option<Market>> {
        self.check_reads()?;
        let previous_reads = self.reads_of(id);
        self.reads.lock().unwrap().push(id);
        if self.broken.lock().unwrap().contains(&id) {
            return Err(anyhow!("market {id}: deadline out of range"));
        }

        let mut markets = self.markets.lock().unwrap();
        let Some(market) = markets.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        if previous_reads > 0 && self.resolved_elsewhere.lock().unwrap().contains(&id) {
            market.resolved = true;
        }
        Ok(Some(market.clone()))
    }

    async fn create_market(
        &self,
        description: &str,
        category: &MarketCategory,
        duration_secs: u64,
    ) -> Result<TxReceipt> {
        if let Some(msg) = self.fail_writes.lock().unwrap().as_ref() {
            return Err(anyhow!("{msg}"));
        }
        let mut markets = self.markets.lock().unwrap();
        let id = markets.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        markets.push(market(
            id,
            description,
            category.clone(),
            Utc::now() + Duration::seconds(duration_secs as i64),
        ));
        self.writes.lock().unwrap().push(LedgerWrite::Create {
            description: description.to_string(),
            category: category.clone(),
            duration_secs,
        });
        Ok(TxReceipt {
            tx_hash: format!("0xcreate{id}"),
        })
    }

    async fn resolve_market(&self, id: u64, result: bool) -> Result<TxReceipt> {
        if let Some(msg) = self.fail_writes.lock().unwrap().as_ref() {
            return Err(anyhow!("{msg}"));
        }
        let mut markets = self.markets.lock().unwrap();
        let market = markets
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| anyhow!("no market {id}"))?;
        if market.resolved {
            return Err(anyhow!("market {id} already resolved"));
        }
        market.resolved = true;
        market.result = result;
        self.writes
            .lock()
            .unwrap()
            .push(LedgerWrite::Resolve { id, result });
        Ok(TxReceipt {
            tx_hash: format!("0xresolve{id}"),
        })
    }
}

pub fn market(id: u64, description: &str, category: MarketCategory, deadline: DateTime<Utc>) -> Market {
    Market {
        id,
        description: description.to_string(),
        category,
        total_yes: 0,
        total_no: 0,
        deadline,
        resolved: false,
        result: false,
    }
}
