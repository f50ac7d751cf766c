//! Ledger contract access.
//!
//! The ledger owns all market state. The agent reads it through
//! [`Ledger`] and writes only via `create_market` / `resolve_market`.
//! `EvmLedger` talks to the deployed contract; tests use in-memory fakes.

pub mod evm;
pub mod registry;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::types::{Market, MarketCategory, TxReceipt};

pub use evm::EvmLedger;
pub use registry::MarketRegistry;

/// Read and write surface of the prediction-market contract.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Highest assigned market id. Ids run `1..=market_count()`.
    async fn market_count(&self) -> Result<u64>;

    /// Market by id; `None` if the contract reports it as nonexistent.
    async fn market(&self, id: u64) -> Result<Option<Market>>;

    async fn create_market(
        &self,
        description: &str,
        category: &MarketCategory,
        duration_secs: u64,
    ) -> Result<TxReceipt>;

    async fn resolve_market(&self, id: u64, result: bool) -> Result<TxReceipt>;
}

/// Passes reads through and logs writes instead of sending them.
pub struct DryRunLedger {
    inner: Arc<dyn Ledger>,
}

impl DryRunLedger {
    pub fn new(inner: Arc<dyn Ledger>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Ledger for DryRunLedger {
    async fn market_count(&self) -> Result<u64> {
        self.inner.market_count().await
    }

    async fn market(&self, id: u64) -> Result<Option<Market>> {
        self.inner.market(id).await
    }

    async fn create_market(
        &self,
        description: &str,
        category: &MarketCategory,
        duration_secs: u64,
    ) -> Result<TxReceipt> {
        info!(dry_run = true, description, %category, duration_secs, "Would create market");
        Ok(TxReceipt::dry_run())
    }

    async fn resolve_market(&self, id: u64, result: bool) -> Result<TxReceipt> {
        info!(dry_run = true, market_id = id, result, "Would resolve market");
        Ok(TxReceipt::dry_run())
    }
}
