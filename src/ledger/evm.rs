//! EVM adapter for the prediction-market contract.
//!
//! Reads go through a plain HTTP provider; writes are signed with the
//! agent key and serialized behind a mutex so the signer never has two
//! transactions in flight (nonce ordering).

use std::str::FromStr;

use alloy_primitives::{Address, U256};
use alloy_provider::network::{EthereumWallet, ReceiptResponse};
use alloy_provider::ProviderBuilder;
use alloy_signer::Signer as _;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::sol;
use anyhow::Result;
use async_trait::async_trait;
use chrono::DateTime;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::Ledger;
use crate::config::{AppConfig, LedgerConfig};
use crate::types::{Market, MarketCategory, ProphetError, TxReceipt};

sol! {
    #[sol(rpc)]
    contract PredictionMarket {
        function marketCount() external view returns (uint256);
        function markets(uint256 id) external view returns (
            string description,
            string category,
            uint256 totalYes,
            uint256 totalNo,
            bool resolved,
            bool result,
            uint256 deadline,
            bool exists
        );
        function createMarket(string description, string category, uint256 duration) external;
        function resolveMarket(uint256 marketId, bool result) external;
    }
}

/// Contract-backed ledger.
pub struct EvmLedger {
    rpc_url: url::Url,
    contract: Address,
    /// `None` for read-only use (`check`); writes then fail.
    signer: Option<PrivateKeySigner>,
    write_lock: Mutex<()>,
}

impl EvmLedger {
    pub fn new(
        rpc_url: &str,
        contract: &str,
        private_key: Option<&SecretString>,
        chain_id: u64,
    ) -> Result<Self> {
        let rpc_url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| ProphetError::Config(format!("rpc_url: {e}")))?;
        let contract = Address::from_str(contract.trim())
            .map_err(|e| ProphetError::Config(format!("contract address: {e}")))?;
        let signer = private_key
            .map(|key| {
                PrivateKeySigner::from_str(key.expose_secret().trim())
                    .map(|s| s.with_chain_id(Some(chain_id)))
                    .map_err(|e| ProphetError::Config(format!("private key: {e}")))
            })
            .transpose()?;

        Ok(Self {
            rpc_url,
            contract,
            signer,
            write_lock: Mutex::new(()),
        })
    }

    /// Build from config, resolving the contract address and key from
    /// the environment. With `require_signer`, a missing key is an error.
    pub fn from_config(config: &LedgerConfig, require_signer: bool) -> Result<Self> {
        let contract = AppConfig::resolve_env(&config.contract_address_env)?;
        let key = AppConfig::resolve_secret(Some(&config.private_key_env));
        if require_signer && key.is_none() {
            return Err(ProphetError::Config(format!(
                "signing key not set: {}",
                config.private_key_env
            ))
            .into());
        }
        Self::new(&config.rpc_url, &contract, key.as_ref(), config.chain_id)
    }

    /// Address the agent signs with, if a key is loaded.
    pub fn agent_address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    async fn send_write<F, Fut>(&self, action: &str, build: F) -> Result<TxReceipt>
    where
        F: FnOnce(EthereumWallet) -> Fut,
        Fut: std::future::Future<Output = Result<TxReceipt, String>>,
    {
        let Some(signer) = self.signer.clone() else {
            return Err(ProphetError::Submission {
                action: action.to_string(),
                message: "no signing key configured".to_string(),
            }
            .into());
        };
        let _guard = self.write_lock.lock().await;
        build(EthereumWallet::from(signer)).await.map_err(|message| {
            ProphetError::Submission {
                action: action.to_string(),
                message,
            }
            .into()
        })
    }
}

#[async_trait]
impl Ledger for EvmLedger {
    async fn market_count(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());
        let contract = PredictionMarket::new(self.contract, &provider);
        let count: U256 = contract
            .marketCount()
            .call()
            .await
            .map_err(|e| ProphetError::LedgerRead(format!("marketCount: {e}")))?;
        Ok(count.try_into().unwrap_or(u64::MAX))
    }

    async fn market(&self, id: u64) -> Result<Option<Market>> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());
        let contract = PredictionMarket::new(self.contract, &provider);
        let raw = contract
            .markets(U256::from(id))
            .call()
            .await
            .map_err(|e| ProphetError::LedgerRead(format!("markets({id}): {e}")))?;
        to_market(id, raw)
    }

    async fn create_market(
        &self,
        description: &str,
        category: &MarketCategory,
        duration_secs: u64,
    ) -> Result<TxReceipt> {
        let rpc_url = self.rpc_url.clone();
        let address = self.contract;
        let receipt = self
            .send_write("createMarket", |wallet| async move {
                let provider = ProviderBuilder::new().wallet(wallet).connect_http(rpc_url);
                let contract = PredictionMarket::new(address, &provider);
                let pending = contract
                    .createMarket(
                        description.to_string(),
                        category.as_tag().to_string(),
                        U256::from(duration_secs),
                    )
                    .send()
                    .await
                    .map_err(|e| format!("send: {e}"))?;
                confirm(pending.get_receipt().await.map_err(|e| format!("receipt: {e}"))?)
            })
            .await?;
        info!(tx_hash = %receipt.tx_hash, %category, duration_secs, "Market created");
        Ok(receipt)
    }

    async fn resolve_market(&self, id: u64, result: bool) -> Result<TxReceipt> {
        let rpc_url = self.rpc_url.clone();
        let address = self.contract;
        let receipt = self
            .send_write("resolveMarket", |wallet| async move {
                let provider = ProviderBuilder::new().wallet(wallet).connect_http(rpc_url);
                let contract = PredictionMarket::new(address, &provider);
                let pending = contract
                    .resolveMarket(U256::from(id), result)
                    .send()
                    .await
                    .map_err(|e| format!("send: {e}"))?;
                confirm(pending.get_receipt().await.map_err(|e| format!("receipt: {e}"))?)
            })
            .await?;
        info!(tx_hash = %receipt.tx_hash, market_id = id, result, "Market resolved");
        Ok(receipt)
    }
}

fn confirm<R: ReceiptResponse>(receipt: R) -> Result<TxReceipt, String> {
    let tx_hash = format!("{:?}", receipt.transaction_hash());
    if !receipt.status() {
        return Err(format!("transaction {tx_hash} reverted"));
    }
    debug!(tx_hash = %tx_hash, "Transaction confirmed");
    Ok(TxReceipt { tx_hash })
}

/// Contract tuple -> `Market`. Nonexistent slots map to `None`.
fn to_market(id: u64, raw: PredictionMarket::marketsReturn) -> Result<Option<Market>> {
    if !raw.exists {
        return Ok(None);
    }
    let secs: u64 = raw.deadline.try_into().unwrap_or(u64::MAX);
    let deadline = i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| ProphetError::LedgerRead(format!("market {id}: deadline out of range")))?;

    Ok(Some(Market {
        id,
        description: raw.description,
        category: MarketCategory::from(raw.category.as_str()),
        total_yes: raw.totalYes.try_into().unwrap_or(u128::MAX),
        total_no: raw.totalNo.try_into().unwrap_or(u128::MAX),
        deadline,
        resolved: raw.resolved,
        result: raw.result,
    }))
}
