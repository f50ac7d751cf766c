//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (signing key, API keys) are referenced by env-var name in the
//! config and resolved at runtime.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::sources::RetryPolicy;
use crate::types::ProphetError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub ledger: LedgerConfig,
    pub sources: SourcesConfig,
    pub creation: CreationConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    /// Sleep between duty cycles.
    pub cycle_interval_secs: u64,
    /// Sleep after a cycle-fatal failure.
    pub cycle_cooldown_secs: u64,
    /// Newest-first window of market ids read per cycle.
    pub scan_depth: u64,
    /// Pause between consecutive ledger writes (nonce spacing).
    pub submit_pause_ms: u64,
    /// Log intended writes without sending them.
    pub dry_run: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "PROPHET-001".to_string(),
            cycle_interval_secs: 900,
            cycle_cooldown_secs: 60,
            scan_depth: 50,
            submit_pause_ms: 2000,
            dry_run: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub contract_address_env: String,
    pub private_key_env: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://rpc.testnet.arc.network".to_string(),
            chain_id: 5042002,
            contract_address_env: "CONTRACT_ADDRESS".to_string(),
            private_key_env: "PRIVATE_KEY".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourcesConfig {
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub fixtures_base_url: String,
    /// Env var holding the TheSportsDB key; the public test key is used
    /// when unset.
    pub fixtures_api_key_env: Option<String>,
    pub prices_base_url: String,
    pub cmc_api_key_env: Option<String>,
    /// Whether Stocks markets get a price source at all.
    pub stocks_enabled: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_ms: 1500,
            request_timeout_secs: 15,
            fixtures_base_url: "https://www.thesportsdb.com/api/v1/json".to_string(),
            fixtures_api_key_env: Some("SPORTSDB_API_KEY".to_string()),
            prices_base_url: "https://query1.finance.yahoo.com".to_string(),
            cmc_api_key_env: Some("CMC_API_KEY".to_string()),
            stocks_enabled: false,
        }
    }
}

impl SourcesConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CreationConfig {
    pub enabled: bool,
    /// TheSportsDB league ids.
    pub leagues: Vec<String>,
    pub horizon_days: i64,
    pub max_fixtures_per_cycle: usize,
    /// Market deadline = kickoff + this buffer.
    pub fixture_buffer_hours: i64,
    pub crypto_assets: Vec<CryptoAssetConfig>,
    /// "in next N hours" for crypto markets; also the fallback
    /// evaluation window for crypto descriptions without one.
    pub crypto_window_hours: u32,
}

impl Default for CreationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            leagues: vec!["4328".into(), "4335".into(), "4332".into()],
            horizon_days: 7,
            max_fixtures_per_cycle: 3,
            fixture_buffer_hours: 3,
            crypto_assets: vec![CryptoAssetConfig::default()],
            crypto_window_hours: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CryptoAssetConfig {
    pub symbol: String,
    pub name: String,
    /// Target distance above spot, in percent.
    pub target_pct: f64,
}

impl Default for CryptoAssetConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC".to_string(),
            name: "Bitcoin".to_string(),
            target_pct: 1.5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load from a file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ProphetError> {
        if self.agent.scan_depth == 0 {
            return Err(ProphetError::Config("agent.scan_depth must be positive".into()));
        }
        if self.sources.retry_attempts == 0 {
            return Err(ProphetError::Config("sources.retry_attempts must be positive".into()));
        }
        if self.creation.crypto_window_hours == 0 {
            return Err(ProphetError::Config(
                "creation.crypto_window_hours must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .map(|v| v.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an env-held secret, if the config names one and it is set.
    pub fn resolve_secret(env_name: Option<&str>) -> Option<SecretString> {
        env_name
            .and_then(|name| Self::resolve_env(name).ok())
            .filter(|v| !v.is_empty())
            .map(SecretString::new)
    }
}
