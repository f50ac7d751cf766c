//! PROPHET: autonomous oracle agent.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the truth sources and ledger, and runs the resolve→create duty
//! cycle with graceful shutdown. `check` and `cleanup` are one-shot admin
//! commands against the same ledger.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use prophet::config::AppConfig;
use prophet::dashboard;
use prophet::engine::{CreationEngine, CycleScheduler, ResolutionEngine};
use prophet::ledger::{DryRunLedger, EvmLedger, Ledger, MarketRegistry};
use prophet::oracle::OutcomeEvaluator;
use prophet::report::{self, CheckReport};
use prophet::sources::fixtures::FixtureClient;
use prophet::sources::prices::PriceClient;
use prophet::sources::{FixtureSource, PriceSource};

const BANNER: &str = r#"
 ____  ____   ___  ____  _   _ _____ _____
|  _ \|  _ \ / _ \|  _ \| | | | ____|_   _|
| |_) | |_) | | | | |_) | |_| |  _|   | |
|  __/|  _ <| |_| |  __/|  _  | |___  | |
|_|   |_| \_\\___/|_|   |_| |_|_____| |_|

  Oracle classification & resolution agent
  v0.1.0
"#;

#[derive(Debug, Parser)]
#[command(name = "prophet", version, about = "Oracle agent for an on-chain prediction market")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Log intended ledger writes without sending them.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the agent loop (default).
    Run,
    /// Print a read-only report of the newest markets.
    Check,
    /// Force-resolve every unresolved market in the scan window as No.
    Cleanup {
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let mut cfg = AppConfig::load_or_default(&cli.config)?;
    cfg.agent.dry_run |= cli.dry_run;

    init_logging();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(cfg).await,
        Command::Check => check(cfg).await,
        Command::Cleanup { confirm } => cleanup(cfg, confirm).await,
    }
}

async fn run(cfg: AppConfig) -> Result<()> {
    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        interval_secs = cfg.agent.cycle_interval_secs,
        scan_depth = cfg.agent.scan_depth,
        dry_run = cfg.agent.dry_run,
        "PROPHET starting up"
    );

    let ledger = build_ledger(&cfg, !cfg.agent.dry_run)?;

    // -- Truth sources ---------------------------------------------------

    let retry = cfg.sources.retry_policy();
    let timeout = cfg.sources.request_timeout();
    let fixtures: Arc<dyn FixtureSource> = Arc::new(FixtureClient::new(
        &cfg.sources.fixtures_base_url,
        AppConfig::resolve_secret(cfg.sources.fixtures_api_key_env.as_deref()),
        retry,
        timeout,
    )?);
    let cmc_key = AppConfig::resolve_secret(cfg.sources.cmc_api_key_env.as_deref());
    if cmc_key.is_none() {
        info!("No CoinMarketCap key; using Yahoo for spot prices");
    }
    let prices: Arc<dyn PriceSource> = Arc::new(PriceClient::crypto(
        &cfg.sources.prices_base_url,
        cmc_key,
        retry,
        timeout,
    )?);

    let mut evaluator =
        OutcomeEvaluator::new(fixtures.clone(), prices.clone(), cfg.creation.crypto_window_hours);
    if cfg.sources.stocks_enabled {
        evaluator = evaluator.with_stocks(Arc::new(PriceClient::stocks(
            &cfg.sources.prices_base_url,
            retry,
            timeout,
        )?));
    } else {
        info!("Stock source disabled; Stocks markets will stay pending");
    }

    // -- Engines ---------------------------------------------------------

    let pause = Duration::from_millis(cfg.agent.submit_pause_ms);
    let resolution = ResolutionEngine::new(ledger.clone(), evaluator, cfg.agent.scan_depth, pause);
    let creation = CreationEngine::new(
        ledger,
        fixtures,
        prices,
        cfg.creation.clone(),
        cfg.agent.scan_depth,
        pause,
    );
    let mut scheduler = CycleScheduler::new(resolution, creation, &cfg.agent);

    if cfg.dashboard.enabled {
        if let Err(e) = dashboard::spawn_dashboard(scheduler.subscribe(), cfg.dashboard.port).await {
            warn!(error = %e, "Status server disabled");
        }
    }

    scheduler
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    info!("PROPHET shut down cleanly.");
    Ok(())
}

async fn check(cfg: AppConfig) -> Result<()> {
    let ledger = build_ledger(&cfg, false)?;
    let snapshot = MarketRegistry::new(ledger).snapshot(cfg.agent.scan_depth).await?;
    print!("{}", CheckReport::build(&snapshot, Utc::now()));
    Ok(())
}

async fn cleanup(cfg: AppConfig, confirm: bool) -> Result<()> {
    let ledger = build_ledger(&cfg, confirm && !cfg.agent.dry_run)?;
    let outcome = report::cleanup(
        ledger,
        cfg.agent.scan_depth,
        Duration::from_millis(cfg.agent.submit_pause_ms),
        confirm,
    )
    .await?;
    info!(
        attempted = outcome.attempted,
        resolved = outcome.resolved,
        failed = outcome.failed,
        "Cleanup complete"
    );
    Ok(())
}

/// EVM ledger, wrapped so writes are only logged in dry-run mode.
fn build_ledger(cfg: &AppConfig, require_signer: bool) -> Result<Arc<dyn Ledger>> {
    let evm = EvmLedger::from_config(&cfg.ledger, require_signer)?;
    match evm.agent_address() {
        Some(address) => info!(%address, chain_id = cfg.ledger.chain_id, "Ledger signer loaded"),
        None => info!(chain_id = cfg.ledger.chain_id, "Ledger opened read-only"),
    }
    let evm: Arc<dyn Ledger> = Arc::new(evm);
    if cfg.agent.dry_run {
        Ok(Arc::new(DryRunLedger::new(evm)))
    } else {
        Ok(evm)
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("prophet=info"));

    let json_logging = std::env::var("PROPHET_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
