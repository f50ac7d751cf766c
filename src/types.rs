//! Shared types for the PROPHET agent.
//!
//! These types form the data model used across all modules. The ledger
//! owns markets; everything else here is derived per cycle and never
//! persisted by the agent.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// A binary-outcome market as recorded in the ledger contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Ledger-assigned id, positive and monotonic.
    pub id: u64,
    /// Free text; the only carrier of resolution parameters.
    pub description: String,
    pub category: MarketCategory,
    /// Pool sizes in token base units (informational only).
    pub total_yes: u128,
    pub total_no: u128,
    pub deadline: DateTime<Utc>,
    pub resolved: bool,
    /// Meaningful only once `resolved` is true.
    pub result: bool,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{}] {} (deadline: {})",
            self.id,
            self.category,
            self.description,
            self.deadline.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}

impl Market {
    /// Whether the deadline has passed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }

    /// Lifecycle phase at `now`, ignoring early-decision (which only the
    /// evaluator can establish).
    pub fn phase(&self, now: DateTime<Utc>) -> MarketPhase {
        if self.resolved {
            MarketPhase::Resolved
        } else if self.is_expired(now) {
            MarketPhase::Expired
        } else {
            MarketPhase::Active
        }
    }
}

/// Category tag stored next to the description.
///
/// The tag set is open: anything unrecognised is carried verbatim so it
/// can be written back unchanged and surfaced in reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketCategory {
    Football,
    Crypto,
    Stocks,
    Other(String),
}

impl MarketCategory {
    /// The exact tag written to the ledger.
    pub fn as_tag(&self) -> &str {
        match self {
            MarketCategory::Football => "Football",
            MarketCategory::Crypto => "Crypto",
            MarketCategory::Stocks => "Stocks",
            MarketCategory::Other(tag) => tag,
        }
    }
}

impl fmt::Display for MarketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

impl From<&str> for MarketCategory {
    /// Ledger tags are matched exactly; the original casing is kept for
    /// unknown tags.
    fn from(tag: &str) -> Self {
        match tag {
            "Football" => MarketCategory::Football,
            "Crypto" => MarketCategory::Crypto,
            "Stocks" => MarketCategory::Stocks,
            other => MarketCategory::Other(other.to_string()),
        }
    }
}

/// Where a market sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketPhase {
    Active,
    Expired,
    EarlyDecided,
    Resolved,
}

impl fmt::Display for MarketPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketPhase::Active => write!(f, "active"),
            MarketPhase::Expired => write!(f, "expired"),
            MarketPhase::EarlyDecided => write!(f, "early-decided"),
            MarketPhase::Resolved => write!(f, "resolved"),
        }
    }
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// The typed structure recovered from a market description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Prediction {
    /// Yes iff `target_team` wins.
    Football {
        home: String,
        away: String,
        target_team: String,
    },
    /// Yes iff price reaches `target_price` within the window.
    Crypto {
        symbol: String,
        target_price: Decimal,
        /// "in next N hours" when the description states it.
        window_hours: Option<u32>,
    },
    /// Yes iff the window's move meets `threshold_pct`.
    Stock { symbol: String, threshold_pct: f64 },
    Unknown,
}

impl Prediction {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Prediction::Unknown)
    }

    /// Short kind label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Prediction::Football { .. } => "football",
            Prediction::Crypto { .. } => "crypto",
            Prediction::Stock { .. } => "stock",
            Prediction::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Football { home, away, target_team } => {
                write!(f, "{home} vs {away}, YES if {target_team} wins")
            }
            Prediction::Crypto { symbol, target_price, window_hours } => match window_hours {
                Some(h) => write!(f, "{symbol} >= ${target_price} within {h}h"),
                None => write!(f, "{symbol} >= ${target_price}"),
            },
            Prediction::Stock { symbol, threshold_pct } => {
                write!(f, "{symbol} moves >= {threshold_pct}%")
            }
            Prediction::Unknown => write!(f, "unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Truth snapshots
// ---------------------------------------------------------------------------

/// An upcoming fixture discovered from the fixture source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub event_id: String,
    pub home: String,
    pub away: String,
    pub league: String,
    pub kickoff: DateTime<Utc>,
}

/// How to find a fixture's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureQuery {
    pub event_id: Option<String>,
    pub home: String,
    pub away: String,
    /// Market deadline. Name searches only accept meetings that kicked
    /// off shortly before it.
    pub deadline: Option<DateTime<Utc>>,
}

impl FixtureQuery {
    pub fn by_teams(home: impl Into<String>, away: impl Into<String>) -> Self {
        Self {
            event_id: None,
            home: home.into(),
            away: away.into(),
            deadline: None,
        }
    }

    pub fn played_by(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// A completed fixture's final score, as reported by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedScore {
    pub home: String,
    pub away: String,
    pub home_score: u32,
    pub away_score: u32,
    pub status: String,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// A spot price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: Decimal,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(symbol: impl Into<String>, price: Decimal, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            source: source.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// One OHLC sample from a historical series, timestamp already in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

// ---------------------------------------------------------------------------
// Outcomes & reports
// ---------------------------------------------------------------------------

/// A decided outcome, consumed immediately by submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub market_id: u64,
    pub decision: bool,
    pub evaluated_at: DateTime<Utc>,
    pub phase: MarketPhase,
}

/// Receipt for a ledger write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
}

impl TxReceipt {
    pub fn dry_run() -> Self {
        Self {
            tx_hash: "dry-run".to_string(),
        }
    }
}

/// What the resolution pass did during one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub scanned: usize,
    pub resolved: usize,
    pub early_resolved: usize,
    /// Active markets whose outcome is not known yet.
    pub undecided: usize,
    /// Expired markets still undecidable; stuck markets show up here.
    pub pending_resolution: usize,
    pub parse_misses: usize,
    /// Markets in the scan window whose ledger read failed.
    pub unreadable: usize,
    pub already_resolved: usize,
    pub submission_failures: usize,
    pub source_outages: u64,
}

/// What the creation pass did during one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreationReport {
    pub candidates: usize,
    pub created: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub failures: usize,
}

/// Summary of one resolve-then-create duty cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub resolution: ResolutionReport,
    pub creation: CreationReport,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle #{}: scanned={} resolved={} (early={}) pending={} parse_miss={} unreadable={} submit_fail={} created={} dup={}",
            self.cycle_number,
            self.resolution.scanned,
            self.resolution.resolved,
            self.resolution.early_resolved,
            self.resolution.pending_resolution,
            self.resolution.parse_misses,
            self.resolution.unreadable,
            self.resolution.submission_failures,
            self.creation.created,
            self.creation.duplicates,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PROPHET.
#[derive(Debug, thiserror::Error)]
pub enum ProphetError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger read failed: {0}")]
    LedgerRead(String),

    #[error("Submission failed for {action}: {message}")]
    Submission { action: String, message: String },

    #[error("Source unavailable ({source_name}): {message}")]
    SourceUnavailable { source_name: String, message: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
