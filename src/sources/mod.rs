//! Truth source clients.
//!
//! One client per domain behind a narrow trait, so the evaluator stays
//! source-agnostic and one domain's outage only stalls its own category.
//! Clients never return errors: failures are retried under the client's
//! `RetryPolicy`, logged, counted, and surfaced as `None`.

pub mod fixtures;
pub mod prices;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{Fixture, FinishedScore, FixtureQuery, PriceQuote, ProphetError};

/// Fixture results and schedules.
#[async_trait]
pub trait FixtureSource: Send + Sync {
    /// Upcoming fixtures in the given leagues within `horizon_days`.
    async fn list_upcoming(&self, leagues: &[String], horizon_days: i64) -> Vec<Fixture>;

    /// Final score of a finished fixture. `None` when unavailable or
    /// not finished yet.
    async fn lookup_result(&self, query: &FixtureQuery) -> Option<FinishedScore>;

    /// Lookups that exhausted their retries since start-up.
    fn outage_count(&self) -> u64;
}

/// Spot and historical prices.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn current(&self, symbol: &str) -> Option<PriceQuote>;

    /// Maximum high over samples inside `[start, end]`.
    async fn max_high_in_window(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Decimal>;

    /// Percentage change of the window's high over its opening close.
    async fn window_change_pct(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<f64>;

    fn outage_count(&self) -> u64;
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1500))
    }
}

impl RetryPolicy {
    /// `attempts` is clamped to at least one.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// No delay; used by tests and one-shot tools.
    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds or attempts run out. Returns the last
    /// error on exhaustion.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts => {
                    debug!(label, attempt, error = %e, delay_ms = self.delay.as_millis() as u64, "Retrying source call");
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Non-success HTTP status from a provider.
pub(crate) fn status_error(
    source_name: &str,
    status: reqwest::StatusCode,
    what: &str,
) -> anyhow::Error {
    ProphetError::SourceUnavailable {
        source_name: source_name.to_string(),
        message: format!("HTTP {status} for {what}"),
    }
    .into()
}

/// Outage bookkeeping shared by the concrete clients.
#[derive(Debug, Default)]
pub(crate) struct OutageCounter(AtomicU64);

impl OutageCounter {
    /// Log an exhausted call and count it.
    pub(crate) fn record(&self, source: &str, label: &str, error: &anyhow::Error) {
        self.0.fetch_add(1, Ordering::Relaxed);
        warn!(kind = "source_unavailable", source, label, error = %error, "Source call failed after retries");
    }

    pub(crate) fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
