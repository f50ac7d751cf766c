//! Outcome evaluation: typed prediction + live truth data -> decision.
//!
//! `None` always means "not decidable yet" and must never be resolved on.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::sources::{FixtureSource, PriceSource};
use crate::types::{FixtureQuery, FinishedScore, Prediction};

/// Look-back for the stock rule ("surge +N% next hour").
pub const STOCK_WINDOW_HOURS: i64 = 1;

/// Source-agnostic evaluator over the truth source traits.
pub struct OutcomeEvaluator {
    fixtures: Arc<dyn FixtureSource>,
    prices: Arc<dyn PriceSource>,
    stocks: Option<Arc<dyn PriceSource>>,
    default_window_hours: u32,
}

impl OutcomeEvaluator {
    pub fn new(
        fixtures: Arc<dyn FixtureSource>,
        prices: Arc<dyn PriceSource>,
        default_window_hours: u32,
    ) -> Self {
        Self {
            fixtures,
            prices,
            stocks: None,
            default_window_hours: default_window_hours.max(1),
        }
    }

    /// Wire a price source for Stock predictions. Without one, Stock
    /// markets stay pending.
    pub fn with_stocks(mut self, stocks: Arc<dyn PriceSource>) -> Self {
        self.stocks = Some(stocks);
        self
    }

    /// Exhausted source calls across all wired sources since start-up.
    pub fn outage_count(&self) -> u64 {
        self.fixtures.outage_count()
            + self.prices.outage_count()
            + self.stocks.as_ref().map_or(0, |s| s.outage_count())
    }

    /// Decide `prediction` at `now` for a market closing at `deadline`.
    pub async fn evaluate(
        &self,
        prediction: &Prediction,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<bool> {
        match prediction {
            Prediction::Football {
                home,
                away,
                target_team,
            } => {
                let score = self
                    .fixtures
                    .lookup_result(&FixtureQuery::by_teams(home, away).played_by(deadline))
                    .await?;
                Some(target_won(&score, target_team))
            }
            Prediction::Crypto {
                symbol,
                target_price,
                window_hours,
            } => {
                self.evaluate_crypto(symbol, *target_price, *window_hours, deadline, now)
                    .await
            }
            Prediction::Stock {
                symbol,
                threshold_pct,
            } => self.evaluate_stock(symbol, *threshold_pct, deadline, now).await,
            Prediction::Unknown => None,
        }
    }

    async fn evaluate_crypto(
        &self,
        symbol: &str,
        target: Decimal,
        window_hours: Option<u32>,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<bool> {
        if let Some(quote) = self.prices.current(symbol).await {
            if quote.price >= target {
                debug!(symbol, spot = %quote.price, source = %quote.source, %target, "Spot price already clears target");
                return Some(true);
            }
        }

        if now <= deadline {
            return None;
        }

        let hours = window_hours.unwrap_or(self.default_window_hours);
        let Some(start) = deadline.checked_sub_signed(Duration::hours(i64::from(hours))) else {
            debug!(symbol, hours, "Window start out of range; market stays pending");
            return None;
        };
        let high = self.prices.max_high_in_window(symbol, start, deadline).await?;
        debug!(symbol, %high, %target, hours, "Window high at expiry");
        Some(high >= target)
    }

    async fn evaluate_stock(
        &self,
        symbol: &str,
        threshold_pct: f64,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<bool> {
        if now <= deadline {
            return None;
        }
        let Some(stocks) = self.stocks.as_ref() else {
            debug!(symbol, "No stock source wired; market stays pending");
            return None;
        };
        let start = deadline.checked_sub_signed(Duration::hours(STOCK_WINDOW_HOURS))?;
        let change = stocks.window_change_pct(symbol, start, deadline).await?;
        debug!(symbol, change, threshold_pct, "Window change at expiry");
        Some(change >= threshold_pct)
    }
}

/// Yes iff the side matching `target_team` scored strictly more. Draws
/// and an unmatched target count as No.
fn target_won(score: &FinishedScore, target_team: &str) -> bool {
    let target = target_team.to_lowercase();
    if score.home.to_lowercase().contains(&target) {
        score.home_score > score.away_score
    } else if score.away.to_lowercase().contains(&target) {
        score.away_score > score.home_score
    } else {
        false
    }
}
