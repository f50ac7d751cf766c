//! Spot and historical price source.
//!
//! Historical candles and a fallback spot price come from the Yahoo
//! Finance chart API; when a CoinMarketCap key is configured, crypto spot
//! prices come from CoinMarketCap instead.
//!
//! API: `https://query1.finance.yahoo.com/v8/finance/chart/{symbol}`
//! Auth: none.
//! API: `https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest`
//! Auth: `X-CMC_PRO_API_KEY` header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::{status_error, OutageCounter, PriceSource, RetryPolicy};
use crate::types::{Candle, PriceQuote};

const YAHOO: &str = "yahoo";
const COINMARKETCAP: &str = "coinmarketcap";
const CMC_QUOTES_URL: &str = "https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest";

/// Windows up to this long are fetched at 5-minute resolution.
const FINE_INTERVAL_MAX_HOURS: i64 = 24;

// ---------------------------------------------------------------------------
// API response types (Yahoo chart)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    /// Unix seconds, UTC.
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl ChartEnvelope {
    fn into_result(self) -> Result<ChartResult> {
        if let Some(err) = self.chart.error.filter(|e| !e.is_null()) {
            anyhow::bail!("Yahoo chart error: {err}");
        }
        self.chart
            .result
            .and_then(|r| r.into_iter().next())
            .context("Yahoo chart response had no result")
    }
}

impl ChartResult {
    /// Zip the parallel arrays into candles with UTC timestamps.
    fn candles(&self) -> Vec<Candle> {
        let empty = QuoteSeries::default();
        let q = self.indicators.quote.first().unwrap_or(&empty);
        let at = |v: &Vec<Option<f64>>, i: usize| v.get(i).copied().flatten();
        self.timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, ts)| {
                Some(Candle {
                    timestamp: DateTime::<Utc>::from_timestamp(*ts, 0)?,
                    open: at(&q.open, i),
                    high: at(&q.high, i),
                    low: at(&q.low, i),
                    close: at(&q.close, i),
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct CmcResponse {
    data: HashMap<String, CmcAsset>,
}

#[derive(Debug, Deserialize)]
struct CmcAsset {
    quote: HashMap<String, CmcQuote>,
}

#[derive(Debug, Deserialize)]
struct CmcQuote {
    price: f64,
}

// ---------------------------------------------------------------------------
// Window math
// ---------------------------------------------------------------------------

/// Samples whose timestamp lies within `[start, end]`, inclusive.
fn in_window(candles: &[Candle], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Candle> {
    candles
        .iter()
        .filter(|c| c.timestamp >= start && c.timestamp <= end)
        .copied()
        .collect()
}

/// Highest high inside `[start, end]`.
pub fn max_high_between(candles: &[Candle], start: DateTime<Utc>, end: DateTime<Utc>) -> Option<f64> {
    in_window(candles, start, end)
        .iter()
        .filter_map(|c| c.high)
        .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.max(h))))
}

/// (max high − first close) / first close × 100 inside `[start, end]`.
pub fn change_pct_between(candles: &[Candle], start: DateTime<Utc>, end: DateTime<Utc>) -> Option<f64> {
    let window = in_window(candles, start, end);
    let opening_close = window.iter().find_map(|c| c.close).filter(|c| *c > 0.0)?;
    let high = max_high_between(&window, start, end)?;
    Some((high - opening_close) / opening_close * 100.0)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PriceClient {
    http: Client,
    base_url: String,
    cmc_api_key: Option<SecretString>,
    /// Appended to bare symbols for Yahoo, e.g. "-USD" for crypto.
    symbol_suffix: String,
    retry: RetryPolicy,
    outages: OutageCounter,
}

impl PriceClient {
    pub fn new(
        base_url: &str,
        cmc_api_key: Option<SecretString>,
        symbol_suffix: &str,
        retry: RetryPolicy,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (compatible; PROPHET/0.1.0)")
            .build()
            .context("Failed to build prices HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cmc_api_key,
            symbol_suffix: symbol_suffix.to_string(),
            retry,
            outages: OutageCounter::default(),
        })
    }

    /// Crypto pricing: bare symbols are quoted against USD.
    pub fn crypto(
        base_url: &str,
        cmc_api_key: Option<SecretString>,
        retry: RetryPolicy,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        Self::new(base_url, cmc_api_key, "-USD", retry, timeout)
    }

    /// Equity pricing: symbols are used as listed.
    pub fn stocks(base_url: &str, retry: RetryPolicy, timeout: std::time::Duration) -> Result<Self> {
        Self::new(base_url, None, "", retry, timeout)
    }

    fn yahoo_symbol(&self, symbol: &str) -> String {
        let symbol = symbol.trim().to_uppercase();
        if self.symbol_suffix.is_empty() || symbol.ends_with(&self.symbol_suffix) {
            symbol
        } else {
            format!("{symbol}{}", self.symbol_suffix)
        }
    }

    async fn fetch_chart(&self, symbol: &str, query: &str) -> Result<ChartResult> {
        let url = format!(
            "{}/v8/finance/chart/{}?{query}",
            self.base_url,
            urlencoding::encode(&self.yahoo_symbol(symbol)),
        );
        debug!(url = %url, "Fetching Yahoo chart");

        let resp = self.http.get(&url).send().await.context("Yahoo chart request failed")?;
        if !resp.status().is_success() {
            return Err(status_error(YAHOO, resp.status(), symbol));
        }
        let envelope: ChartEnvelope = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Yahoo chart for {symbol}"))?;
        envelope.into_result()
    }

    /// Candles covering `[start, end]`, padded by one interval each side
    /// so edge samples are not lost to provider bucketing.
    async fn fetch_window(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Candle>> {
        let (interval, pad) = if end - start <= Duration::hours(FINE_INTERVAL_MAX_HOURS) {
            ("5m", Duration::minutes(5))
        } else {
            ("1h", Duration::hours(1))
        };
        let query = format!(
            "period1={}&period2={}&interval={interval}",
            (start - pad).timestamp(),
            (end + pad).timestamp(),
        );
        let result = self.fetch_chart(symbol, &query).await?;
        Ok(result.candles())
    }

    async fn fetch_yahoo_spot(&self, symbol: &str) -> Result<f64> {
        let result = self.fetch_chart(symbol, "range=1d&interval=1h").await?;
        result
            .meta
            .regular_market_price
            .or_else(|| result.candles().iter().rev().find_map(|c| c.close))
            .with_context(|| format!("No spot price in Yahoo chart for {symbol}"))
    }

    async fn fetch_cmc_spot(&self, key: &SecretString, symbol: &str) -> Result<f64> {
        let symbol = symbol.trim().to_uppercase();
        let resp = self
            .http
            .get(CMC_QUOTES_URL)
            .query(&[("symbol", symbol.as_str()), ("convert", "USD")])
            .header("Accepts", "application/json")
            .header("X-CMC_PRO_API_KEY", key.expose_secret().as_str())
            .send()
            .await
            .context("CoinMarketCap request failed")?;
        if !resp.status().is_success() {
            return Err(status_error(COINMARKETCAP, resp.status(), &symbol));
        }
        let data: CmcResponse = resp.json().await.context("Failed to parse CoinMarketCap response")?;
        data.data
            .get(&symbol)
            .and_then(|a| a.quote.get("USD"))
            .map(|q| q.price)
            .with_context(|| format!("CoinMarketCap response missing {symbol}"))
    }

    /// Spot price and the provider that served it.
    async fn spot(&self, symbol: &str) -> Result<(f64, &'static str)> {
        if let Some(key) = &self.cmc_api_key {
            match self.fetch_cmc_spot(key, symbol).await {
                Ok(price) => return Ok((price, COINMARKETCAP)),
                Err(e) => debug!(symbol, error = %e, "CoinMarketCap spot failed, trying Yahoo"),
            }
        }
        Ok((self.fetch_yahoo_spot(symbol).await?, YAHOO))
    }

    async fn window(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Vec<Candle>> {
        match self.retry.run("chart", || self.fetch_window(symbol, start, end)).await {
            Ok(candles) => Some(candles),
            Err(e) => {
                self.outages.record(YAHOO, "chart", &e);
                None
            }
        }
    }
}

#[async_trait]
impl PriceSource for PriceClient {
    async fn current(&self, symbol: &str) -> Option<PriceQuote> {
        match self.retry.run("spot", || self.spot(symbol)).await {
            Ok((price, source)) => {
                let price = Decimal::from_f64(price)?;
                Some(PriceQuote::new(symbol.trim().to_uppercase(), price, source))
            }
            Err(e) => {
                self.outages.record("prices", "spot", &e);
                None
            }
        }
    }

    async fn max_high_in_window(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Decimal> {
        let candles = self.window(symbol, start, end).await?;
        max_high_between(&candles, start, end).and_then(Decimal::from_f64)
    }

    async fn window_change_pct(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<f64> {
        let candles = self.window(symbol, start, end).await?;
        change_pct_between(&candles, start, end)
    }

    fn outage_count(&self) -> u64 {
        self.outages.get()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
