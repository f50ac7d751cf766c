//! Market description grammar.
//!
//! Descriptions are the only place resolution parameters live, so they
//! are treated as a serialization format: the formatters here produce the
//! canonical strings written to the ledger and `parse` recovers the typed
//! `Prediction` from them (and from older free-form variants).
//!
//! Grammar, case-insensitive:
//!
//! ```text
//! football := [prefix ":"] home " vs " away [" (" league ")"] sep "Will " team " win" ["?"]
//! crypto   := ... "$" number ["k"] ... ["in next" | "in"] hours " hour" ...
//! stock    := ... SYMBOL ... [number "%"] ...
//! ```
//!
//! Branch precedence is Football, then Crypto, then Stock. A branch that
//! is triggered but cannot capture its required fields falls through to
//! the next one. Note that a description matching both the Football and
//! Crypto triggers always parses as Football; nothing checks for that
//! ambiguity.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::types::{Fixture, MarketCategory, Prediction};

/// Stock threshold when the description does not state one.
pub const DEFAULT_STOCK_THRESHOLD_PCT: f64 = 2.0;

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Canonical Football description. The home side is the YES team.
pub fn football_description(fixture: &Fixture) -> String {
    format!(
        "Football: {} vs {} ({}) - Will {} win?",
        fixture.home, fixture.away, fixture.league, fixture.home
    )
}

/// Canonical Crypto description.
pub fn crypto_description(
    name: &str,
    symbol: &str,
    target: Decimal,
    window_hours: u32,
    current: Decimal,
) -> String {
    format!(
        "Crypto: Will {name} ({symbol}) reach ${:.2} in next {window_hours} hours? (Current: ${:.2})",
        target, current
    )
}

/// Dedup key: trimmed, whitespace-collapsed, lowercased.
pub fn normalize(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Classify a description into a typed prediction. Never fails; absence
/// of structure yields `Prediction::Unknown`.
pub fn parse(description: &str, category: &MarketCategory) -> Prediction {
    let text = description.trim();
    let lower = text.to_ascii_lowercase();

    if *category == MarketCategory::Football || lower.contains(" vs ") {
        if let Some(p) = parse_football(text) {
            return p;
        }
    }

    if *category == MarketCategory::Crypto || mentions_crypto_asset(&lower) {
        if let Some(p) = parse_crypto(text) {
            return p;
        }
    }

    if *category == MarketCategory::Stocks || lower.contains("surge") || text.contains('%') {
        if let Some(p) = parse_stock(text) {
            return p;
        }
    }

    Prediction::Unknown
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '-' | '.' | ',' | ':' | ';' | '|' | '?' | '!')
}

fn parse_football(text: &str) -> Option<Prediction> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let vs = lower.find(" vs ")?;

    let home = text[..vs].rsplit(':').next()?.trim();
    if home.is_empty() {
        return None;
    }

    let rest = &text[vs + 4..];
    let rest_lower = &lower[vs + 4..];
    let (fixture_part, clause) = match rest_lower.find(" will ") {
        Some(i) => (&rest[..i], Some(&rest[i + 6..])),
        None => (rest, None),
    };

    let fixture_part = fixture_part.trim_end_matches(is_separator);
    let away = strip_league(fixture_part).trim();
    if away.is_empty() {
        return None;
    }

    let target_team = clause
        .and_then(target_from_clause)
        .unwrap_or_else(|| home.to_string());

    Some(Prediction::Football {
        home: home.to_string(),
        away: away.to_string(),
        target_team,
    })
}

/// "Man City (EPL)" -> "Man City".
fn strip_league(fixture_part: &str) -> &str {
    if fixture_part.ends_with(')') {
        if let Some(open) = fixture_part.rfind('(') {
            return &fixture_part[..open];
        }
    }
    fixture_part
}

/// "Liverpool win?" -> "Liverpool".
fn target_from_clause(clause: &str) -> Option<String> {
    let lower = clause.to_ascii_lowercase();
    let end = lower.rfind(" win")?;
    let team = clause[..end].trim();
    (!team.is_empty()).then(|| team.to_string())
}

fn words(lower: &str) -> impl Iterator<Item = &str> {
    lower.split(|c: char| !c.is_ascii_alphanumeric()).filter(|w| !w.is_empty())
}

fn mentions_crypto_asset(lower: &str) -> bool {
    ["bitcoin", "ethereum", "solana"].iter().any(|n| lower.contains(n))
        || words(lower).any(|w| matches!(w, "btc" | "eth" | "sol"))
}

fn crypto_symbol(lower: &str) -> &'static str {
    let has_word = |sym: &str| words(lower).any(|w| w == sym);
    if has_word("eth") || lower.contains("ethereum") {
        "ETH"
    } else if has_word("sol") || lower.contains("solana") {
        "SOL"
    } else {
        "BTC"
    }
}

fn parse_crypto(text: &str) -> Option<Prediction> {
    let lower = text.to_ascii_lowercase();
    let target_price = first_dollar_amount(text)?;
    Some(Prediction::Crypto {
        symbol: crypto_symbol(&lower).to_string(),
        target_price,
        window_hours: window_hours(&lower),
    })
}

/// First `$<number>` in the text; thousands separators and a trailing
/// `k` multiplier are accepted.
fn first_dollar_amount(text: &str) -> Option<Decimal> {
    text.match_indices('$').find_map(|(i, _)| {
        let after = &text[i + 1..];
        let end = after
            .find(|c: char| !(c.is_ascii_digit() || c == ',' || c == '.'))
            .unwrap_or(after.len());
        let raw = after[..end].trim_end_matches(['.', ',']).replace(',', "");
        if !raw.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        let value = Decimal::from_str(&raw).ok()?;
        match after[end..].chars().next() {
            Some('k') | Some('K') => Some(value * Decimal::ONE_THOUSAND),
            _ => Some(value),
        }
    })
}

/// "... in next 2 hours ..." -> 2.
fn window_hours(lower: &str) -> Option<u32> {
    let tokens: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
        .collect();
    tokens.windows(2).find_map(|pair| {
        let n: u32 = pair[0].parse().ok()?;
        (pair[1].starts_with("hour") && n > 0).then_some(n)
    })
}

fn parse_stock(text: &str) -> Option<Prediction> {
    let symbol = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find(|w| (2..=5).contains(&w.len()) && w.chars().all(|c| c.is_ascii_uppercase()))?;
    Some(Prediction::Stock {
        symbol: symbol.to_string(),
        threshold_pct: first_percentage(text).unwrap_or(DEFAULT_STOCK_THRESHOLD_PCT),
    })
}

/// First `<number>%` in the text.
fn first_percentage(text: &str) -> Option<f64> {
    text.match_indices('%').find_map(|(i, _)| {
        let before = &text[..i];
        let start = before
            .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
            .map(|p| p + 1)
            .unwrap_or(0);
        before[start..].trim_start_matches('.').parse::<f64>().ok()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
