//! Football fixture source.
//!
//! Uses the TheSportsDB v1 JSON API for upcoming league fixtures and
//! finished results.
//!
//! API: `https://www.thesportsdb.com/api/v1/json/{key}/`
//! Auth: key embedded in the path; `3` is the public test key.
//!
//! Endpoints used:
//! - `eventsnextleague.php?id={league}`: upcoming events
//! - `lookupevent.php?id={event}`: single event by id
//! - `searchevents.php?e={Home}_vs_{Away}`: events by name

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use super::{status_error, FixtureSource, OutageCounter, RetryPolicy};
use crate::types::{FinishedScore, Fixture, FixtureQuery};

const SOURCE_NAME: &str = "thesportsdb";

/// Public TheSportsDB test key.
const PUBLIC_KEY: &str = "3";

/// How far before the market deadline a meeting may have kicked off and
/// still count as the fixture the market was opened for.
const RESULT_WINDOW_HOURS: i64 = 72;

/// Status strings that mean the final whistle has gone.
const FINISHED_STATUSES: &[&str] = &[
    "match finished",
    "ft",
    "aet",
    "pen",
    "ft_pen",
    "after extra time",
    "after penalties",
];

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EventsResponse {
    // The API returns `null` rather than `[]` when nothing matches.
    #[serde(default)]
    events: Option<Vec<SportsDbEvent>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    event: Option<Vec<SportsDbEvent>>,
}

#[derive(Debug, Clone, Deserialize)]
struct SportsDbEvent {
    #[serde(rename = "idEvent")]
    id_event: String,
    #[serde(rename = "strHomeTeam")]
    home_team: String,
    #[serde(rename = "strAwayTeam")]
    away_team: String,
    #[serde(rename = "strLeague", default)]
    league: Option<String>,
    #[serde(rename = "intHomeScore", default)]
    home_score: Option<String>,
    #[serde(rename = "intAwayScore", default)]
    away_score: Option<String>,
    #[serde(rename = "strStatus", default)]
    status: Option<String>,
    /// "2026-02-08T16:30:00" (UTC, no offset) on most events.
    #[serde(rename = "strTimestamp", default)]
    timestamp: Option<String>,
    #[serde(rename = "dateEvent", default)]
    date: Option<String>,
    #[serde(rename = "strTime", default)]
    time: Option<String>,
}

impl SportsDbEvent {
    fn is_finished(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| FINISHED_STATUSES.contains(&s.trim().to_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn kickoff(&self) -> Option<DateTime<Utc>> {
        if let Some(ts) = self.timestamp.as_deref().filter(|s| !s.is_empty()) {
            let trimmed = ts.trim_end_matches('Z');
            let trimmed = trimmed.split('+').next().unwrap_or(trimmed);
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
                return Some(naive.and_utc());
            }
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        let time = self
            .time
            .as_deref()
            .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M:%S").ok())
            .unwrap_or_default();
        Some(date.and_time(time).and_utc())
    }

    fn to_fixture(&self) -> Option<Fixture> {
        Some(Fixture {
            event_id: self.id_event.clone(),
            home: self.home_team.clone(),
            away: self.away_team.clone(),
            league: self.league.clone().unwrap_or_default(),
            kickoff: self.kickoff()?,
        })
    }

    /// Final score, only for finished events with both scores present.
    fn to_finished(&self, fetched_at: DateTime<Utc>) -> Option<FinishedScore> {
        if !self.is_finished() {
            return None;
        }
        let home_score = self.home_score.as_deref()?.trim().parse().ok()?;
        let away_score = self.away_score.as_deref()?.trim().parse().ok()?;
        Some(FinishedScore {
            home: self.home_team.clone(),
            away: self.away_team.clone(),
            home_score,
            away_score,
            status: self.status.clone().unwrap_or_default(),
            source: SOURCE_NAME.to_string(),
            fetched_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct FixtureClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    retry: RetryPolicy,
    outages: OutageCounter,
}

impl FixtureClient {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        retry: RetryPolicy,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("PROPHET/0.1.0")
            .build()
            .context("Failed to build fixtures HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry,
            outages: OutageCounter::default(),
        })
    }

    fn endpoint(&self, path_and_query: &str) -> String {
        let key = self
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().as_str())
            .unwrap_or(PUBLIC_KEY);
        format!("{}/{key}/{path_and_query}", self.base_url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let url = self.endpoint(path_and_query);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("TheSportsDB request failed")?;

        if !resp.status().is_success() {
            return Err(status_error(SOURCE_NAME, resp.status(), path_and_query));
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse TheSportsDB response for {path_and_query}"))
    }

    async fn events_by_id(&self, event_id: &str) -> Result<Vec<SportsDbEvent>> {
        let path = format!("lookupevent.php?id={}", urlencoding::encode(event_id));
        let data: EventsResponse = self.get_json(&path).await?;
        Ok(data.events.unwrap_or_default())
    }

    async fn events_by_name(&self, first: &str, second: &str) -> Result<Vec<SportsDbEvent>> {
        let path = format!("searchevents.php?e={}", urlencoding::encode(&search_term(first, second)));
        let data: SearchResponse = self.get_json(&path).await?;
        Ok(data.event.unwrap_or_default())
    }

    async fn events_next_league(&self, league: &str) -> Result<Vec<SportsDbEvent>> {
        let path = format!("eventsnextleague.php?id={}", urlencoding::encode(league));
        let data: EventsResponse = self.get_json(&path).await?;
        Ok(data.events.unwrap_or_default())
    }

    /// One lookup step under the retry policy. An exhausted step counts
    /// as an outage and yields no events.
    async fn step<F, Fut>(&self, label: &str, op: F) -> Vec<SportsDbEvent>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<SportsDbEvent>>>,
    {
        match self.retry.run(label, op).await {
            Ok(events) => events,
            Err(e) => {
                self.outages.record(SOURCE_NAME, label, &e);
                Vec::new()
            }
        }
    }
}

/// TheSportsDB search key: spaces become underscores.
fn search_term(first: &str, second: &str) -> String {
    format!("{}_vs_{}", first.trim(), second.trim()).replace(' ', "_")
}

/// Pick the finished event whose teams are the queried pair, in either
/// orientation. Search results include earlier seasons, so with a
/// deadline only meetings kicking off in the window before it count, and
/// the most recent of those wins.
fn pick_finished(
    events: &[SportsDbEvent],
    query: &FixtureQuery,
    fetched_at: DateTime<Utc>,
) -> Option<FinishedScore> {
    let same = |a: &str, b: &str| a.trim().eq_ignore_ascii_case(b.trim());
    let in_window = |e: &SportsDbEvent| match query.deadline {
        None => true,
        Some(deadline) => e.kickoff().is_some_and(|ko| {
            ko <= deadline && ko >= deadline - Duration::hours(RESULT_WINDOW_HOURS)
        }),
    };
    let mut matching: Vec<&SportsDbEvent> = events
        .iter()
        .filter(|e| {
            (same(&e.home_team, &query.home) && same(&e.away_team, &query.away))
                || (same(&e.home_team, &query.away) && same(&e.away_team, &query.home))
        })
        .filter(|e| in_window(e))
        .collect();
    matching.sort_by_key(|e| std::cmp::Reverse(e.kickoff()));
    matching.first().and_then(|e| e.to_finished(fetched_at))
}

#[async_trait]
impl FixtureSource for FixtureClient {
    async fn list_upcoming(&self, leagues: &[String], horizon_days: i64) -> Vec<Fixture> {
        let now = Utc::now();
        let horizon = now + Duration::days(horizon_days);
        let mut fixtures = Vec::new();

        for league in leagues {
            let events = self
                .step("eventsnextleague", || self.events_next_league(league))
                .await;
            let before = fixtures.len();
            fixtures.extend(
                events
                    .iter()
                    .filter_map(SportsDbEvent::to_fixture)
                    .filter(|f| f.kickoff > now && f.kickoff <= horizon),
            );
            debug!(league = %league, found = fixtures.len() - before, "Upcoming fixtures fetched");
        }

        fixtures.sort_by_key(|f| f.kickoff);
        fixtures
    }

    async fn lookup_result(&self, query: &FixtureQuery) -> Option<FinishedScore> {
        if let Some(id) = query.event_id.as_deref() {
            let events = self.step("lookupevent", || self.events_by_id(id)).await;
            if let Some(event) = events.iter().find(|e| e.id_event == id) {
                // An id hit is authoritative: unfinished means undecided.
                return event.to_finished(Utc::now());
            }
        }

        let forward = self
            .step("searchevents", || self.events_by_name(&query.home, &query.away))
            .await;
        if let Some(score) = pick_finished(&forward, query, Utc::now()) {
            info!(home = %query.home, away = %query.away, "Finished fixture found");
            return Some(score);
        }

        let reverse = self
            .step("searchevents", || self.events_by_name(&query.away, &query.home))
            .await;
        let score = pick_finished(&reverse, query, Utc::now());
        if score.is_some() {
            info!(home = %query.home, away = %query.away, "Finished fixture found via reverse search");
        }
        score
    }

    fn outage_count(&self) -> u64 {
        self.outages.get()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
