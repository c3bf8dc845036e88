use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::provider::{FetchError, FixtureProvider};
use crate::models::Match;

/// Fixtures provider backed by TheSportsDB v1 JSON API.
/// Docs: <https://www.thesportsdb.com/api.php>
pub struct TheSportsDb {
    http: Client,
    api_key: String,
    /// Base URL for overriding in tests
    base_url: String,
}

impl TheSportsDb {
    pub fn new(api_key: Option<&str>, base_url: Option<&str>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = base_url
            .unwrap_or("https://www.thesportsdb.com/api/v1/json")
            .trim_end_matches('/')
            .to_string();
        Url::parse(&base_url).with_context(|| format!("Invalid TheSportsDB URL: {}", base_url))?;
        Ok(TheSportsDb {
            http,
            // "123" is TheSportsDB's public free-tier key
            api_key: api_key.unwrap_or("123").to_string(),
            base_url,
        })
    }

    fn endpoint(&self, path: &str, id: &str) -> Result<Url, FetchError> {
        let raw = format!("{}/{}/{}", self.base_url, self.api_key, path);
        Url::parse_with_params(&raw, &[("id", id)])
            .map_err(|e| FetchError::Malformed(format!("bad request URL {}: {}", raw, e)))
    }

    async fn get_events(&self, url: Url) -> Result<Vec<serde_json::Value>, FetchError> {
        debug!("Fetching {}", url.path());

        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status()));
        }

        let raw: serde_json::Value = resp.json().await?;
        events_array(&raw)
    }
}

#[async_trait]
impl FixtureProvider for TheSportsDb {
    fn name(&self) -> &str {
        "TheSportsDB"
    }

    async fn get_next_match(&self, team_id: &str) -> Result<Option<Match>, FetchError> {
        let events = self.get_events(self.endpoint("eventsnext.php", team_id)?).await?;
        earliest_match(&events)
    }

    async fn lookup_event(&self, match_id: &str) -> Result<Option<Match>, FetchError> {
        let events = self.get_events(self.endpoint("lookupevent.php", match_id)?).await?;
        Ok(events
            .iter()
            .filter_map(parse_event)
            .find(|m| m.id == match_id))
    }
}

/// `events` is `null` (or missing) when upstream has nothing to report.
fn events_array(raw: &serde_json::Value) -> Result<Vec<serde_json::Value>, FetchError> {
    match &raw["events"] {
        serde_json::Value::Null => Ok(vec![]),
        serde_json::Value::Array(a) => Ok(a.clone()),
        other => Err(FetchError::Malformed(format!(
            "expected `events` array, got {}",
            other
        ))),
    }
}

/// Pick the earliest parseable event. A non-empty list with nothing usable is
/// malformed rather than "no upcoming match", so state is not cleared on it.
fn earliest_match(events: &[serde_json::Value]) -> Result<Option<Match>, FetchError> {
    if events.is_empty() {
        return Ok(None);
    }
    let earliest = events
        .iter()
        .filter_map(parse_event)
        .min_by_key(|m| m.kickoff);
    match earliest {
        Some(m) => Ok(Some(m)),
        None => Err(FetchError::Malformed(format!(
            "none of {} events could be parsed",
            events.len()
        ))),
    }
}

fn parse_event(ev: &serde_json::Value) -> Option<Match> {
    let id = ev["idEvent"]
        .as_str()
        .map(str::to_string)
        .or_else(|| ev["idEvent"].as_i64().map(|v| v.to_string()))?;
    let home_team = ev["strHomeTeam"].as_str()?.to_string();
    let away_team = ev["strAwayTeam"].as_str()?.to_string();
    let kickoff = parse_kickoff(ev)?;

    Some(Match {
        id,
        event_name: non_empty(&ev["strEvent"]),
        league: ev["strLeague"].as_str().unwrap_or("unknown").to_string(),
        home_team,
        away_team,
        home_badge: non_empty(&ev["strHomeTeamBadge"]),
        away_badge: non_empty(&ev["strAwayTeamBadge"]),
        kickoff,
        home_score: parse_score(&ev["intHomeScore"]),
        away_score: parse_score(&ev["intAwayScore"]),
        status: non_empty(&ev["strStatus"]),
    })
}

fn parse_kickoff(ev: &serde_json::Value) -> Option<NaiveDateTime> {
    let from_parts = ev["dateEvent"].as_str().and_then(|d| {
        let date = NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()?;
        let time = parse_time(ev["strTime"].as_str()?)?;
        Some(date.and_time(time))
    });
    from_parts.or_else(|| {
        let ts = ev["strTimestamp"].as_str()?;
        NaiveDateTime::parse_from_str(ts.get(..19)?, "%Y-%m-%dT%H:%M:%S").ok()
    })
}

/// Accepts "18:00:00", "18:00:00+00:00" and "18:00".
fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    s.get(..8)
        .and_then(|hms| NaiveTime::parse_from_str(hms, "%H:%M:%S").ok())
        .or_else(|| NaiveTime::parse_from_str(s, "%H:%M").ok())
}

fn parse_score(v: &serde_json::Value) -> Option<i32> {
    v.as_str()
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| v.as_i64().and_then(|n| i32::try_from(n).ok()))
}

fn non_empty(v: &serde_json::Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
