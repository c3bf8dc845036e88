use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Match, ResultLookup};

/// Transient failure talking to the fixtures API. Callers retry on a later tick.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fixtures API returned {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed fixtures payload: {0}")]
    Malformed(String),
}

/// Source of fixtures and results for the tracked team.
#[async_trait]
pub trait FixtureProvider: Send + Sync {
    /// Earliest upcoming match for `team_id`, or `None` when nothing is scheduled.
    async fn get_next_match(&self, team_id: &str) -> Result<Option<Match>, FetchError>;

    /// Raw lookup of one event, regardless of its status.
    async fn lookup_event(&self, match_id: &str) -> Result<Option<Match>, FetchError>;

    /// Result of one event; only `Final` once upstream marks it finished and
    /// both scores are present.
    async fn get_match_result(&self, match_id: &str) -> Result<ResultLookup, FetchError> {
        Ok(match self.lookup_event(match_id).await? {
            Some(m) if is_finished(m.status.as_deref()) && m.score_line().is_some() => {
                ResultLookup::Final(m)
            }
            Some(m) => ResultLookup::NotFinished {
                status: m.status,
                kickoff: m.kickoff,
            },
            None => ResultLookup::Missing,
        })
    }

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Whether an upstream status string means the final score is settled.
pub fn is_finished(status: Option<&str>) -> bool {
    match status.map(|s| s.trim().to_lowercase()) {
        Some(s) => matches!(s.as_str(), "match finished" | "ft" | "aet" | "pen"),
        None => false,
    }
}
