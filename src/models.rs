use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Minutes after kickoff after which a result lookup is attempted
/// (regulation time, stoppage and a margin for extra time).
pub const FINAL_SCORE_WINDOW_MINUTES: i64 = 130;

/// A fixture as reported by the fixtures API
#[derive(Debug, Clone)]
pub struct Match {
    /// Upstream event ID (`idEvent`)
    pub id: String,
    pub event_name: Option<String>,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub home_badge: Option<String>,
    pub away_badge: Option<String>,
    /// Scheduled kickoff, UTC
    pub kickoff: NaiveDateTime,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    /// Raw upstream status, e.g. "Match Finished", "Not Started"
    pub status: Option<String>,
}

impl PartialEq for Match {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Match {}

impl Match {
    /// Resolve the opponent of `team` and that side's badge.
    ///
    /// The tracked team is identified by exact name match on the home side;
    /// anything else is treated as an away fixture.
    pub fn opponent(&self, team: &str) -> (&str, Option<&str>) {
        if self.home_team == team {
            (&self.away_team, self.away_badge.as_deref())
        } else {
            (&self.home_team, self.home_badge.as_deref())
        }
    }

    /// "Home 2 - 1 Away"
    pub fn score_line(&self) -> Option<String> {
        match (self.home_score, self.away_score) {
            (Some(h), Some(a)) => Some(format!(
                "{} {} - {} {}",
                self.home_team, h, a, self.away_team
            )),
            _ => None,
        }
    }
}

/// Outcome of looking up a single event's result.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultLookup {
    /// Upstream reports the match as finished; scores are populated.
    Final(Match),
    /// Event exists but is not finished yet; `kickoff` is as upstream now
    /// schedules it.
    NotFinished {
        status: Option<String>,
        kickoff: NaiveDateTime,
    },
    /// Upstream returned no event for the ID.
    Missing,
}

/// Where the tracked match currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Idle,
    AwaitingReminder,
    Reminded,
    AwaitingResult,
}

/// The single persisted "next match" record.
///
/// Field names follow the upstream event keys so records written by earlier
/// deployments (which only stored `idEvent`, `dateEvent`, `strTime` and
/// `strEvent`) still decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMatch {
    #[serde(rename = "idEvent", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "dateEvent")]
    pub date: NaiveDate,
    #[serde(rename = "strTime")]
    pub time: NaiveTime,
    #[serde(rename = "strEvent", default)]
    pub event_name: Option<String>,
    #[serde(rename = "strLeague", default, skip_serializing_if = "Option::is_none")]
    pub league: Option<String>,
    #[serde(rename = "strHomeTeam", default, skip_serializing_if = "Option::is_none")]
    pub home_team: Option<String>,
    #[serde(rename = "strAwayTeam", default, skip_serializing_if = "Option::is_none")]
    pub away_team: Option<String>,
    #[serde(rename = "strHomeTeamBadge", default, skip_serializing_if = "Option::is_none")]
    pub home_badge: Option<String>,
    #[serde(rename = "strAwayTeamBadge", default, skip_serializing_if = "Option::is_none")]
    pub away_badge: Option<String>,
    /// Dedup marker: ID of the match a reminder has been delivered for.
    #[serde(rename = "reminderSentFor", default, skip_serializing_if = "Option::is_none")]
    pub reminder_sent_for: Option<String>,
}

impl PendingMatch {
    pub fn from_match(m: &Match) -> Self {
        PendingMatch {
            id: m.id.clone(),
            date: m.kickoff.date(),
            time: m.kickoff.time(),
            event_name: m
                .event_name
                .clone()
                .or_else(|| Some(format!("{} vs {}", m.home_team, m.away_team))),
            league: Some(m.league.clone()),
            home_team: Some(m.home_team.clone()),
            away_team: Some(m.away_team.clone()),
            home_badge: m.home_badge.clone(),
            away_badge: m.away_badge.clone(),
            reminder_sent_for: None,
        }
    }

    pub fn kickoff(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn estimated_end(&self) -> DateTime<Utc> {
        self.kickoff().and_utc() + Duration::minutes(FINAL_SCORE_WINDOW_MINUTES)
    }

    pub fn reminder_sent(&self) -> bool {
        self.reminder_sent_for.as_deref() == Some(self.id.as_str())
    }

    pub fn with_reminder_sent(mut self) -> Self {
        self.reminder_sent_for = Some(self.id.clone());
        self
    }

    /// Same match moved to a new kickoff. The reminder is owed again.
    pub fn rescheduled(mut self, kickoff: NaiveDateTime) -> Self {
        self.date = kickoff.date();
        self.time = kickoff.time();
        self.reminder_sent_for = None;
        self
    }

    pub fn phase(&self, now: DateTime<Utc>) -> MatchPhase {
        if now > self.estimated_end() {
            MatchPhase::AwaitingResult
        } else if self.reminder_sent() {
            MatchPhase::Reminded
        } else {
            MatchPhase::AwaitingReminder
        }
    }

    pub fn display_name(&self) -> &str {
        self.event_name.as_deref().unwrap_or(&self.id)
    }

    /// Rebuild a displayable match from the stored fields, if they were stored.
    pub fn to_match(&self) -> Option<Match> {
        Some(Match {
            id: self.id.clone(),
            event_name: self.event_name.clone(),
            league: self.league.clone()?,
            home_team: self.home_team.clone()?,
            away_team: self.away_team.clone()?,
            home_badge: self.home_badge.clone(),
            away_badge: self.away_badge.clone(),
            kickoff: self.kickoff(),
            home_score: None,
            away_score: None,
            status: None,
        })
    }
}

/// Phase for an optional pending record; no record means idle.
pub fn phase_of(pending: Option<&PendingMatch>, now: DateTime<Utc>) -> MatchPhase {
    pending.map_or(MatchPhase::Idle, |p| p.phase(now))
}

/// True when `kickoff` falls on the UTC calendar day after `now`.
pub fn is_day_before(now: DateTime<Utc>, kickoff: NaiveDateTime) -> bool {
    kickoff.date().pred_opt() == Some(now.date_naive())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn juve_inter() -> Match {
        Match {
            id: "1".into(),
            event_name: Some("Juventus vs Inter".into()),
            league: "Serie A".into(),
            home_team: "Juventus".into(),
            away_team: "Inter".into(),
            home_badge: Some("https://img/juve.png".into()),
            away_badge: Some("https://img/inter.png".into()),
            kickoff: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(18, 0, 0)
                .unwrap(),
            home_score: Some(2),
            away_score: Some(1),
            status: Some("Match Finished".into()),
        }
    }

    #[test]
    fn opponent_is_away_side_for_home_fixture() {
        let m = juve_inter();
        assert_eq!(m.opponent("Juventus"), ("Inter", Some("https://img/inter.png")));
    }

    #[test]
    fn opponent_is_home_side_for_away_fixture() {
        let m = juve_inter();
        assert_eq!(m.opponent("Inter"), ("Juventus", Some("https://img/juve.png")));
    }

    #[test]
    fn score_line_requires_both_scores() {
        let mut m = juve_inter();
        assert_eq!(m.score_line().as_deref(), Some("Juventus 2 - 1 Inter"));
        m.away_score = None;
        assert!(m.score_line().is_none());
    }

    #[test]
    fn day_before_uses_calendar_dates() {
        let kickoff = juve_inter().kickoff;
        let late_evening = Utc.with_ymd_and_hms(2024, 4, 30, 23, 59, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 4, 30, 0, 1, 0).unwrap();
        let two_days = Utc.with_ymd_and_hms(2024, 4, 29, 18, 0, 0).unwrap();
        let same_day = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        assert!(is_day_before(late_evening, kickoff));
        assert!(is_day_before(early, kickoff));
        assert!(!is_day_before(two_days, kickoff));
        assert!(!is_day_before(same_day, kickoff));
    }

    #[test]
    fn phase_transitions_at_final_score_window() {
        let pending = PendingMatch::from_match(&juve_inter());
        let before = Utc.with_ymd_and_hms(2024, 5, 1, 20, 10, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 5, 1, 20, 11, 0).unwrap();
        assert_eq!(pending.phase(before), MatchPhase::AwaitingReminder);
        assert_eq!(pending.phase(after), MatchPhase::AwaitingResult);
        assert_eq!(
            pending.clone().with_reminder_sent().phase(before),
            MatchPhase::Reminded
        );
        assert_eq!(phase_of(None, after), MatchPhase::Idle);
    }

    #[test]
    fn rescheduling_moves_kickoff_and_resets_reminder() {
        let pending = PendingMatch::from_match(&juve_inter()).with_reminder_sent();
        let new_kickoff = NaiveDate::from_ymd_opt(2024, 5, 8)
            .unwrap()
            .and_hms_opt(20, 45, 0)
            .unwrap();

        let moved = pending.rescheduled(new_kickoff);

        assert_eq!(moved.kickoff(), new_kickoff);
        assert!(!moved.reminder_sent());
        assert_eq!(moved.id, "1");
    }

    #[test]
    fn marker_for_other_match_does_not_count() {
        let mut pending = PendingMatch::from_match(&juve_inter());
        pending.reminder_sent_for = Some("99".into());
        assert!(!pending.reminder_sent());
    }

    #[test]
    fn pending_record_serializes_with_upstream_keys() {
        let pending = PendingMatch::from_match(&juve_inter()).with_reminder_sent();
        let json = serde_json::to_value(&pending).unwrap();
        assert_eq!(json["idEvent"], "1");
        assert_eq!(json["dateEvent"], "2024-05-01");
        assert_eq!(json["strTime"], "18:00:00");
        assert_eq!(json["reminderSentFor"], "1");
        assert_eq!(json["strAwayTeam"], "Inter");
    }

    #[test]
    fn minimal_legacy_record_decodes() {
        let raw = r#"{"idEvent":2070001,"dateEvent":"2024-05-01","strTime":"18:00:00","strEvent":"Juventus vs Inter"}"#;
        let pending: PendingMatch = serde_json::from_str(raw).unwrap();
        assert_eq!(pending.id, "2070001");
        assert_eq!(pending.display_name(), "Juventus vs Inter");
        assert!(pending.to_match().is_none());
        assert!(!pending.reminder_sent());
    }
}
