use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fixtures::FixtureProvider;
use crate::models::{is_day_before, phase_of, Match, MatchPhase, PendingMatch, ResultLookup};
use crate::notify::{build_notification, Branding, NotificationKind, Notifier};
use crate::state::{clear_pending, load_state, save_pending, StateStore, StoreError};

/// What a completed tick did. Transient fetch and delivery failures are
/// outcomes, not errors: the next tick retries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Upstream has nothing scheduled; state was cleared.
    NoUpcomingMatch,
    /// A new pending match was stored; no reminder due today.
    Scheduled,
    /// Upstream still lists a match that is already over or already
    /// reported; nothing was stored.
    AlreadyReported,
    /// The pending match has a new kickoff upstream; the record was updated.
    Rescheduled,
    ReminderSent,
    ReminderFailed,
    /// Pending match exists and nothing is due this tick.
    Waiting,
    /// Estimated end has passed but upstream has no final result yet.
    ResultNotReady,
    FinalScoreSent,
    FetchFailed,
    DeliveryFailed,
}

/// A tick could not durably commit its state transition.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("failed to read match state: {0}")]
    Read(#[source] StoreError),

    #[error("failed to persist match state: {0}")]
    Write(#[source] StoreError),
}

/// Result of one tick: the outcome plus the pending record as it now stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub pending: Option<PendingMatch>,
}

impl TickReport {
    fn new(outcome: TickOutcome, pending: Option<PendingMatch>) -> Self {
        TickReport { outcome, pending }
    }

    /// How long a long-running loop should sleep before the next tick.
    ///
    /// Awaiting a result (or recovering from a fetch failure) polls at
    /// `retry`; otherwise sleep `idle`, but wake up once the pending match's
    /// estimated end passes.
    pub fn next_delay(&self, now: DateTime<Utc>, idle: Duration, retry: Duration) -> Duration {
        if self.outcome == TickOutcome::FetchFailed {
            return retry;
        }
        let Some(pending) = &self.pending else {
            return idle;
        };
        if pending.phase(now) == MatchPhase::AwaitingResult {
            return retry;
        }
        let until_end = (pending.estimated_end() - now + chrono::Duration::minutes(1))
            .to_std()
            .unwrap_or(retry);
        until_end.min(idle)
    }
}

/// Drives the pending-match lifecycle: schedule, remind, report, clear.
pub struct Tracker {
    fixtures: Arc<dyn FixtureProvider>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    team_id: String,
    state_key: String,
    branding: Branding,
}

impl Tracker {
    pub fn new(
        fixtures: Arc<dyn FixtureProvider>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        team_id: impl Into<String>,
        state_key: impl Into<String>,
        branding: Branding,
    ) -> Self {
        Tracker {
            fixtures,
            store,
            notifier,
            team_id: team_id.into(),
            state_key: state_key.into(),
            branding,
        }
    }

    /// Run one tick against the state currently in the store.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, TickError> {
        let state = load_state(self.store.as_ref(), &self.state_key)
            .await
            .map_err(TickError::Read)?;
        let reported = state.final_score_sent_for;

        match (phase_of(state.pending.as_ref(), now), state.pending) {
            (_, None) => self.find_next_match(now, reported.as_deref()).await,
            (MatchPhase::AwaitingResult, Some(pending)) => self.report_result(pending).await,
            (MatchPhase::AwaitingReminder, Some(pending)) if is_day_before(now, pending.kickoff()) => {
                self.remind_pending(pending).await
            }
            (phase, Some(pending)) => {
                debug!(
                    "Waiting on {} (kickoff {}, {:?})",
                    pending.display_name(),
                    pending.kickoff(),
                    phase
                );
                Ok(TickReport::new(TickOutcome::Waiting, Some(pending)))
            }
        }
    }

    async fn find_next_match(
        &self,
        now: DateTime<Utc>,
        reported: Option<&str>,
    ) -> Result<TickReport, TickError> {
        info!("No pending match, checking {} for the next one", self.fixtures.name());

        let next = match self.fixtures.get_next_match(&self.team_id).await {
            Ok(next) => next,
            Err(e) => {
                warn!("Error fetching next match: {}", e);
                return Ok(TickReport::new(TickOutcome::FetchFailed, None));
            }
        };

        let Some(next) = next else {
            info!("No upcoming matches found, clearing {}", self.state_key);
            clear_pending(self.store.as_ref(), &self.state_key, reported)
                .await
                .map_err(TickError::Write)?;
            return Ok(TickReport::new(TickOutcome::NoUpcomingMatch, None));
        };

        let pending = PendingMatch::from_match(&next);
        if reported == Some(next.id.as_str()) || now > pending.estimated_end() {
            info!(
                "Skipping {} (kickoff {}): already over or reported",
                pending.display_name(),
                next.kickoff
            );
            return Ok(TickReport::new(TickOutcome::AlreadyReported, None));
        }

        info!(
            "Next match found: {} vs {} on {}",
            next.home_team, next.away_team, next.kickoff
        );
        save_pending(self.store.as_ref(), &self.state_key, &pending)
            .await
            .map_err(TickError::Write)?;

        if is_day_before(now, next.kickoff) {
            self.send_reminder(pending, &next).await
        } else {
            debug!("No reminder due today for {}", pending.display_name());
            Ok(TickReport::new(TickOutcome::Scheduled, Some(pending)))
        }
    }

    /// Reminder for a match that was stored on an earlier tick.
    async fn remind_pending(&self, pending: PendingMatch) -> Result<TickReport, TickError> {
        let m = match pending.to_match() {
            Some(m) => m,
            None => match self.fixtures.lookup_event(&pending.id).await {
                Ok(Some(m)) => m,
                Ok(None) => {
                    warn!("Match {} no longer listed upstream", pending.id);
                    return Ok(TickReport::new(TickOutcome::ReminderFailed, Some(pending)));
                }
                Err(e) => {
                    warn!("Error fetching match {} for reminder: {}", pending.id, e);
                    return Ok(TickReport::new(TickOutcome::FetchFailed, Some(pending)));
                }
            },
        };
        self.send_reminder(pending, &m).await
    }

    async fn send_reminder(&self, pending: PendingMatch, m: &Match) -> Result<TickReport, TickError> {
        if pending.reminder_sent() {
            info!("Reminder already sent for {}", pending.display_name());
            return Ok(TickReport::new(TickOutcome::Waiting, Some(pending)));
        }

        let embed = build_notification(m, NotificationKind::Reminder, &self.branding);
        if let Err(e) = self.notifier.deliver(&embed).await {
            warn!("Reminder for {} not delivered: {}", pending.display_name(), e);
            return Ok(TickReport::new(TickOutcome::ReminderFailed, Some(pending)));
        }

        let pending = pending.with_reminder_sent();
        save_pending(self.store.as_ref(), &self.state_key, &pending)
            .await
            .map_err(TickError::Write)?;
        info!("Reminder sent for {}", pending.display_name());
        Ok(TickReport::new(TickOutcome::ReminderSent, Some(pending)))
    }

    async fn report_result(&self, pending: PendingMatch) -> Result<TickReport, TickError> {
        info!(
            "Match {} has ended, fetching final score",
            pending.display_name()
        );

        let m = match self.fixtures.get_match_result(&pending.id).await {
            Ok(ResultLookup::Final(m)) => m,
            Ok(ResultLookup::NotFinished { kickoff, .. }) if kickoff != pending.kickoff() => {
                info!(
                    "Match {} moved from {} to {}",
                    pending.id,
                    pending.kickoff(),
                    kickoff
                );
                let pending = pending.rescheduled(kickoff);
                save_pending(self.store.as_ref(), &self.state_key, &pending)
                    .await
                    .map_err(TickError::Write)?;
                return Ok(TickReport::new(TickOutcome::Rescheduled, Some(pending)));
            }
            Ok(ResultLookup::NotFinished { status, .. }) => {
                info!(
                    "Final score for {} not available yet (status: {})",
                    pending.id,
                    status.as_deref().unwrap_or("none")
                );
                return Ok(TickReport::new(TickOutcome::ResultNotReady, Some(pending)));
            }
            Ok(ResultLookup::Missing) => {
                warn!("No match details found for {}", pending.id);
                return Ok(TickReport::new(TickOutcome::ResultNotReady, Some(pending)));
            }
            Err(e) => {
                warn!("Error fetching final score for {}: {}", pending.id, e);
                return Ok(TickReport::new(TickOutcome::FetchFailed, Some(pending)));
            }
        };

        let embed = build_notification(&m, NotificationKind::FinalScore, &self.branding);
        if let Err(e) = self.notifier.deliver(&embed).await {
            warn!("Final score for {} not delivered, will retry: {}", pending.id, e);
            return Ok(TickReport::new(TickOutcome::DeliveryFailed, Some(pending)));
        }

        clear_pending(self.store.as_ref(), &self.state_key, Some(&pending.id))
            .await
            .map_err(TickError::Write)?;
        info!(
            "Final score sent for {} ({}), back to waiting for the next match",
            pending.id,
            embed.field("Final Score").unwrap_or("no score")
        );
        Ok(TickReport::new(TickOutcome::FinalScoreSent, None))
    }
}
