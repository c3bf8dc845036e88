//! Rendering of match notifications into Discord-style embeds.
//!
//! Everything here is pure: the same match, kind and branding always render
//! the same embed, which keeps the tracker tests free of string matching on
//! network payloads.

use chrono::TimeZone;
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::Match;

/// Team-specific presentation settings.
#[derive(Debug, Clone)]
pub struct Branding {
    /// Exact upstream name of the tracked team, used for opponent resolution
    pub team_name: String,
    /// Timezone kickoff times are shown in
    pub timezone: Tz,
    /// Thumbnail used when the opponent has no badge
    pub default_thumbnail: String,
    pub footer: String,
    /// 0xRRGGBB
    pub color: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Reminder,
    FinalScore,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub thumbnail: EmbedImage,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

impl Embed {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

pub fn build_notification(m: &Match, kind: NotificationKind, branding: &Branding) -> Embed {
    let (opponent, opponent_badge) = m.opponent(&branding.team_name);
    let local_kickoff = branding.timezone.from_utc_datetime(&m.kickoff);

    let (title, description, detail) = match kind {
        NotificationKind::Reminder => (
            "⚽ Matchday tomorrow! ⚽",
            format!(
                "Tomorrow ({}) {} plays a game in **{}**.",
                local_kickoff.format("%d-%m-%Y"),
                branding.team_name,
                m.league
            ),
            field("Time", local_kickoff.format("%H:%M").to_string()),
        ),
        NotificationKind::FinalScore => (
            "🏆 Match Ended! 🏆",
            format!("{} played a game in **{}**.", branding.team_name, m.league),
            field(
                "Final Score",
                m.score_line().unwrap_or_else(|| "unavailable".to_string()),
            ),
        ),
    };

    Embed {
        title: title.to_string(),
        description,
        color: branding.color,
        thumbnail: EmbedImage {
            url: opponent_badge
                .unwrap_or(&branding.default_thumbnail)
                .to_string(),
        },
        fields: vec![field("Opponent", opponent.to_string()), detail],
        footer: EmbedFooter {
            text: branding.footer.clone(),
        },
    }
}

fn field(name: &str, value: String) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value,
        inline: true,
    }
}
