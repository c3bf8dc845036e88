use clap::{Parser, ValueEnum};
use chrono_tz::Tz;
use std::time::Duration;

use crate::notify::Branding;

/// Where the pending match record is persisted between ticks.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBackend {
    /// GitHub Actions repository variable (for scheduled workflow runs)
    Github,
    /// Local SQLite file (for long-running deployments)
    Sqlite,
}

/// Matchday reminders and final scores for one team, posted to Discord
#[derive(Parser, Debug, Clone)]
#[command(name = "matchday-notifier", version, about)]
pub struct Config {
    /// Discord webhook URL notifications are posted to
    #[arg(long, env = "DISCORD_WEBHOOK_URL")]
    pub discord_webhook_url: String,

    /// Team name exactly as TheSportsDB spells it
    #[arg(long, env = "TEAM_NAME", default_value = "Juventus")]
    pub team_name: String,

    /// TheSportsDB team ID
    #[arg(long, env = "TEAM_ID", default_value = "133676")]
    pub team_id: String,

    /// IANA timezone kickoff times are displayed in
    #[arg(long, env = "DISPLAY_TIMEZONE", default_value = "Europe/Brussels")]
    pub display_timezone: String,

    /// TheSportsDB API base URL
    #[arg(
        long,
        env = "SPORTSDB_API_URL",
        default_value = "https://www.thesportsdb.com/api/v1/json"
    )]
    pub sportsdb_api_url: String,

    /// TheSportsDB API key
    #[arg(long, env = "SPORTSDB_API_KEY", default_value = "123")]
    pub sportsdb_api_key: String,

    /// State backend
    #[arg(long, env = "STATE_BACKEND", value_enum, default_value = "sqlite")]
    pub state_backend: StateBackend,

    /// Key the pending match record is stored under
    #[arg(long, env = "STATE_KEY", default_value = "NEXT_MATCH_INFO")]
    pub state_key: String,

    /// GitHub token with permission to manage repository variables
    #[arg(long, env = "GH_TOKEN", hide_env_values = true)]
    pub gh_token: Option<String>,

    /// GitHub repository holding the state variable (owner/name)
    #[arg(long, env = "GH_REPO")]
    pub gh_repo: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub github_api_url: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "matchday.db")]
    pub database_path: String,

    /// Run a single tick and exit (for cron-style schedulers)
    #[arg(long, env = "ONCE", default_value = "false")]
    pub once: bool,

    /// Seconds between ticks while no result is due
    #[arg(long, env = "IDLE_INTERVAL_SECS", default_value = "14400")]
    pub idle_interval_secs: u64,

    /// Seconds between result lookups once a match should have ended
    #[arg(long, env = "RESULT_RETRY_INTERVAL_SECS", default_value = "900")]
    pub result_retry_interval_secs: u64,

    /// Timeout for every outbound HTTP request
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "20")]
    pub http_timeout_secs: u64,

    /// Embed color as hex RGB
    #[arg(long, env = "EMBED_COLOR", default_value = "000000")]
    pub embed_color: String,

    /// Thumbnail used when the opponent has no badge
    #[arg(
        long,
        env = "DEFAULT_THUMBNAIL_URL",
        default_value = "https://nl.wikipedia.org/wiki/Juventus_FC#/media/Bestand:Juventus_FC_-_logo_black_(Italy,_2020).svg"
    )]
    pub default_thumbnail_url: String,

    /// Embed footer text
    #[arg(long, env = "FOOTER_TEXT", default_value = "Fino alla fine! 🖤🤍")]
    pub footer_text: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let webhook = url::Url::parse(&self.discord_webhook_url)
            .map_err(|e| anyhow::anyhow!("DISCORD_WEBHOOK_URL is not a valid URL: {}", e))?;
        if !matches!(webhook.scheme(), "http" | "https") {
            anyhow::bail!("DISCORD_WEBHOOK_URL must be an http(s) URL");
        }
        if self.state_backend == StateBackend::Github {
            if self.gh_token.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("GH_TOKEN is required with the github state backend");
            }
            match self.gh_repo.as_deref() {
                Some(repo) if is_owner_slash_name(repo) => {}
                _ => anyhow::bail!("GH_REPO must be set to owner/name with the github state backend"),
            }
        }
        self.timezone()?;
        self.color()?;
        if self.idle_interval_secs == 0 || self.result_retry_interval_secs == 0 {
            anyhow::bail!("poll intervals must be positive");
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be positive");
        }
        if self.team_id.trim().is_empty() || self.team_name.trim().is_empty() {
            anyhow::bail!("TEAM_ID and TEAM_NAME must not be empty");
        }
        Ok(())
    }

    pub fn timezone(&self) -> anyhow::Result<Tz> {
        self.display_timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid DISPLAY_TIMEZONE {}: {}", self.display_timezone, e))
    }

    pub fn color(&self) -> anyhow::Result<u32> {
        let hex = self.embed_color.trim_start_matches("0x").trim_start_matches('#');
        u32::from_str_radix(hex, 16)
            .ok()
            .filter(|c| *c <= 0xFF_FF_FF)
            .ok_or_else(|| anyhow::anyhow!("EMBED_COLOR must be a hex RGB value, got {}", self.embed_color))
    }

    pub fn branding(&self) -> anyhow::Result<Branding> {
        Ok(Branding {
            team_name: self.team_name.clone(),
            timezone: self.timezone()?,
            default_thumbnail: self.default_thumbnail_url.clone(),
            footer: self.footer_text.clone(),
            color: self.color()?,
        })
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    pub fn result_retry_interval(&self) -> Duration {
        Duration::from_secs(self.result_retry_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn is_owner_slash_name(repo: &str) -> bool {
    let mut parts = repo.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
    )
}
