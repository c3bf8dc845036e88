use async_trait::async_trait;
use thiserror::Error;

pub mod discord;
pub mod embed;

pub use discord::DiscordWebhook;
pub use embed::{build_notification, Branding, Embed, NotificationKind};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected notification with {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Chat destination for match notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, embed: &Embed) -> Result<(), NotifyError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
