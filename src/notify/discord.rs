use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{info, warn};

use super::embed::Embed;
use super::{Notifier, NotifyError};

/// Posts embeds to a Discord channel webhook.
///
/// A rate-limited post (429) is retried once after the advertised wait, as
/// long as that wait fits within the request timeout.
pub struct DiscordWebhook {
    http: Client,
    url: String,
    max_rate_limit_wait: Duration,
}

impl DiscordWebhook {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(DiscordWebhook {
            http,
            url: url.to_string(),
            max_rate_limit_wait: timeout,
        })
    }

    async fn post(&self, body: &serde_json::Value) -> Result<Response, NotifyError> {
        Ok(self.http.post(&self.url).json(body).send().await?)
    }
}

/// Seconds to wait from a 429: Discord's JSON `retry_after`, else the
/// `Retry-After` header.
fn retry_after(header: Option<&str>, body: &str) -> Option<Duration> {
    let from_body = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["retry_after"].as_f64());
    let secs = from_body.or_else(|| header?.trim().parse::<f64>().ok())?;
    Duration::try_from_secs_f64(secs).ok()
}

#[async_trait]
impl Notifier for DiscordWebhook {
    async fn deliver(&self, embed: &Embed) -> Result<(), NotifyError> {
        let body = serde_json::json!({ "embeds": [embed] });
        let mut resp = self.post(&body).await?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            let header = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = resp.text().await.unwrap_or_default();
            match retry_after(header.as_deref(), &text) {
                Some(wait) if wait <= self.max_rate_limit_wait => {
                    warn!("Discord rate limited, retrying in {:?}", wait);
                    tokio::time::sleep(wait).await;
                    resp = self.post(&body).await?;
                }
                _ => {
                    return Err(NotifyError::Rejected {
                        status: StatusCode::TOO_MANY_REQUESTS,
                        body: text,
                    })
                }
            }
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        info!("Notification '{}' sent to Discord", embed.title);
        Ok(())
    }

    fn name(&self) -> &str {
        "discord"
    }
}
