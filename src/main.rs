use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod fixtures;
mod models;
mod notify;
mod state;
mod tracker;

use config::{Config, StateBackend};
use fixtures::TheSportsDb;
use notify::DiscordWebhook;
use state::{GithubVariables, SqliteStore, StateStore};
use tracker::Tracker;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let store = open_store(&config)?;
    info!("State store: {} (key {})", store.name(), config.state_key);

    let fixtures = TheSportsDb::new(
        Some(config.sportsdb_api_key.as_str()),
        Some(config.sportsdb_api_url.as_str()),
        config.http_timeout(),
    )?;
    let notifier = DiscordWebhook::new(&config.discord_webhook_url, config.http_timeout())?;

    let tracker = Tracker::new(
        Arc::new(fixtures),
        store,
        Arc::new(notifier),
        config.team_id.clone(),
        config.state_key.clone(),
        config.branding()?,
    );

    if config.once {
        // A failed durable write surfaces as a nonzero exit so the scheduler retries.
        let report = tracker
            .tick(Utc::now())
            .await
            .context("Tick did not commit")?;
        info!("Tick finished: {:?}", report.outcome);
        return Ok(());
    }

    info!(
        "Tracking team {} ({}), idle interval {:?}, result retry {:?}",
        config.team_name,
        config.team_id,
        config.idle_interval(),
        config.result_retry_interval()
    );

    loop {
        let delay = match tracker.tick(Utc::now()).await {
            Ok(report) => {
                let delay = report.next_delay(
                    Utc::now(),
                    config.idle_interval(),
                    config.result_retry_interval(),
                );
                info!("Tick finished: {:?}, next check in {:?}", report.outcome, delay);
                delay
            }
            Err(e) => {
                error!("Tick failed: {}", e);
                config.result_retry_interval()
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match config.state_backend {
        StateBackend::Github => {
            let repo = config.gh_repo.as_deref().context("GH_REPO is not set")?;
            let token = config.gh_token.as_deref().context("GH_TOKEN is not set")?;
            Arc::new(GithubVariables::new(
                &config.github_api_url,
                repo,
                token,
                config.http_timeout(),
            )?) as Arc<dyn StateStore>
        }
        StateBackend::Sqlite => {
            let store = SqliteStore::open(&config.database_path)
                .with_context(|| format!("Failed to open {}", config.database_path))?;
            info!("Database opened: {}", config.database_path);
            Arc::new(store) as Arc<dyn StateStore>
        }
    };
    Ok(store)
}
