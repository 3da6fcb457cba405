//! Instagram to Discord mirror - Main Entry Point
//!
//! Runs one sync pass over every account in the options file:
//! 1. Resolves each Instagram username to its account id
//! 2. Delivers posts not yet mirrored, oldest first
//! 3. Retracts mirrored posts that were deleted on Instagram

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ig_discord_mirror::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,ig_discord_mirror=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Instagram mirror starting...");

    // Load configuration
    let config = MirrorConfig::from_env()?;
    info!(
        "Configuration loaded: {} accounts from {:?}",
        config.options.accounts.len(),
        config.options_path
    );

    let store = Arc::new(
        WatermarkStore::new(&config.database_path)
            .with_context(|| format!("Failed to open database {:?}", config.database_path))?,
    );
    info!("Storage initialized at {:?}", config.database_path);

    let feed = Arc::new(
        InstagramClient::new(&config.session_id, config.http_timeout())
            .context("Failed to create Instagram client")?,
    );

    let timeout = config.http_timeout();
    let targets = resolve_targets(&config.options.accounts, feed.as_ref(), |url| {
        let hook = DiscordWebhook::from_url(url, timeout)?;
        Ok(Arc::new(hook) as Arc<dyn NotificationChannel>)
    })
    .await
    .context("Invalid webhook in options file")?;
    if targets.is_empty() {
        warn!("No account could be resolved, nothing to do");
        return Ok(());
    }

    let mut engine = SyncEngine::new(feed, store, Compositor::new(config.grid_layout()?));
    if let Some(dir) = &config.scratch_dir {
        engine = engine.with_scratch_root(dir);
    }
    let runner = Runner::new(Arc::new(engine)).with_concurrency(config.account_concurrency);

    let report = runner.run_once(&targets).await;
    if report.is_clean() {
        info!("Mirror run complete");
    } else {
        warn!(
            "Mirror run complete with {} failures and {} aborted accounts",
            report.failed(),
            report.aborted()
        );
    }
    Ok(())
}
