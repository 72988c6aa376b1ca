mod config;
mod db;
mod diff;
mod error;
mod notify;
mod poller;
mod scraper;
mod snapshot;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, POLL_INTERVAL_SETTING, SHUTDOWN_GRACE_SECS};
use crate::db::{FeedStore, SavedSearchStore, SettingsStore};
use crate::error::Result;
use crate::notify::{LogNotifier, Notifier};
use crate::poller::Poller;
use crate::scraper::{ProcessScraper, ScraperInvoker};
use crate::snapshot::SnapshotStore;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(mut cfg: Config) -> Result<()> {
    let pool = db::connect(&cfg.db_path).await?;

    // A persisted setting takes precedence over the env default, so the GUI
    // can adjust the interval without touching the environment.
    let settings = SettingsStore::new(pool.clone());
    if let Some(raw) = settings.get(POLL_INTERVAL_SETTING).await? {
        match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => {
                info!(secs, "poll interval overridden from settings");
                cfg.poll_interval_secs = secs;
            }
            _ => warn!(value = %raw, "ignoring invalid {POLL_INTERVAL_SETTING} setting"),
        }
    }

    tokio::fs::create_dir_all(&cfg.snapshot_dir).await?;

    let searches = SavedSearchStore::new(pool.clone());
    let feed = FeedStore::new(pool.clone());
    let snapshots = SnapshotStore::new(cfg.snapshot_dir.clone());
    let invoker: Arc<dyn ScraperInvoker> = Arc::new(ProcessScraper::from_config(&cfg));
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = Poller::new(cfg, searches, feed, snapshots, invoker, notifier, shutdown_rx);
    let handle = tokio::spawn(poller.run());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    // Graceful, not instant: an in-flight scrape is allowed to finish.
    if tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), handle)
        .await
        .is_err()
    {
        warn!("poller did not stop within {SHUTDOWN_GRACE_SECS}s, exiting anyway");
    }
    Ok(())
}
