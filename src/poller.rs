use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::{Config, POLL_ERROR_BACKOFF_SECS, POLL_TICK_SECS};
use crate::db::{FeedStore, SavedSearchStore};
use crate::diff::new_listings;
use crate::error::Result;
use crate::notify::Notifier;
use crate::scraper::{ScrapeRequest, ScraperInvoker};
use crate::snapshot::SnapshotStore;
use crate::types::{CycleSearchResult, SavedSearch};

/// Background poll loop. Wakes once a second to check a coarse wall clock;
/// when the configured interval has elapsed since the last cycle start it
/// runs one cycle: every notification-enabled saved search is scraped,
/// diffed against its previous snapshot (or baseline on first run), the
/// delta appended to the feed, and one aggregated notification emitted.
///
/// Searches are processed sequentially — at most one scraper subprocess runs
/// at a time, and two cycles never overlap. Shutdown is cooperative: the
/// watch flag is observed each tick, so an in-flight scrape finishes before
/// the loop exits.
pub struct Poller {
    cfg: Config,
    searches: SavedSearchStore,
    feed: FeedStore,
    snapshots: SnapshotStore,
    invoker: Arc<dyn ScraperInvoker>,
    notifier: Arc<dyn Notifier>,
    shutdown: watch::Receiver<bool>,
    /// In-memory only: restarts reset this to "never", triggering an
    /// immediate cycle.
    last_cycle_start: Option<Instant>,
}

impl Poller {
    pub fn new(
        cfg: Config,
        searches: SavedSearchStore,
        feed: FeedStore,
        snapshots: SnapshotStore,
        invoker: Arc<dyn ScraperInvoker>,
        notifier: Arc<dyn Notifier>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            cfg,
            searches,
            feed,
            snapshots,
            invoker,
            notifier,
            shutdown,
            last_cycle_start: None,
        }
    }

    pub async fn run(mut self) {
        info!(interval_secs = self.cfg.poll_interval_secs, "poller started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let due = self
                .last_cycle_start
                .map_or(true, |t| t.elapsed() >= Duration::from_secs(self.cfg.poll_interval_secs));

            if due {
                self.last_cycle_start = Some(Instant::now());
                info!("starting poll cycle");
                match self.run_cycle().await {
                    Ok(()) => info!("poll cycle complete"),
                    Err(e) => {
                        // Cycle-level failures are unexpected (per-search
                        // errors are absorbed inside run_cycle); back off a
                        // little longer before re-checking the clock.
                        error!("poll cycle failed: {e}");
                        tokio::time::sleep(Duration::from_secs(POLL_ERROR_BACKOFF_SECS)).await;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(POLL_TICK_SECS)) => {}
                changed = self.shutdown.changed() => {
                    // A closed channel means the sender is gone and nobody
                    // can ever flag shutdown; exit instead of spinning on
                    // the immediately-ready error.
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("poller stopped");
    }

    /// One full cycle over every notification-enabled saved search. A failure
    /// in one search is logged and never aborts the rest of the cycle.
    pub(crate) async fn run_cycle(&self) -> Result<()> {
        let searches = self.searches.all().await?;
        let enabled: Vec<SavedSearch> =
            searches.into_iter().filter(|s| s.notifications_enabled).collect();

        if enabled.is_empty() {
            debug!("no saved searches with notifications enabled");
            return Ok(());
        }
        info!(count = enabled.len(), "processing saved searches");

        let mut results: Vec<CycleSearchResult> = Vec::new();
        for search in &enabled {
            let name = search.display_name();
            match self.process_search(search).await {
                Ok(Some(result)) => {
                    if result.items_added > 0 {
                        info!(
                            search = %name,
                            added = result.items_added,
                            total = result.current_total,
                            "found new items",
                        );
                        results.push(result);
                    } else {
                        info!(search = %name, "no new items");
                    }
                }
                Ok(None) => {}
                Err(e) => error!(search = %name, "search processing failed: {e}"),
            }
        }

        if results.is_empty() {
            info!("no new items in any saved search this cycle");
        } else {
            let total_new_items: i64 = results.iter().map(|r| r.current_total).sum();
            self.notifier.notify(&results, total_new_items);
        }
        Ok(())
    }

    /// Scrape → snapshot → diff → feed → promote, for one search. Any error
    /// leaves the previous snapshot untouched so the next cycle retries
    /// against the same baseline. Promotion runs only after the feed insert
    /// succeeded; a crash before it can at worst re-detect items, never lose
    /// them.
    async fn process_search(&self, search: &SavedSearch) -> Result<Option<CycleSearchResult>> {
        if search.options.sites.is_empty() {
            info!(search_id = search.id, "no sites selected, skipping");
            return Ok(None);
        }

        let snapshot_path = self.snapshots.prepare_current(search.id).await?;
        let request = ScrapeRequest { options: search.options.clone(), snapshot_path };
        self.invoker.invoke(&request).await?;

        let current = self.snapshots.read_current(search.id).await?;
        let previous = if self.snapshots.has_previous(search.id) {
            self.snapshots.read_previous(search.id).await?
        } else {
            // First-ever cycle: the baseline captured at creation time stands
            // in for the missing previous snapshot.
            self.searches.baseline_items(search.id).await?
        };

        let fresh = new_listings(&current, &previous);
        let items_added = self.feed.append_new_items(search.id, &fresh).await? as i64;
        self.snapshots.promote_current_to_previous(search.id).await?;

        let current_total = self.feed.count_for_search(search.id).await?;
        Ok(Some(CycleSearchResult {
            search_name: search.display_name(),
            items_added,
            current_total,
        }))
    }
}
