use tracing::info;

use crate::types::CycleSearchResult;

/// Sink for the once-per-cycle summary. Delivery is best effort and
/// fire-and-forget — an implementation must swallow its own failures, the
/// poller never hears about them.
pub trait Notifier: Send + Sync {
    /// `results` only contains searches that added items this cycle;
    /// `total_new_items` is the sum of their feed totals.
    fn notify(&self, results: &[CycleSearchResult], total_new_items: i64);
}

/// Renders the cycle summary into the log. Actual desktop delivery is an
/// external collaborator wired in behind the same trait.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, results: &[CycleSearchResult], total_new_items: i64) {
        for result in results {
            info!(
                search = %result.search_name,
                added = result.items_added,
                total = result.current_total,
                "{}: {} new, {} in feed",
                result.search_name, result.items_added, result.current_total,
            );
        }
        info!(total_new_items, "scrape cycle summary: {total_new_items} new items");
    }
}
