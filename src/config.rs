use crate::error::{AppError, Result};

/// Short sleep between the poll loop's clock checks (seconds). Keeps shutdown
/// latency low without busy-spinning.
pub const POLL_TICK_SECS: u64 = 1;

/// Sleep after an unexpected cycle-level error before re-checking (seconds).
pub const POLL_ERROR_BACKOFF_SECS: u64 = 5;

/// Most-recent feed items kept per saved search; oldest evicted first.
pub const FEED_MAX_ITEMS_PER_SEARCH: i64 = 100;

/// Feed items older than this are purged regardless of the count cap (seconds).
pub const FEED_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// Price bounds passed to the scraper when a search doesn't set its own.
pub const DEFAULT_MIN_PRICE: i64 = 0;
pub const DEFAULT_MAX_PRICE: i64 = 1_000_000;

/// How long main waits for the poller to wind down on shutdown (seconds).
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// Settings key that overrides the poll interval at startup.
pub const POLL_INTERVAL_SETTING: &str = "poll_interval_secs";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    /// Directory holding per-search snapshot databases (SNAPSHOT_DIR).
    pub snapshot_dir: String,
    /// Seconds between poll cycle starts (POLL_INTERVAL_SECS).
    pub poll_interval_secs: u64,
    /// External scraper command invoked once per search per cycle (SCRAPER_CMD).
    pub scraper_cmd: String,
    /// Timeout envelope on one scraper invocation (SCRAPER_TIMEOUT_SECS).
    pub scraper_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH")
                .unwrap_or_else(|_| "data/market_search.db".to_string()),
            snapshot_dir: std::env::var("SNAPSHOT_DIR")
                .unwrap_or_else(|_| "data/snapshots".to_string()),
            poll_interval_secs: std::env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    AppError::Config("POLL_INTERVAL_SECS must be a positive integer".to_string())
                })?,
            scraper_cmd: std::env::var("SCRAPER_CMD")
                .unwrap_or_else(|_| "market-scraper".to_string()),
            scraper_timeout_secs: std::env::var("SCRAPER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse::<u64>()
                .unwrap_or(300),
        })
    }
}
