use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{Config, DEFAULT_MAX_PRICE, DEFAULT_MIN_PRICE};
use crate::error::{AppError, Result};
use crate::types::SearchOptions;

/// One scraper invocation: the search's filter plus the snapshot database the
/// scraper must populate with its results.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub options: SearchOptions,
    pub snapshot_path: PathBuf,
}

/// Seam over the external scraper collaborator. The production impl spawns a
/// child process; tests substitute an in-process double that writes the
/// snapshot directly.
#[async_trait]
pub trait ScraperInvoker: Send + Sync {
    /// Runs one scrape. Success means the scraper exited cleanly and the
    /// snapshot target has been populated; the caller reads it back through
    /// the snapshot store. No retry here — the next poll cycle is the retry.
    async fn invoke(&self, request: &ScrapeRequest) -> Result<()>;
}

/// Invokes the scraper as an isolated child process. The exit status is the
/// success signal; stdout/stderr are diagnostics only.
pub struct ProcessScraper {
    program: String,
    base_args: Vec<String>,
    timeout: Duration,
}

impl ProcessScraper {
    /// `command` is whitespace-split: the first token is the program, the
    /// rest are fixed leading arguments ("python scraper.py" works).
    pub fn new(command: &str, timeout: Duration) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self { program, base_args: parts.collect(), timeout }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.scraper_cmd, Duration::from_secs(cfg.scraper_timeout_secs))
    }

    fn build_args(request: &ScrapeRequest) -> Vec<String> {
        let options = &request.options;
        let mut args = vec!["--sites".to_string()];
        args.extend(options.sites.iter().cloned());

        args.push("--keywords".to_string());
        if options.keywords.is_empty() {
            args.push(String::new());
        } else {
            args.extend(options.keywords.iter().cloned());
        }

        args.push("--min-price".to_string());
        args.push(options.min_price.unwrap_or(DEFAULT_MIN_PRICE).to_string());
        args.push("--max-price".to_string());
        args.push(options.max_price.unwrap_or(DEFAULT_MAX_PRICE).to_string());

        args.push("--db".to_string());
        args.push(request.snapshot_path.display().to_string());
        args
    }
}

#[async_trait]
impl ScraperInvoker for ProcessScraper {
    async fn invoke(&self, request: &ScrapeRequest) -> Result<()> {
        let args = Self::build_args(request);
        debug!(program = %self.program, ?args, "invoking scraper");

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.program)
                .args(&self.base_args)
                .args(&args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            AppError::Scraper(format!(
                "{} timed out after {}s",
                self.program,
                self.timeout.as_secs()
            ))
        })?
        .map_err(|e| AppError::Scraper(format!("failed to start {}: {e}", self.program)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(AppError::Scraper(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        // The scraper narrates progress on stderr even on success.
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!(target: "scraper", "{line}");
        }
        if !output.stdout.is_empty() {
            warn!(program = %self.program, "scraper wrote unexpected stdout payload");
        }

        Ok(())
    }
}
