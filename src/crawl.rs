//! Orchestrates one crawl: discovery, the fetch engine, and the outcome
//! consumers.
//!
//! Workers push immutable outcomes onto a single results channel; the
//! metadata store and the status reporter are its only consumers. A failed
//! metadata flush is escalated - the run cannot be considered successful
//! if its results were not durably recorded.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ConferenceConfig;
use crate::fetch::{
    ContentFetcher, EngineError, FetchEngine, RateLimiter, RetryPolicy, Validator,
};
use crate::metadata::{MetadataFormat, MetadataStore};
use crate::source::{DiscoverError, SourceAdapter};
use crate::stats::{RunStats, StatsSnapshot};
use crate::task::TaskOutcome;

/// Outcome channel depth. Consumers are fast; this only smooths bursts.
const OUTCOME_CHANNEL_DEPTH: usize = 64;

/// Error type for crawl runs.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Discovery failed for a year.
    #[error(transparent)]
    Discover(#[from] DiscoverError),

    /// The fetch engine could not be constructed or run.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The papers directory could not be created.
    #[error("IO error preparing {path}: {source}")]
    Io {
        /// The directory being prepared.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Options shared by every crawl in one invocation.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Root data directory.
    pub data_dir: PathBuf,
    /// Download worker count.
    pub workers: usize,
    /// Minimum delay between requests to the same host.
    pub delay: Duration,
    /// Retry attempt ceiling per URL.
    pub max_attempts: u32,
    /// Metadata output format.
    pub format: MetadataFormat,
    /// Re-download over existing artifacts.
    pub force: bool,
    /// Show a progress bar.
    pub progress: bool,
}

/// What one crawl run produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlReport {
    /// Aggregated counters across all years.
    pub stats: StatsSnapshot,
    /// Whether any task ended in `Failed`.
    pub any_failed: bool,
    /// Whether the metadata flush failed (results not durably recorded).
    pub flush_failed: bool,
}

impl CrawlReport {
    fn absorb(&mut self, stats: StatsSnapshot, flush_failed: bool) {
        self.any_failed |= stats.failed > 0;
        self.flush_failed |= flush_failed;
        self.stats = self.stats.merged(stats);
    }
}

/// Crawls one conference across the requested years.
///
/// A year whose discovery fails is reported and skipped; the remaining
/// years still run. Task-level failures never abort the run.
///
/// # Errors
///
/// Returns [`CrawlError`] only for setup problems (engine construction,
/// directory creation).
pub async fn crawl_conference(
    adapter: &dyn SourceAdapter,
    years: &[u16],
    fetcher: Arc<dyn ContentFetcher>,
    opts: &CrawlOptions,
    cancel: &CancellationToken,
) -> Result<CrawlReport, CrawlError> {
    let conference = adapter.conference();
    let mut report = CrawlReport::default();

    for &year in years {
        if cancel.is_cancelled() {
            warn!(year, "cancelled before year started");
            break;
        }
        match crawl_year(adapter, conference, year, Arc::clone(&fetcher), opts, cancel).await {
            Ok((stats, flush_failed)) => report.absorb(stats, flush_failed),
            Err(CrawlError::Discover(e)) => {
                error!(conference = conference.name, year, error = %e, "discovery failed");
                report.any_failed = true;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        conference = conference.name,
        succeeded = report.stats.succeeded,
        skipped = report.stats.skipped,
        failed = report.stats.failed,
        bytes = report.stats.bytes,
        "conference crawl complete"
    );
    Ok(report)
}

async fn crawl_year(
    adapter: &dyn SourceAdapter,
    conference: &'static ConferenceConfig,
    year: u16,
    fetcher: Arc<dyn ContentFetcher>,
    opts: &CrawlOptions,
    cancel: &CancellationToken,
) -> Result<(StatsSnapshot, bool), CrawlError> {
    info!(conference = conference.name, year, "starting year");

    let tasks = adapter.discover(year).await?;
    if tasks.is_empty() {
        warn!(conference = conference.name, year, "no papers discovered");
        return Ok((StatsSnapshot::default(), false));
    }

    let papers_dir = opts
        .data_dir
        .join(conference.dir_name)
        .join(year.to_string())
        .join("papers");
    tokio::fs::create_dir_all(&papers_dir)
        .await
        .map_err(|e| CrawlError::Io {
            path: papers_dir.clone(),
            source: e,
        })?;

    let mut store = MetadataStore::new(&opts.data_dir, opts.format);
    store.load_existing(conference.dir_name, year).await;

    let rate_limiter = if opts.delay.is_zero() {
        Arc::new(RateLimiter::disabled())
    } else {
        Arc::new(RateLimiter::new(opts.delay))
    };
    let engine = FetchEngine::new(
        opts.workers,
        RetryPolicy::with_max_attempts(opts.max_attempts),
        Validator::default(),
        rate_limiter,
        cancel.clone(),
    )?
    .with_force(opts.force);

    let stats = Arc::new(RunStats::new());
    let bar = progress_bar(opts.progress, tasks.len() as u64);

    let (tx, mut rx) = mpsc::channel::<TaskOutcome>(OUTCOME_CHANNEL_DEPTH);

    // Single consumer serializes store and stats mutations; outcome order
    // across tasks is deliberately unspecified.
    let consumer_stats = Arc::clone(&stats);
    let consumer_bar = bar.clone();
    let consumer = tokio::spawn(async move {
        while let Some(delivered) = rx.recv().await {
            consumer_stats.apply(&delivered.outcome);
            store.record(&delivered.task, &delivered.outcome);
            if let Some(bar) = &consumer_bar {
                bar.inc(1);
            }
        }
        store
    });

    let engine_result = engine.run(tasks, fetcher, &papers_dir, tx).await;

    #[allow(clippy::expect_used)]
    let store = consumer.await.expect("outcome consumer panicked");
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    engine_result?;

    let flush_failed = match store.flush().await {
        Ok(()) => false,
        Err(e) => {
            error!(error = %e, "metadata flush failed - results not durably recorded");
            true
        }
    };

    let snapshot = stats.snapshot();
    info!(
        conference = conference.name,
        year,
        succeeded = snapshot.succeeded,
        skipped = snapshot.skipped,
        failed = snapshot.failed,
        "year complete"
    );
    Ok((snapshot, flush_failed))
}

fn progress_bar(enabled: bool, len: u64) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    Some(bar)
}
