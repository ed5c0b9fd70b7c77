//! The fetch engine: bounded-parallel fetch-validate-commit pipelines.
//!
//! Consumes task descriptors, runs up to N concurrent pipelines, applies
//! the retry policy per URL variant, and emits exactly one terminal
//! [`Outcome`] per task onto a results channel.
//!
//! # Concurrency model
//!
//! - Each task runs in its own Tokio task, gated by a semaphore permit
//!   released on completion (RAII).
//! - A per-host rate limiter spaces request starts regardless of the
//!   worker count.
//! - Cancellation stops new tasks immediately, aborts in-flight fetches
//!   and retry sleeps, and lets commits in progress finish - a rename is
//!   never interrupted.
//!
//! # Task state machine
//!
//! `Pending -> Fetching -> Validating -> Writing -> {Succeeded|Failed|Skipped}`
//! with two explicit nested state variables: URL index and attempt index
//! within the current URL. Validation failures feed back into the retry
//! loop as [`FailureKind::InvalidContent`]; exhausted retries and permanent
//! failures fall through to the next URL variant with a fresh attempt
//! counter. Commit failures are fatal for the task - a local disk problem
//! is not cured by re-downloading.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use rand::Rng;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::REQUEST_TIMEOUT_SECS;
use super::rate_limiter::{RateLimiter, parse_retry_after};
use super::retry::{RetryPolicy, classify_error};
use super::transport::{ContentFetcher, FetchRequest};
use super::validate::Validator;
use super::{FetchError, writer};
use crate::task::{ContentKind, FailureKind, Outcome, SkipReason, TaskDescriptor, TaskOutcome};
use crate::util::sanitize_filename;

/// Minimum allowed worker count.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed worker count.
const MAX_CONCURRENCY: usize = 100;

/// Default worker count.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Maximum jitter added to retry sleeps (500ms). Prevents a thundering
/// herd when several tasks fail at once.
const MAX_RETRY_JITTER: Duration = Duration::from_millis(500);

/// Error type for engine construction and execution.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid worker count.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Bounded-parallel fetch engine.
#[derive(Debug)]
pub struct FetchEngine {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    retry_policy: RetryPolicy,
    validator: Validator,
    rate_limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
    /// When set, the pre-flight existence check is bypassed and artifacts
    /// are re-downloaded over existing files.
    force: bool,
    request_timeout: Duration,
}

impl FetchEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `concurrency` is
    /// outside 1-100.
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        validator: Validator,
        rate_limiter: Arc<RateLimiter>,
        cancel: CancellationToken,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            rate_limit_ms = rate_limiter.min_delay().as_millis(),
            "creating fetch engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            validator,
            rate_limiter,
            cancel,
            force: false,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        })
    }

    /// Enables forced re-processing (skip the existence pre-check).
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Overrides the per-request timeout. Mainly for tests.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns the configured worker count.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Processes every task, emitting exactly one [`TaskOutcome`] per task
    /// on `outcomes`. Individual task failures never abort the run; they
    /// are reported through the channel and the pool continues.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the semaphore is closed.
    #[instrument(skip_all, fields(tasks = tasks.len(), papers_dir = %papers_dir.display()))]
    pub async fn run(
        &self,
        tasks: Vec<TaskDescriptor>,
        fetcher: Arc<dyn ContentFetcher>,
        papers_dir: &Path,
        outcomes: mpsc::Sender<TaskOutcome>,
    ) -> Result<(), EngineError> {
        info!("starting fetch run");

        let claimed_paths: Arc<DashSet<PathBuf>> = Arc::new(DashSet::new());
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let task = Arc::new(task);
            let save_path = artifact_path(papers_dir, &task.title, ContentKind::Pdf);

            // No new task starts after cancellation is observed.
            if self.cancel.is_cancelled() {
                let outcome = Outcome::Failed {
                    failure: FailureKind::Cancelled,
                    attempts: 0,
                };
                deliver(&outcomes, &task, outcome).await;
                continue;
            }

            // A second task resolving to the same final path this run is a
            // duplicate; only the first fetches.
            if !claimed_paths.insert(save_path.clone()) {
                deliver(
                    &outcomes,
                    &task,
                    Outcome::Skipped {
                        reason: SkipReason::Duplicate,
                    },
                )
                .await;
                continue;
            }

            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let ctx = TaskContext {
                fetcher: Arc::clone(&fetcher),
                retry_policy: self.retry_policy.clone(),
                validator: self.validator.clone(),
                rate_limiter: Arc::clone(&self.rate_limiter),
                cancel: self.cancel.clone(),
                force: self.force,
                request_timeout: self.request_timeout,
            };
            let outcomes = outcomes.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = execute_task(&ctx, &task, &save_path).await;
                deliver(&outcomes, &task, outcome).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "fetch task panicked");
            }
        }

        info!("fetch run complete");
        Ok(())
    }
}

/// Everything a single task's pipeline needs, cloned into its Tokio task.
struct TaskContext {
    fetcher: Arc<dyn ContentFetcher>,
    retry_policy: RetryPolicy,
    validator: Validator,
    rate_limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
    force: bool,
    request_timeout: Duration,
}

/// Final artifact path for a task: `{papers_dir}/{sanitized-title}.{ext}`.
#[must_use]
pub fn artifact_path(papers_dir: &Path, title: &str, kind: ContentKind) -> PathBuf {
    papers_dir.join(format!("{}.{}", sanitize_filename(title), kind.extension()))
}

async fn deliver(outcomes: &mpsc::Sender<TaskOutcome>, task: &Arc<TaskDescriptor>, outcome: Outcome) {
    log_outcome(task, &outcome);
    let delivery = TaskOutcome {
        task: Arc::clone(task),
        outcome,
    };
    if outcomes.send(delivery).await.is_err() {
        warn!(title = %task.title, "outcome receiver dropped");
    }
}

fn log_outcome(task: &TaskDescriptor, outcome: &Outcome) {
    match outcome {
        Outcome::Succeeded { path, bytes, .. } => {
            info!(title = %task.title, path = %path.display(), bytes, "downloaded");
        }
        Outcome::Skipped { reason } => {
            info!(title = %task.title, %reason, "skipped");
        }
        Outcome::Failed { failure, attempts } => {
            warn!(title = %task.title, %failure, attempts, "failed");
        }
    }
}

/// Runs one task through its whole pipeline and returns the terminal outcome.
#[instrument(skip_all, fields(title = %task.title))]
async fn execute_task(ctx: &TaskContext, task: &TaskDescriptor, save_path: &Path) -> Outcome {
    // Pre-flight existence check: an artifact committed by an earlier run
    // makes the task a no-op before any network call.
    if !ctx.force && path_exists_nonempty(save_path).await {
        return Outcome::Skipped {
            reason: SkipReason::AlreadyExists,
        };
    }

    if task.urls.is_empty() {
        warn!(title = %task.title, "task has no candidate URLs");
        return Outcome::Failed {
            failure: FailureKind::InvalidContent,
            attempts: 0,
        };
    }

    let mut total_attempts: u32 = 0;
    let mut last_failure = FailureKind::TransientNetwork;

    for (url_index, url) in task.urls.iter().enumerate() {
        debug!(url_index, url = %url, "trying URL variant");
        // Attempt counter is per URL variant; total accumulates for the
        // terminal outcome.
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            total_attempts += 1;

            tokio::select! {
                () = ctx.cancel.cancelled() => {
                    return Outcome::Failed {
                        failure: FailureKind::Cancelled,
                        attempts: total_attempts,
                    };
                }
                () = ctx.rate_limiter.acquire(url) => {}
            }

            let request = FetchRequest::new(url.clone())
                .with_headers(task.headers.clone())
                .with_timeout(ctx.request_timeout);

            let fetched = tokio::select! {
                () = ctx.cancel.cancelled() => Err(FetchError::cancelled(url.clone())),
                result = ctx.fetcher.fetch(&request) => result,
            };

            let mut retry_after = None;
            match fetched {
                Ok(payload) => {
                    match ctx.validator.validate(
                        &payload.bytes,
                        payload.content_type.as_deref(),
                        ContentKind::Pdf,
                    ) {
                        Ok(()) => {
                            // Commit is never cancelled mid-way: the rename
                            // either happens completely or not at all.
                            return match writer::commit(&payload.bytes, save_path).await {
                                Ok(()) => Outcome::Succeeded {
                                    path: save_path.to_path_buf(),
                                    bytes: payload.bytes.len() as u64,
                                    kind: ContentKind::Pdf,
                                },
                                Err(e) => {
                                    warn!(path = %save_path.display(), error = %e, "commit failed");
                                    Outcome::Failed {
                                        failure: FailureKind::LocalIo,
                                        attempts: total_attempts,
                                    }
                                }
                            };
                        }
                        Err(reason) => {
                            debug!(url = %url, %reason, "validation rejected body");
                            last_failure = FailureKind::InvalidContent;
                        }
                    }
                }
                Err(error) => {
                    last_failure = classify_error(&error);
                    if last_failure == FailureKind::Cancelled {
                        return Outcome::Failed {
                            failure: FailureKind::Cancelled,
                            attempts: total_attempts,
                        };
                    }
                    if last_failure == FailureKind::RateLimited {
                        retry_after = server_retry_after(&error, url, &ctx.rate_limiter);
                    }
                    debug!(url = %url, %error, attempt, "attempt failed");
                }
            }

            match ctx.retry_policy.next_delay(attempt, last_failure) {
                Some(backoff) => {
                    let delay = retry_after.unwrap_or(backoff) + retry_jitter();
                    debug!(url = %url, attempt, delay_ms = delay.as_millis(), "retrying after delay");
                    tokio::select! {
                        () = ctx.cancel.cancelled() => {
                            return Outcome::Failed {
                                failure: FailureKind::Cancelled,
                                attempts: total_attempts,
                            };
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                // Permanent failure or ceiling reached: fall through to the
                // next URL variant.
                None => break,
            }
        }
    }

    Outcome::Failed {
        failure: last_failure,
        attempts: total_attempts,
    }
}

async fn path_exists_nonempty(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len() > 0)
        .unwrap_or(false)
}

/// Parses the server-mandated delay out of a 429 error and records it with
/// the rate limiter so other workers on the same host respect it too.
fn server_retry_after(
    error: &FetchError,
    url: &str,
    rate_limiter: &RateLimiter,
) -> Option<Duration> {
    let FetchError::HttpStatus {
        retry_after: Some(value),
        ..
    } = error
    else {
        return None;
    };
    let delay = parse_retry_after(value)?;
    rate_limiter.record_rate_limit(url, delay);
    Some(delay)
}

fn retry_jitter() -> Duration {
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(0..=MAX_RETRY_JITTER.as_millis() as u64))
}
