//! Run statistics: a read-only aggregation over the engine's outcome stream.
//!
//! Counters use atomics so the progress display can snapshot at any time
//! without blocking the scheduler. A snapshot is internally consistent
//! enough for progress output; the final snapshot, taken after the outcome
//! stream is drained, is exact.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::task::Outcome;

/// Process-lifetime counters for one run, reset by constructing a new value.
#[derive(Debug, Default)]
pub struct RunStats {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    bytes: AtomicU64,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Tasks that reached a terminal outcome.
    pub attempted: u64,
    /// Tasks that committed an artifact.
    pub succeeded: u64,
    /// Tasks that ended in `Failed`.
    pub failed: u64,
    /// Tasks skipped before any network call.
    pub skipped: u64,
    /// Total artifact bytes transferred.
    pub bytes: u64,
}

impl RunStats {
    /// Creates a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one terminal outcome to the counters.
    pub fn apply(&self, outcome: &Outcome) {
        self.attempted.fetch_add(1, Ordering::SeqCst);
        match outcome {
            Outcome::Succeeded { bytes, .. } => {
                self.succeeded.fetch_add(1, Ordering::SeqCst);
                self.bytes.fetch_add(*bytes, Ordering::SeqCst);
            }
            Outcome::Skipped { .. } => {
                self.skipped.fetch_add(1, Ordering::SeqCst);
            }
            Outcome::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Returns a copy of the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempted: self.attempted.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            bytes: self.bytes.load(Ordering::SeqCst),
        }
    }
}

impl StatsSnapshot {
    /// Tasks that reached a terminal non-failed outcome.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.succeeded + self.skipped
    }

    /// Merges another snapshot into this one (for multi-year summaries).
    #[must_use]
    pub fn merged(self, other: Self) -> Self {
        Self {
            attempted: self.attempted + other.attempted,
            succeeded: self.succeeded + other.succeeded,
            failed: self.failed + other.failed,
            skipped: self.skipped + other.skipped,
            bytes: self.bytes + other.bytes,
        }
    }
}
