//! Paper metadata records and the deduplicating store.
//!
//! One [`PaperRecord`] per successfully identified paper, keyed by a
//! normalized title so superficially different renderings collapse to one
//! row. Records persist across runs and are rewritten atomically at the end
//! of each run.

mod store;

pub use store::{MetadataFormat, MetadataStore, StoreError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::normalize_title;

/// One row in the flushed metadata set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Paper title as discovered.
    pub title: String,
    /// Author list, when known.
    #[serde(default)]
    pub authors: Option<String>,
    /// Page the reference was discovered on.
    pub source_url: String,
    /// Local artifact path, when downloaded.
    #[serde(default)]
    pub local_path: Option<String>,
    /// Conference directory name.
    pub conference: String,
    /// Conference year.
    pub year: u16,
    /// When this record was last written.
    pub recorded_at: DateTime<Utc>,
}

/// One row in the failed-task ledger, retained so a later run can retry
/// without re-running discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    /// Paper title.
    pub title: String,
    /// Conference directory name.
    pub conference: String,
    /// Conference year.
    pub year: u16,
    /// Candidate URLs that were exhausted.
    pub urls: Vec<String>,
    /// Last failure observed, rendered for humans.
    pub failure: String,
    /// Total attempts made.
    pub attempts: u32,
}

/// Dedup key: at most one record may exist per
/// (conference, year, normalized title).
#[must_use]
pub fn dedup_key(conference: &str, year: u16, title: &str) -> String {
    format!("{conference}/{year}/{}", normalize_title(title))
}
