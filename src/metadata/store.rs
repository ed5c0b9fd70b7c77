//! Deduplicating metadata store with atomic multi-format flush.
//!
//! Accumulates one record per dedup key as outcomes arrive (last writer
//! wins within a run), seeds itself from the previous run's `metadata.json`,
//! and rewrites the on-disk set atomically: every output file is written to
//! a temporary sibling and renamed into place, the same guarantee class as
//! artifact commits.
//!
//! On-disk layout, stable for other tooling:
//! `{data_dir}/{conference}/{year}/metadata.{csv|json|txt}` and
//! `{data_dir}/{conference}/{year}/failed.json`.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{FailedEntry, PaperRecord, dedup_key};
use crate::task::{Outcome, TaskDescriptor};

/// Output format selection for the flushed metadata set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MetadataFormat {
    /// Comma-separated values.
    Csv,
    /// Pretty-printed JSON array.
    Json,
    /// Human-readable numbered list.
    Txt,
    /// All of the above.
    All,
}

impl MetadataFormat {
    fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Csv => &["csv"],
            Self::Json => &["json"],
            Self::Txt => &["txt"],
            Self::All => &["csv", "json", "txt"],
        }
    }
}

/// Error type for metadata persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure while writing an output file.
    #[error("IO error writing {path}: {source}")]
    Io {
        /// The file being written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Record serialization failed.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// In-memory record set for one run, keyed by normalized identity.
#[derive(Debug)]
pub struct MetadataStore {
    data_dir: PathBuf,
    format: MetadataFormat,
    records: HashMap<String, PaperRecord>,
    failures: Vec<FailedEntry>,
}

impl MetadataStore {
    /// Creates an empty store rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, format: MetadataFormat) -> Self {
        Self {
            data_dir: data_dir.into(),
            format,
            records: HashMap::new(),
            failures: Vec::new(),
        }
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the record for a title, if present.
    #[must_use]
    pub fn get(&self, conference: &str, year: u16, title: &str) -> Option<&PaperRecord> {
        self.records.get(&dedup_key(conference, year, title))
    }

    /// Failed-task ledger accumulated this run.
    #[must_use]
    pub fn failures(&self) -> &[FailedEntry] {
        &self.failures
    }

    /// Seeds the store from a previous run's `metadata.json`, if present.
    ///
    /// Missing or unreadable files are not errors - a fresh directory just
    /// starts empty.
    pub async fn load_existing(&mut self, conference: &str, year: u16) {
        let path = self.year_dir(conference, year).join("metadata.json");
        let Ok(body) = tokio::fs::read(&path).await else {
            debug!(path = %path.display(), "no previous metadata to seed from");
            return;
        };
        match serde_json::from_slice::<Vec<PaperRecord>>(&body) {
            Ok(previous) => {
                let count = previous.len();
                for record in previous {
                    let key = dedup_key(&record.conference, record.year, &record.title);
                    self.records.entry(key).or_insert(record);
                }
                info!(count, path = %path.display(), "seeded metadata from previous run");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unparseable metadata file");
            }
        }
    }

    /// Applies one terminal outcome.
    ///
    /// Every outcome upserts the paper's record (last writer wins); a
    /// `Failed` outcome additionally lands in the ledger. An upsert never
    /// discards a known local path in favor of an unknown one.
    pub fn record(&mut self, task: &TaskDescriptor, outcome: &Outcome) {
        let key = dedup_key(&task.conference, task.year, &task.title);
        let local_path = match outcome {
            Outcome::Succeeded { path, .. } => Some(path.display().to_string()),
            _ => None,
        };

        let previous_path = self
            .records
            .get(&key)
            .and_then(|existing| existing.local_path.clone());

        self.records.insert(
            key,
            PaperRecord {
                title: task.title.clone(),
                authors: task.authors.clone(),
                source_url: task.source_url.clone(),
                local_path: local_path.or(previous_path),
                conference: task.conference.clone(),
                year: task.year,
                recorded_at: Utc::now(),
            },
        );

        if let Outcome::Failed { failure, attempts } = outcome {
            self.failures.push(FailedEntry {
                title: task.title.clone(),
                conference: task.conference.clone(),
                year: task.year,
                urls: task.urls.clone(),
                failure: failure.to_string(),
                attempts: *attempts,
            });
        }
    }

    /// Writes the record set and the failed ledger to disk atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on serialization or filesystem failure. A
    /// failed flush means the run's results were not durably recorded and
    /// must be escalated by the caller.
    pub async fn flush(&self) -> Result<(), StoreError> {
        // Group records per (conference, year); each pair owns one metadata
        // file set.
        let mut groups: HashMap<(String, u16), Vec<&PaperRecord>> = HashMap::new();
        for record in self.records.values() {
            groups
                .entry((record.conference.clone(), record.year))
                .or_default()
                .push(record);
        }

        for ((conference, year), mut records) in groups {
            records.sort_by(|a, b| a.title.cmp(&b.title));
            let year_dir = self.year_dir(&conference, year);
            tokio::fs::create_dir_all(&year_dir)
                .await
                .map_err(|e| StoreError::Io {
                    path: year_dir.clone(),
                    source: e,
                })?;

            for ext in self.format.extensions() {
                let path = year_dir.join(format!("metadata.{ext}"));
                let body = match *ext {
                    "csv" => render_csv(&records),
                    "txt" => render_txt(&records),
                    _ => serde_json::to_string_pretty(&records)?,
                };
                write_atomic(&path, body.as_bytes()).await?;
            }

            let failed: Vec<&FailedEntry> = self
                .failures
                .iter()
                .filter(|f| f.conference == conference && f.year == year)
                .collect();
            if !failed.is_empty() {
                let path = year_dir.join("failed.json");
                let body = serde_json::to_string_pretty(&failed)?;
                write_atomic(&path, body.as_bytes()).await?;
            }
        }

        info!(records = self.records.len(), failures = self.failures.len(), "metadata flushed");
        Ok(())
    }

    fn year_dir(&self, conference: &str, year: u16) -> PathBuf {
        self.data_dir.join(conference).join(year.to_string())
    }
}

/// Writes a file via a temporary sibling and a single rename.
async fn write_atomic(path: &Path, body: &[u8]) -> Result<(), StoreError> {
    let tmp = crate::fetch::writer::part_path(path);
    let io_err = |e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    tokio::fs::write(&tmp, body).await.map_err(io_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }
    Ok(())
}

fn render_csv(records: &[&PaperRecord]) -> String {
    let mut out = String::from("title,authors,source_url,local_path,conference,year,recorded_at\n");
    for record in records {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{}",
            csv_field(&record.title),
            csv_field(record.authors.as_deref().unwrap_or("")),
            csv_field(&record.source_url),
            csv_field(record.local_path.as_deref().unwrap_or("")),
            csv_field(&record.conference),
            record.year,
            record.recorded_at.to_rfc3339(),
        );
    }
    out
}

/// Quotes a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn render_txt(records: &[&PaperRecord]) -> String {
    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}", i + 1, record.title);
        if let Some(authors) = &record.authors {
            let _ = writeln!(out, "    Authors: {authors}");
        }
        let _ = writeln!(out, "    Source: {}", record.source_url);
        if let Some(path) = &record.local_path {
            let _ = writeln!(out, "    File: {path}");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::task::{ContentKind, FailureKind, SkipReason};
    use tempfile::TempDir;

    fn task(title: &str) -> TaskDescriptor {
        TaskDescriptor::new(
            "NDSS",
            2024,
            title,
            "https://example.com/program/",
            vec!["https://example.com/a.pdf".to_string()],
        )
    }

    fn succeeded(path: &str) -> Outcome {
        Outcome::Succeeded {
            path: PathBuf::from(path),
            bytes: 100_000,
            kind: ContentKind::Pdf,
        }
    }

    #[test]
    fn test_record_dedups_normalized_titles() {
        let mut store = MetadataStore::new("/tmp/unused", MetadataFormat::Json);
        store.record(&task("Foo: A Study"), &succeeded("/data/a.pdf"));
        store.record(
            &task("foo a study").with_authors("B. Author"),
            &Outcome::Skipped {
                reason: SkipReason::AlreadyExists,
            },
        );

        assert_eq!(store.len(), 1);
        // Last writer wins for the fields it knows...
        let record = store.get("NDSS", 2024, "FOO A STUDY").unwrap();
        assert_eq!(record.title, "foo a study");
        assert_eq!(record.authors.as_deref(), Some("B. Author"));
        // ...but a known local path survives an upsert that lacks one.
        assert_eq!(record.local_path.as_deref(), Some("/data/a.pdf"));
    }

    #[test]
    fn test_failed_outcome_lands_in_ledger() {
        let mut store = MetadataStore::new("/tmp/unused", MetadataFormat::Json);
        store.record(
            &task("Broken Paper"),
            &Outcome::Failed {
                failure: FailureKind::PermanentRemote(404),
                attempts: 1,
            },
        );

        assert_eq!(store.len(), 1);
        assert_eq!(store.failures().len(), 1);
        let entry = &store.failures()[0];
        assert_eq!(entry.attempts, 1);
        assert!(entry.failure.contains("404"));
    }

    #[tokio::test]
    async fn test_flush_writes_selected_formats() {
        let dir = TempDir::new().unwrap();
        let mut store = MetadataStore::new(dir.path(), MetadataFormat::All);
        store.record(&task("A Paper"), &succeeded("/data/a.pdf"));
        store.flush().await.unwrap();

        let year_dir = dir.path().join("NDSS").join("2024");
        for ext in ["csv", "json", "txt"] {
            assert!(
                year_dir.join(format!("metadata.{ext}")).exists(),
                "missing metadata.{ext}"
            );
        }
        // No failures, no ledger file.
        assert!(!year_dir.join("failed.json").exists());
    }

    #[tokio::test]
    async fn test_flush_leaves_no_part_files() {
        let dir = TempDir::new().unwrap();
        let mut store = MetadataStore::new(dir.path(), MetadataFormat::All);
        store.record(&task("A Paper"), &succeeded("/data/a.pdf"));
        store.flush().await.unwrap();

        let year_dir = dir.path().join("NDSS").join("2024");
        let leftovers: Vec<_> = std::fs::read_dir(&year_dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty(), "part files left: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_flush_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = MetadataStore::new(dir.path(), MetadataFormat::Json);
        store.record(&task("A Paper").with_authors("Ada"), &succeeded("/data/a.pdf"));
        store.flush().await.unwrap();

        let mut reloaded = MetadataStore::new(dir.path(), MetadataFormat::Json);
        reloaded.load_existing("NDSS", 2024).await;
        assert_eq!(reloaded.len(), 1);
        let record = reloaded.get("NDSS", 2024, "a paper").unwrap();
        assert_eq!(record.authors.as_deref(), Some("Ada"));
        assert_eq!(record.local_path.as_deref(), Some("/data/a.pdf"));
    }

    #[tokio::test]
    async fn test_load_existing_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut store = MetadataStore::new(dir.path(), MetadataFormat::Json);
        store.load_existing("NDSS", 2024).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_flush_writes_failed_ledger() {
        let dir = TempDir::new().unwrap();
        let mut store = MetadataStore::new(dir.path(), MetadataFormat::Json);
        store.record(
            &task("Broken Paper"),
            &Outcome::Failed {
                failure: FailureKind::TransientNetwork,
                attempts: 5,
            },
        );
        store.flush().await.unwrap();

        let ledger = dir.path().join("NDSS").join("2024").join("failed.json");
        let body = std::fs::read_to_string(&ledger).unwrap();
        let entries: Vec<FailedEntry> = serde_json::from_str(&body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 5);
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("has, comma"), "\"has, comma\"");
        assert_eq!(csv_field("has \"quote\""), "\"has \"\"quote\"\"\"");
    }

    #[test]
    fn test_csv_render_includes_header_and_rows() {
        let record = PaperRecord {
            title: "A, Tricky: Title".to_string(),
            authors: Some("Ada".to_string()),
            source_url: "https://example.com".to_string(),
            local_path: None,
            conference: "NDSS".to_string(),
            year: 2024,
            recorded_at: Utc::now(),
        };
        let rendered = render_csv(&[&record]);
        let mut lines = rendered.lines();
        assert!(lines.next().unwrap().starts_with("title,authors"));
        assert!(lines.next().unwrap().starts_with("\"A, Tricky: Title\",Ada"));
    }
}
