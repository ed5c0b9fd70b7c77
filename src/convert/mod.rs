//! PDF-to-text conversion via an external converter binary.
//!
//! Conversion runs after download, per committed artifact, outside the
//! fetch engine's retry machinery: the converter gets a stable path and
//! reports success or failure. The binary defaults to `pdftotext` and is
//! discovered on `PATH`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Default converter binary.
pub const DEFAULT_CONVERTER: &str = "pdftotext";

/// Hard ceiling per file; a converter stuck on corrupt input must not hang
/// the run.
const CONVERT_TIMEOUT: Duration = Duration::from_secs(600);

/// Default conversion parallelism. Converters are CPU-bound, so this stays
/// lower than the download worker count.
pub const DEFAULT_CONVERT_WORKERS: usize = 2;

/// Error type for conversion runs.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The converter binary is not installed or not on `PATH`.
    #[error("converter binary not found: {name}")]
    BinaryNotFound {
        /// The binary that was looked up.
        name: String,
    },

    /// Reading the papers directory failed.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// The directory being scanned.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Per-run conversion counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConvertSummary {
    /// Files converted this run.
    pub converted: u64,
    /// Files whose output already existed.
    pub skipped: u64,
    /// Files the converter rejected.
    pub failed: u64,
}

/// External converter invoked once per committed artifact.
#[derive(Debug, Clone)]
pub struct Converter {
    binary: PathBuf,
    workers: usize,
    force: bool,
}

impl Converter {
    /// Resolves the converter binary and builds a converter.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::BinaryNotFound`] when the binary cannot be
    /// located on `PATH`.
    pub fn new(binary: Option<&str>, workers: usize, force: bool) -> Result<Self, ConvertError> {
        let name = binary.unwrap_or(DEFAULT_CONVERTER);
        let binary = which::which(name).map_err(|_| ConvertError::BinaryNotFound {
            name: name.to_string(),
        })?;
        debug!(binary = %binary.display(), "converter resolved");
        Ok(Self {
            binary,
            workers: workers.max(1),
            force,
        })
    }

    /// Converts every `papers/*.pdf` under `year_dir` into
    /// `text/{stem}.txt`, skipping files whose output already exists
    /// unless forced.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Io`] when the directories cannot be read or
    /// created. Individual file failures are counted, not escalated.
    pub async fn convert_year(&self, year_dir: &Path) -> Result<ConvertSummary, ConvertError> {
        let papers_dir = year_dir.join("papers");
        let text_dir = year_dir.join("text");
        if !papers_dir.is_dir() {
            debug!(path = %papers_dir.display(), "no papers directory, nothing to convert");
            return Ok(ConvertSummary::default());
        }
        tokio::fs::create_dir_all(&text_dir)
            .await
            .map_err(|e| ConvertError::Io {
                path: text_dir.clone(),
                source: e,
            })?;

        let mut pdfs = Vec::new();
        let mut entries = tokio::fs::read_dir(&papers_dir)
            .await
            .map_err(|e| ConvertError::Io {
                path: papers_dir.clone(),
                source: e,
            })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| ConvertError::Io {
            path: papers_dir.clone(),
            source: e,
        })? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "pdf") {
                pdfs.push(path);
            }
        }
        pdfs.sort();

        info!(files = pdfs.len(), dir = %papers_dir.display(), "converting");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(pdfs.len());
        for pdf in pdfs {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let binary = self.binary.clone();
            let force = self.force;
            let output = text_dir.join(pdf.file_stem().map_or_else(
                || "output.txt".to_string(),
                |stem| format!("{}.txt", stem.to_string_lossy()),
            ));
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                convert_file(&binary, &pdf, &output, force).await
            }));
        }

        let mut summary = ConvertSummary::default();
        for handle in handles {
            match handle.await {
                Ok(FileResult::Converted) => summary.converted += 1,
                Ok(FileResult::Skipped) => summary.skipped += 1,
                Ok(FileResult::Failed) => summary.failed += 1,
                Err(e) => {
                    warn!(error = %e, "conversion task panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(
            converted = summary.converted,
            skipped = summary.skipped,
            failed = summary.failed,
            "conversion complete"
        );
        Ok(summary)
    }
}

enum FileResult {
    Converted,
    Skipped,
    Failed,
}

async fn convert_file(binary: &Path, pdf: &Path, output: &Path, force: bool) -> FileResult {
    if !force && output.exists() {
        debug!(output = %output.display(), "already converted");
        return FileResult::Skipped;
    }

    let run = Command::new(binary).arg(pdf).arg(output).output();
    match tokio::time::timeout(CONVERT_TIMEOUT, run).await {
        Ok(Ok(result)) if result.status.success() && output.exists() => {
            debug!(pdf = %pdf.display(), "converted");
            FileResult::Converted
        }
        Ok(Ok(result)) => {
            warn!(
                pdf = %pdf.display(),
                status = ?result.status.code(),
                stderr = %String::from_utf8_lossy(&result.stderr).trim(),
                "converter rejected file"
            );
            FileResult::Failed
        }
        Ok(Err(e)) => {
            warn!(pdf = %pdf.display(), error = %e, "converter failed to start");
            FileResult::Failed
        }
        Err(_) => {
            warn!(pdf = %pdf.display(), timeout_secs = CONVERT_TIMEOUT.as_secs(), "conversion timed out");
            FileResult::Failed
        }
    }
}
