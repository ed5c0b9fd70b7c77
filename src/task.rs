//! Task descriptors and terminal outcomes for the fetch engine.
//!
//! A [`TaskDescriptor`] is the immutable input to the engine: one candidate
//! paper with its ordered list of download URLs. An [`Outcome`] is the single
//! terminal result the engine emits for it. Nothing else crosses the engine
//! boundary.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Expected content format of a downloaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Portable Document Format (`%PDF-` magic signature).
    Pdf,
}

impl ContentKind {
    /// Leading bytes every valid artifact of this kind must start with.
    #[must_use]
    pub fn magic(self) -> &'static [u8] {
        match self {
            Self::Pdf => b"%PDF-",
        }
    }

    /// File extension for artifacts of this kind.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
        }
    }

    /// Returns true if a declared content type is known to be incompatible
    /// with this kind. Missing or generic types are never incompatible -
    /// servers are unreliable here.
    #[must_use]
    pub fn rejects_content_type(self, declared: &str) -> bool {
        let mime = declared
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match self {
            Self::Pdf => matches!(
                mime.as_str(),
                "text/html" | "application/xhtml+xml" | "text/plain"
            ),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
        }
    }
}

/// One candidate download, produced by a source adapter and never mutated
/// afterwards.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    /// Conference directory name, e.g. `USENIX_Security`.
    pub conference: String,
    /// Conference year.
    pub year: u16,
    /// Human-readable paper title.
    pub title: String,
    /// Author list, when discovery found one.
    pub authors: Option<String>,
    /// Page the reference was discovered on.
    pub source_url: String,
    /// Candidate download URLs in priority order. The engine exhausts
    /// retries on each before falling through to the next.
    pub urls: Vec<String>,
    /// Extra request headers (including any `Cookie`) this fetch requires.
    /// Carried opaquely - the engine never interprets them.
    pub headers: HashMap<String, String>,
}

impl TaskDescriptor {
    /// Creates a descriptor with no authors and no extra headers.
    #[must_use]
    pub fn new(
        conference: impl Into<String>,
        year: u16,
        title: impl Into<String>,
        source_url: impl Into<String>,
        urls: Vec<String>,
    ) -> Self {
        Self {
            conference: conference.into(),
            year,
            title: title.into(),
            authors: None,
            source_url: source_url.into(),
            urls,
            headers: HashMap::new(),
        }
    }

    /// Sets the author list.
    #[must_use]
    pub fn with_authors(mut self, authors: impl Into<String>) -> Self {
        self.authors = Some(authors.into());
        self
    }

    /// Adds an extra request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Failure taxonomy driving retry decisions.
///
/// The engine is the sole consumer: transport, validator, and writer report
/// what happened; this type decides what it means for the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, connection reset, DNS failure - may succeed on retry.
    TransientNetwork,
    /// Server asked us to back off (HTTP 429).
    RateLimited,
    /// Confirmed absence or rejection (404/410-class status). Retrying a
    /// confirmed absence wastes a network round trip.
    PermanentRemote(u16),
    /// Downloaded bytes failed validation. Retryable - anti-bot interstitial
    /// pages are sometimes transient.
    InvalidContent,
    /// Disk or filesystem failure. Fatal for the task - it indicates a local
    /// environment problem, not a remote one.
    LocalIo,
    /// Run-wide shutdown observed while the task was in flight.
    Cancelled,
}

impl FailureKind {
    /// Whether the retry loop may try again after this failure.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        match self {
            Self::TransientNetwork | Self::RateLimited | Self::InvalidContent => true,
            Self::PermanentRemote(_) | Self::LocalIo | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransientNetwork => write!(f, "transient network failure"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::PermanentRemote(status) => write!(f, "permanent remote failure (HTTP {status})"),
            Self::InvalidContent => write!(f, "invalid content"),
            Self::LocalIo => write!(f, "local I/O failure"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why a task was skipped without any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A file already exists at the final path from an earlier run.
    AlreadyExists,
    /// Another task in this run already claimed the same final path.
    Duplicate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => write!(f, "already exists"),
            Self::Duplicate => write!(f, "duplicate"),
        }
    }
}

/// Terminal result of processing one [`TaskDescriptor`].
///
/// Immutable once produced; the only value that crosses from the engine to
/// the metadata store and the status reporter.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Artifact committed to its final path.
    Succeeded {
        /// Final on-disk path.
        path: PathBuf,
        /// Artifact size in bytes.
        bytes: u64,
        /// Validated content kind.
        kind: ContentKind,
    },
    /// Task short-circuited before any network call.
    Skipped {
        /// Why it was skipped.
        reason: SkipReason,
    },
    /// Every URL variant was exhausted without a committed artifact.
    Failed {
        /// The last failure observed.
        failure: FailureKind,
        /// Total attempts made across all URL variants.
        attempts: u32,
    },
}

impl Outcome {
    /// Returns true for the `Failed` variant.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// A task paired with its terminal outcome, as delivered on the results
/// channel. Exactly one per task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// The task that finished.
    pub task: std::sync::Arc<TaskDescriptor>,
    /// Its terminal outcome.
    pub outcome: Outcome,
}
