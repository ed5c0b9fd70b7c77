//! Source adapters: pluggable per-conference discovery.
//!
//! Each conference website has its own brittle page layout; adapters
//! isolate that brittleness behind one capability interface. An adapter
//! turns a year into a finite list of [`TaskDescriptor`]s and does nothing
//! else - no file I/O, no downloading. Discovery is restartable: calling
//! [`SourceAdapter::discover`] again performs the same paginated HTTP
//! calls with no side effects.

mod acm_ccs;
mod client;
mod ieee_sp;
mod ndss;
mod usenix;

pub use acm_ccs::AcmCcsAdapter;
pub use client::PageClient;
pub use ieee_sp::IeeeSpAdapter;
pub use ndss::NdssAdapter;
pub use usenix::UsenixAdapter;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ConferenceConfig;
use crate::fetch::FetchError;
use crate::services::{FlareSolverrClient, SemanticScholarClient};
use crate::task::TaskDescriptor;

/// Minimum plausible title length; shorter link texts are navigation
/// chrome, not papers.
pub(crate) const MIN_TITLE_LEN: usize = 10;

/// Error type for discovery.
#[derive(Debug, Error)]
pub enum DiscoverError {
    /// No conference index page answered for the requested year.
    #[error("no index page found for {conference} {year}")]
    NoIndexPage {
        /// Conference display name.
        conference: &'static str,
        /// Requested year.
        year: u16,
    },

    /// An index page or API call failed.
    #[error("discovery fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// An index page or API response could not be interpreted.
    #[error("discovery parse failed: {message}")]
    Parse {
        /// What could not be interpreted.
        message: String,
    },
}

/// Discovery capability: one implementation per conference website.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The conference this adapter discovers papers for.
    fn conference(&self) -> &'static ConferenceConfig;

    /// Produces the candidate tasks for one year.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoverError`] when no index page answers or a response
    /// cannot be interpreted. Individual missing papers are not errors.
    async fn discover(&self, year: u16) -> Result<Vec<TaskDescriptor>, DiscoverError>;
}

/// Shared collaborators an adapter may need.
#[derive(Default)]
pub struct AdapterContext {
    /// Anti-bot solver, when enabled.
    pub flaresolverr: Option<Arc<FlareSolverrClient>>,
    /// Open-access PDF lookup, when enabled.
    pub semantic_scholar: Option<Arc<SemanticScholarClient>>,
}

/// Builds the adapter registered for a conference key.
#[must_use]
pub fn build_adapter(key: &str, ctx: &AdapterContext) -> Option<Box<dyn SourceAdapter>> {
    match key {
        "usenix" => Some(Box::new(UsenixAdapter::new())),
        "ndss" => Some(Box::new(NdssAdapter::new())),
        "ieee_sp" => Some(Box::new(IeeeSpAdapter::new(
            ctx.flaresolverr.clone(),
            ctx.semantic_scholar.clone(),
        ))),
        "acm_ccs" => Some(Box::new(AcmCcsAdapter::new(ctx.semantic_scholar.clone()))),
        _ => None,
    }
}

/// Deduplicates tasks by a title prefix, preserving first-seen order.
///
/// Conference pages frequently list the same paper twice (program page and
/// accepted-papers page); the first rendering wins.
pub(crate) fn dedup_by_title(tasks: Vec<TaskDescriptor>) -> Vec<TaskDescriptor> {
    let mut seen = std::collections::HashSet::new();
    tasks
        .into_iter()
        .filter(|task| {
            let key: String = task.title.to_lowercase().chars().take(50).collect();
            seen.insert(key)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str) -> TaskDescriptor {
        TaskDescriptor::new(
            "NDSS",
            2024,
            title,
            "https://example.com/",
            vec!["https://example.com/a.pdf".to_string()],
        )
    }

    #[test]
    fn test_build_adapter_known_keys() {
        let ctx = AdapterContext::default();
        for key in ["usenix", "ndss", "ieee_sp", "acm_ccs"] {
            let adapter = build_adapter(key, &ctx).expect(key);
            assert_eq!(adapter.conference().key, key);
        }
        assert!(build_adapter("unknown", &ctx).is_none());
    }

    #[test]
    fn test_dedup_by_title_keeps_first() {
        let tasks = vec![
            task("A Long Enough Paper Title"),
            task("a long enough PAPER title"),
            task("A Different Long Paper Title"),
        ];
        let deduped = dedup_by_title(tasks);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "A Long Enough Paper Title");
    }
}
