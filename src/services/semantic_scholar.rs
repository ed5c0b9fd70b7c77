//! Semantic Scholar Graph API client for open-access PDF lookups.
//!
//! Used by source adapters to enrich a task's fallback URL list when the
//! primary publisher link sits behind a paywall. Lookup failures are soft:
//! the adapters just proceed without the extra URL.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::util::normalize_title;

/// Graph API base URL.
const API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

/// Per-lookup timeout.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Hosts whose "open access" links still require a subscription session.
const PAYWALLED_HOSTS: &[&str] = &["dl.acm.org", "ieeexplore.ieee.org"];

#[derive(Debug, Deserialize)]
struct PaperResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "openAccessPdf")]
    open_access_pdf: Option<OpenAccessPdf>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessPdf {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<PaperResponse>,
}

/// Client for open-access PDF lookups.
#[derive(Debug, Clone)]
pub struct SemanticScholarClient {
    base_url: String,
    client: reqwest::Client,
}

impl Default for SemanticScholarClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticScholarClient {
    /// Creates a client against the public API.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_base_url(API_BASE)
    }

    /// Creates a client against a custom base URL. Mainly for tests.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Finds an open-access PDF URL for a paper, by DOI first, then by
    /// title search. Returns `None` on any failure - lookups are
    /// best-effort.
    pub async fn find_open_access_pdf(
        &self,
        doi: Option<&str>,
        title: Option<&str>,
    ) -> Option<String> {
        if let Some(doi) = doi {
            if let Some(url) = self.lookup_by_doi(doi).await {
                return Some(url);
            }
        }
        if let Some(title) = title {
            if let Some(url) = self.search_by_title(title).await {
                return Some(url);
            }
        }
        None
    }

    async fn lookup_by_doi(&self, doi: &str) -> Option<String> {
        let url = format!("{}/paper/DOI:{doi}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "title,openAccessPdf")])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            debug!(doi, status = response.status().as_u16(), "DOI lookup failed");
            return None;
        }
        let paper: PaperResponse = response.json().await.ok()?;
        usable_pdf_url(&paper)
    }

    async fn search_by_title(&self, title: &str) -> Option<String> {
        let url = format!("{}/paper/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", title),
                ("fields", "title,openAccessPdf"),
                ("limit", "3"),
            ])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            debug!(title, status = response.status().as_u16(), "title search failed");
            return None;
        }
        let results: SearchResponse = response.json().await.ok()?;

        // Only accept an actual title match - search is fuzzy.
        let wanted = normalize_title(title);
        results
            .data
            .iter()
            .filter(|paper| {
                paper
                    .title
                    .as_deref()
                    .is_some_and(|t| normalize_title(t) == wanted)
            })
            .find_map(usable_pdf_url)
    }
}

fn usable_pdf_url(paper: &PaperResponse) -> Option<String> {
    let url = paper.open_access_pdf.as_ref()?.url.clone()?;
    if PAYWALLED_HOSTS.iter().any(|host| url.contains(host)) {
        debug!(url = %url, "skipping paywalled open-access URL");
        return None;
    }
    Some(url)
}
