//! Shared HTTP client for discovery page fetches.
//!
//! Adapters probe several candidate index URLs per year and issue paginated
//! API calls. This wrapper centralizes the browser-like headers, the short
//! page timeout, and the error mapping so individual adapters stay focused
//! on their page layout.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::DEFAULT_USER_AGENT;
use crate::fetch::{FetchError, PAGE_TIMEOUT_SECS};

/// HTTP client for conference index pages and discovery APIs.
#[derive(Debug, Clone)]
pub struct PageClient {
    client: reqwest::Client,
}

impl Default for PageClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PageClient {
    /// Creates a client with browser-like headers and page timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PAGE_TIMEOUT_SECS))
            .gzip(true)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Fetches a page body as text.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on network failure or a non-success status.
    pub async fn get_html(&self, url: &str) -> Result<String, FetchError> {
        debug!(url = %url, "fetching page");
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::network(url, e))
    }

    /// Returns the body of the first candidate URL that answers 200, with
    /// the URL it came from.
    pub async fn first_responding<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a str>,
    ) -> Option<(String, String)> {
        for url in candidates {
            match self.get_html(url).await {
                Ok(body) => {
                    debug!(url = %url, "index page found");
                    return Some((url.to_string(), body));
                }
                Err(e) => debug!(url = %url, error = %e, "candidate page did not answer"),
            }
        }
        None
    }

    /// POSTs a JSON payload and decodes a JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on network failure, non-success status, or an
    /// undecodable body.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        headers: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::service(url, format!("unparseable JSON response: {e}")))
    }
}
