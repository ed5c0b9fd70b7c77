//! HTTP transport: one request in, raw bytes or a typed failure out.
//!
//! The [`ContentFetcher`] trait is the single transport contract. The engine
//! treats the plain [`HttpTransport`] and alternate fetchers (anti-bot
//! solver, metadata lookups) interchangeably through it. Fetchers never
//! retry internally - backoff policy stays centralized in the engine where
//! it is testable.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use tracing::debug;

use super::constants::{CONNECT_TIMEOUT_SECS, MAX_CONTENT_BYTES, REQUEST_TIMEOUT_SECS};
use super::error::FetchError;
use crate::config::DEFAULT_USER_AGENT;

/// One fetch to perform: URL, opaque extra headers, and a hard deadline.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Target URL.
    pub url: String,
    /// Extra request headers, carried opaquely from the task descriptor.
    pub headers: HashMap<String, String>,
    /// Hard deadline for the whole request.
    pub timeout: Duration,
}

impl FetchRequest {
    /// Creates a request with no extra headers and the default timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Replaces the extra headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Overrides the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A fetched response body with the metadata validation needs.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    /// Raw response body.
    pub bytes: Vec<u8>,
    /// Declared `Content-Type` header, when present.
    pub content_type: Option<String>,
    /// URL the body was actually served from, after redirects.
    pub final_url: String,
}

/// Transport contract: a single attempt, no internal retries, no disk I/O.
///
/// Implemented by [`HttpTransport`] and by alternate fetchers such as the
/// FlareSolverr client, so the engine can swap them freely.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Performs one fetch of `req`, honoring its timeout.
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedPayload, FetchError>;
}

/// Plain HTTP implementation of [`ContentFetcher`] backed by a pooled
/// reqwest client. Create once and share.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    /// Reading stops once the body exceeds this many bytes; the validator
    /// then rejects the oversized payload without us buffering the rest.
    max_body_bytes: u64,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Creates a transport with default timeouts and body cap.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .gzip(true)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            max_body_bytes: MAX_CONTENT_BYTES + 1,
        }
    }

    /// Overrides the body cap. Mainly for tests.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

#[async_trait]
impl ContentFetcher for HttpTransport {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedPayload, FetchError> {
        debug!(url = %req.url, "fetching");

        let mut request = self.client.get(&req.url).timeout(req.timeout);
        for (name, value) in &req.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(&req.url)
            } else {
                FetchError::network(&req.url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(FetchError::http_status_with_retry_after(
                &req.url,
                status.as_u16(),
                retry_after,
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(std::string::ToString::to_string);
        let final_url = response.url().to_string();

        // Stream the body, stopping once it exceeds the cap. The validator
        // rejects the truncated oversize payload by length.
        let mut bytes: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    FetchError::timeout(&req.url)
                } else {
                    FetchError::network(&req.url, e)
                }
            })?;
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > self.max_body_bytes {
                debug!(url = %req.url, cap = self.max_body_bytes, "body exceeds cap, truncating");
                break;
            }
        }

        Ok(FetchedPayload {
            bytes,
            content_type,
            final_url,
        })
    }
}
