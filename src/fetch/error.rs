//! Error types for the fetch module.

use thiserror::Error;

/// Errors a content fetcher can report for a single request.
///
/// Typed failures only - the engine is the sole decision point for retry
/// versus terminal failure, so fetchers never retry internally.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS, reset).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (429 responses).
        retry_after: Option<String>,
    },

    /// An intermediary service (e.g. the anti-bot solver) reported failure.
    #[error("fetch service error for {url}: {message}")]
    Service {
        /// The URL being fetched through the service.
        url: String,
        /// Service-reported failure message.
        message: String,
    },

    /// The request was aborted by run-wide cancellation.
    #[error("fetch cancelled for {url}")]
    Cancelled {
        /// The URL whose fetch was aborted.
        url: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error with no Retry-After value.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error carrying a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a service error.
    pub fn service(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let error = FetchError::timeout("https://example.com/paper.pdf");
        let msg = error.to_string();
        assert!(msg.contains("timeout"), "expected 'timeout' in: {msg}");
        assert!(msg.contains("example.com"), "expected URL in: {msg}");
    }

    #[test]
    fn test_http_status_display() {
        let error = FetchError::http_status("https://example.com/paper.pdf", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "expected '404' in: {msg}");
    }

    #[test]
    fn test_service_display() {
        let error = FetchError::service("https://example.com", "solver returned error");
        let msg = error.to_string();
        assert!(msg.contains("solver returned error"), "got: {msg}");
    }

    #[test]
    fn test_retry_after_carried() {
        let error = FetchError::http_status_with_retry_after(
            "https://example.com",
            429,
            Some("120".to_string()),
        );
        match error {
            FetchError::HttpStatus {
                status, retry_after, ..
            } => {
                assert_eq!(status, 429);
                assert_eq!(retry_after.as_deref(), Some("120"));
            }
            other => panic!("expected HttpStatus, got: {other:?}"),
        }
    }
}
