//! FlareSolverr client for fetching pages behind anti-bot challenges.
//!
//! FlareSolverr drives a headless browser; we hand it a URL and get back
//! the solved page body plus the session cookies. The client implements
//! [`ContentFetcher`], so the engine can use it interchangeably with the
//! plain HTTP transport, and source adapters can bootstrap cookies from it
//! for subsequent direct requests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::fetch::{ContentFetcher, FetchError, FetchRequest, FetchedPayload};

/// Default FlareSolverr endpoint.
pub const DEFAULT_FLARESOLVERR_URL: &str = "http://localhost:8191/v1";

/// Solver-side timeout handed to the headless browser (milliseconds).
const SOLVER_TIMEOUT_MS: u64 = 60_000;

/// One browser cookie returned by the solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
}

#[derive(Debug, Serialize)]
struct SolverRequest<'a> {
    cmd: &'a str,
    url: &'a str,
    #[serde(rename = "maxTimeout")]
    max_timeout: u64,
}

#[derive(Debug, Deserialize)]
struct SolverResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    solution: Option<SolverSolution>,
}

#[derive(Debug, Deserialize)]
struct SolverSolution {
    #[serde(default)]
    cookies: Vec<SolverCookie>,
    #[serde(default, rename = "userAgent")]
    user_agent: Option<String>,
    #[serde(default)]
    response: String,
}

/// Client for a FlareSolverr service instance.
#[derive(Debug, Clone)]
pub struct FlareSolverrClient {
    endpoint: String,
    client: reqwest::Client,
}

impl FlareSolverrClient {
    /// Creates a client against the given endpoint.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(SOLVER_TIMEOUT_MS + 10_000))
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    /// Probes the service health endpoint.
    pub async fn check_available(&self) -> bool {
        let health_url = self.endpoint.replace("/v1", "/health");
        let available = self
            .client
            .get(&health_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        if available {
            info!(endpoint = %self.endpoint, "FlareSolverr available");
        } else {
            warn!(endpoint = %self.endpoint, "FlareSolverr not available");
        }
        available
    }

    /// Visits `target_url` through the solver and returns the session
    /// cookies plus the browser's User-Agent.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the service is unreachable or reports a
    /// non-ok status.
    pub async fn get_cookies(
        &self,
        target_url: &str,
    ) -> Result<(Vec<SolverCookie>, Option<String>), FetchError> {
        let solution = self.solve(target_url).await?;
        debug!(
            url = %target_url,
            cookies = solution.cookies.len(),
            "solver returned cookies"
        );
        Ok((solution.cookies, solution.user_agent))
    }

    async fn solve(&self, url: &str) -> Result<SolverSolution, FetchError> {
        let payload = SolverRequest {
            cmd: "request.get",
            url,
            max_timeout: SOLVER_TIMEOUT_MS,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::timeout(url)
                } else {
                    FetchError::network(url, e)
                }
            })?;

        if !response.status().is_success() {
            return Err(FetchError::http_status(url, response.status().as_u16()));
        }

        let body: SolverResponse = response
            .json()
            .await
            .map_err(|e| FetchError::service(url, format!("unparseable solver response: {e}")))?;

        if body.status != "ok" {
            return Err(FetchError::service(
                url,
                format!("solver status {}: {}", body.status, body.message),
            ));
        }

        body.solution
            .ok_or_else(|| FetchError::service(url, "solver returned no solution"))
    }
}

#[async_trait]
impl ContentFetcher for FlareSolverrClient {
    /// Fetches a page body through the solver.
    ///
    /// The solver returns rendered page text, so this path suits HTML
    /// discovery pages; binary artifacts still go through the plain
    /// transport.
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedPayload, FetchError> {
        let solution = self.solve(&req.url).await?;
        Ok(FetchedPayload {
            bytes: solution.response.into_bytes(),
            content_type: Some("text/html".to_string()),
            final_url: req.url.clone(),
        })
    }
}

/// Renders solver cookies as a `Cookie` request header value.
#[must_use]
pub fn cookie_header(cookies: &[SolverCookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> FlareSolverrClient {
        FlareSolverrClient::new(format!("{}/v1", server.uri()))
    }

    #[tokio::test]
    async fn test_check_available_uses_health_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(client_for(&server).check_available().await);
    }

    #[tokio::test]
    async fn test_check_available_false_when_down() {
        let server = MockServer::start().await;
        assert!(!client_for(&server).check_available().await);
    }

    #[tokio::test]
    async fn test_get_cookies_parses_solution() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "message": "",
                "solution": {
                    "cookies": [{"name": "cf_clearance", "value": "abc123"}],
                    "userAgent": "Mozilla/5.0 Solver",
                    "response": "<html></html>"
                }
            })))
            .mount(&server)
            .await;

        let (cookies, user_agent) = client_for(&server)
            .get_cookies("https://target.example/")
            .await
            .unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "cf_clearance");
        assert_eq!(user_agent.as_deref(), Some("Mozilla/5.0 Solver"));
    }

    #[tokio::test]
    async fn test_solver_error_status_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "message": "challenge not solved"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).get_cookies("https://target.example/").await;
        match result {
            Err(FetchError::Service { message, .. }) => {
                assert!(message.contains("challenge not solved"));
            }
            other => panic!("expected Service error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_rendered_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "solution": {
                    "cookies": [],
                    "response": "<html><body>solved</body></html>"
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let payload = client
            .fetch(&FetchRequest::new("https://target.example/page"))
            .await
            .unwrap();
        assert_eq!(payload.bytes, b"<html><body>solved</body></html>");
        assert_eq!(payload.content_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn test_cookie_header_rendering() {
        let cookies = vec![
            SolverCookie {
                name: "a".to_string(),
                value: "1".to_string(),
            },
            SolverCookie {
                name: "b".to_string(),
                value: "2".to_string(),
            },
        ];
        assert_eq!(cookie_header(&cookies), "a=1; b=2");
    }
}
