//! IEEE S&P (Oakland) discovery via the IEEE Xplore search API.
//!
//! Xplore exposes a paginated JSON search endpoint keyed by proceeding
//! number. Direct `ielx` PDF URLs can be derived from each record's
//! article/issue numbers; the `ielx7` and `ielx8` shards both exist in the
//! wild, so both become URL variants. Papers without article numbers fall
//! back to an open-access lookup.
//!
//! Xplore sits behind anti-bot protection for some networks; when a
//! FlareSolverr client is supplied, its cookies are attached to every
//! derived task.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{DiscoverError, PageClient, SourceAdapter, dedup_by_title};
use crate::config::{ConferenceConfig, conference_by_key};
use crate::services::flaresolverr::cookie_header;
use crate::services::{FlareSolverrClient, SemanticScholarClient};
use crate::task::TaskDescriptor;

const DEFAULT_BASE_URL: &str = "https://ieeexplore.ieee.org";

/// Results per API page.
const ROWS_PER_PAGE: usize = 100;

/// Year to Xplore proceeding number.
const YEAR_PROCEEDINGS: &[(u16, &str)] = &[
    (2025, "10919321"),
    (2024, "10646615"),
    (2023, "10179215"),
    (2022, "9833550"),
    (2021, "9519381"),
    (2020, "9144328"),
    (2019, "8835275"),
    (2018, "8418567"),
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, rename = "totalRecords")]
    total_records: usize,
    #[serde(default)]
    records: Vec<SearchRecord>,
}

#[derive(Debug, Deserialize)]
struct SearchRecord {
    #[serde(default, rename = "articleTitle")]
    article_title: String,
    #[serde(default, rename = "articleNumber")]
    article_number: String,
    #[serde(default, rename = "publicationNumber")]
    publication_number: String,
    #[serde(default, rename = "isNumber")]
    is_number: String,
    #[serde(default)]
    doi: String,
    #[serde(default)]
    authors: Vec<RecordAuthor>,
}

#[derive(Debug, Deserialize)]
struct RecordAuthor {
    #[serde(default, rename = "preferredName")]
    preferred_name: String,
    #[serde(default, rename = "normalizedName")]
    normalized_name: String,
}

/// Discovery adapter for IEEE S&P.
pub struct IeeeSpAdapter {
    base_url: String,
    client: PageClient,
    flaresolverr: Option<Arc<FlareSolverrClient>>,
    semantic_scholar: Option<Arc<SemanticScholarClient>>,
}

impl IeeeSpAdapter {
    /// Creates an adapter against the production site.
    #[must_use]
    pub fn new(
        flaresolverr: Option<Arc<FlareSolverrClient>>,
        semantic_scholar: Option<Arc<SemanticScholarClient>>,
    ) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client: PageClient::new(),
            flaresolverr,
            semantic_scholar,
        }
    }

    /// Creates an adapter against a custom base URL. Mainly for tests.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: PageClient::new(),
            flaresolverr: None,
            semantic_scholar: None,
        }
    }

    fn proceeding_number(year: u16) -> Option<&'static str> {
        YEAR_PROCEEDINGS
            .iter()
            .find(|(y, _)| *y == year)
            .map(|(_, id)| *id)
    }

    /// Bootstraps anti-bot cookies through the solver, when configured.
    async fn bootstrap_cookie(&self) -> Option<String> {
        let solver = self.flaresolverr.as_ref()?;
        if !solver.check_available().await {
            return None;
        }
        let probe = format!("{}/xpl/home.jsp", self.base_url);
        match solver.get_cookies(&probe).await {
            Ok((cookies, _)) if !cookies.is_empty() => Some(cookie_header(&cookies)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "cookie bootstrap failed; continuing without");
                None
            }
        }
    }

    fn record_to_task(
        &self,
        record: &SearchRecord,
        punumber: &str,
        year: u16,
        source_url: &str,
    ) -> Option<TaskDescriptor> {
        if record.article_title.is_empty() {
            return None;
        }

        let publication = if record.publication_number.is_empty() {
            punumber
        } else {
            &record.publication_number
        };

        let mut urls = Vec::new();
        if !record.article_number.is_empty() && !record.is_number.is_empty() {
            for shard in ["ielx7", "ielx8"] {
                urls.push(format!(
                    "{}/{shard}/{publication}/{}/{}.pdf?tp=&arnumber={}&isnumber={}&ref=",
                    self.base_url,
                    record.is_number,
                    record.article_number,
                    record.article_number,
                    record.is_number,
                ));
            }
        }
        if urls.is_empty() {
            return None;
        }

        let authors: Vec<&str> = record
            .authors
            .iter()
            .map(|a| {
                if a.preferred_name.is_empty() {
                    a.normalized_name.as_str()
                } else {
                    a.preferred_name.as_str()
                }
            })
            .filter(|name| !name.is_empty())
            .collect();

        let mut task = TaskDescriptor::new(
            self.conference().dir_name,
            year,
            record.article_title.clone(),
            source_url,
            urls,
        );
        if !authors.is_empty() {
            task = task.with_authors(authors.join(", "));
        }
        Some(task)
    }

    /// Appends an open-access fallback URL for papers the lookup knows.
    async fn enrich_with_open_access(&self, task: &mut TaskDescriptor, doi: &str) {
        let Some(lookup) = self.semantic_scholar.as_ref() else {
            return;
        };
        let doi = (!doi.is_empty()).then_some(doi);
        if let Some(url) = lookup.find_open_access_pdf(doi, Some(&task.title)).await {
            if !task.urls.contains(&url) {
                debug!(title = %task.title, url = %url, "open-access fallback added");
                task.urls.push(url);
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for IeeeSpAdapter {
    fn conference(&self) -> &'static ConferenceConfig {
        conference_by_key("ieee_sp").unwrap_or_else(|| unreachable!())
    }

    async fn discover(&self, year: u16) -> Result<Vec<TaskDescriptor>, DiscoverError> {
        info!(year, "discovering IEEE S&P papers");

        let Some(punumber) = Self::proceeding_number(year) else {
            return Err(DiscoverError::Parse {
                message: format!("no known proceeding number for {year}"),
            });
        };

        let cookie = self.bootstrap_cookie().await;
        let api_url = format!("{}/rest/search", self.base_url);
        let referer = format!("{}/xpl/conhome/{punumber}/proceeding", self.base_url);

        let mut tasks = Vec::new();
        let mut page = 1usize;
        loop {
            let payload = json!({
                "punumber": punumber,
                "rowsPerPage": ROWS_PER_PAGE,
                "pageNumber": page,
            });
            let headers = [
                ("Accept", "application/json"),
                ("Content-Type", "application/json"),
                ("Origin", self.base_url.as_str()),
                ("Referer", referer.as_str()),
            ];
            let response: SearchResponse =
                self.client.post_json(&api_url, &payload, &headers).await?;

            if page == 1 {
                debug!(total = response.total_records, "Xplore search answered");
            }
            if response.records.is_empty() {
                break;
            }

            let page_size = response.records.len();
            for record in &response.records {
                if let Some(mut task) = self.record_to_task(record, punumber, year, &referer) {
                    if let Some(cookie) = &cookie {
                        task = task.with_header("Cookie", cookie.clone());
                    }
                    self.enrich_with_open_access(&mut task, &record.doi).await;
                    tasks.push(task);
                }
            }

            if tasks.len() >= response.total_records || page_size < ROWS_PER_PAGE {
                break;
            }
            page += 1;
        }

        let tasks = dedup_by_title(tasks);
        info!(year, papers = tasks.len(), "discovery complete");
        Ok(tasks)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(title: &str, article: &str) -> serde_json::Value {
        json!({
            "articleTitle": title,
            "articleNumber": article,
            "publicationNumber": "10179215",
            "isNumber": "10179280",
            "doi": "10.1109/SP46215.2023.10179300",
            "authors": [
                {"preferredName": "Ada Lovelace"},
                {"normalizedName": "C. Babbage", "preferredName": ""}
            ]
        })
    }

    #[tokio::test]
    async fn test_discover_builds_ielx_variants() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalRecords": 1,
                "records": [record("Oakland Paper With A Title", "10179300")]
            })))
            .mount(&server)
            .await;

        let adapter = IeeeSpAdapter::with_base_url(server.uri());
        let tasks = adapter.discover(2023).await.unwrap();

        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.conference, "IEEE_SP");
        assert_eq!(task.authors.as_deref(), Some("Ada Lovelace, C. Babbage"));
        assert_eq!(task.urls.len(), 2);
        assert!(task.urls[0].contains("/ielx7/10179215/10179280/10179300.pdf"));
        assert!(task.urls[1].contains("/ielx8/"));
    }

    #[tokio::test]
    async fn test_discover_unknown_year_is_error() {
        let adapter = IeeeSpAdapter::with_base_url("https://example.com");
        assert!(matches!(
            adapter.discover(1999).await,
            Err(DiscoverError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_discover_paginates_until_short_page() {
        let server = MockServer::start().await;
        // A single page with fewer than ROWS_PER_PAGE records ends the loop.
        let records: Vec<_> = (0..3)
            .map(|i| record(&format!("Sufficiently Long Title {i}"), &format!("1{i}")))
            .collect();
        Mock::given(method("POST"))
            .and(path("/rest/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalRecords": 250,
                "records": records
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = IeeeSpAdapter::with_base_url(server.uri());
        let tasks = adapter.discover(2023).await.unwrap();
        assert_eq!(tasks.len(), 3);
    }

    #[tokio::test]
    async fn test_record_without_article_number_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalRecords": 1,
                "records": [{
                    "articleTitle": "A Paper Without Numbers",
                    "articleNumber": "",
                    "isNumber": ""
                }]
            })))
            .mount(&server)
            .await;

        let adapter = IeeeSpAdapter::with_base_url(server.uri());
        let tasks = adapter.discover(2023).await.unwrap();
        assert!(tasks.is_empty());
    }
}
