//! USENIX Security Symposium discovery.
//!
//! Recent years split accepted papers across summer/fall cycle pages;
//! older years hang everything off a single technical-sessions or program
//! page. Presentation links carry a slug from which the known PDF URL
//! patterns are derived - those patterns become the task's ordered
//! fallback list, so the engine's URL-variant chain does the probing.

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use super::{DiscoverError, MIN_TITLE_LEN, PageClient, SourceAdapter, dedup_by_title};
use crate::config::{ConferenceConfig, conference_by_key};
use crate::task::TaskDescriptor;

const DEFAULT_BASE_URL: &str = "https://www.usenix.org";

/// Discovery adapter for USENIX Security.
pub struct UsenixAdapter {
    base_url: String,
    client: PageClient,
}

impl Default for UsenixAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl UsenixAdapter {
    /// Creates an adapter against the production site.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates an adapter against a custom base URL. Mainly for tests.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: PageClient::new(),
        }
    }

    /// Candidate index pages for a year, most specific first.
    fn index_candidates(&self, year: u16) -> Vec<String> {
        let short = year % 100;
        let conf = format!("{}/conference/usenixsecurity", self.base_url);
        vec![
            format!("{conf}{short}/summer-accepted-papers"),
            format!("{conf}{short}/fall-accepted-papers"),
            format!("{conf}{year}/summer-accepted-papers"),
            format!("{conf}{year}/fall-accepted-papers"),
            format!("{conf}{year}/technical-sessions"),
            format!("{conf}{short}/technical-sessions"),
            format!("{conf}{year}/program"),
            format!("{conf}{short}/program"),
        ]
    }

    fn extract_papers(&self, body: &str, page_url: &str) -> Vec<TaskDescriptor> {
        let document = Html::parse_document(body);
        let anchors = Selector::parse("a[href]").unwrap_or_else(|_| unreachable!());
        #[allow(clippy::unwrap_used)]
        let presentation_re = Regex::new(r"/conference/usenixsecurity(\d+)/presentation/([^/]+)$")
            .unwrap();

        let mut tasks = Vec::new();
        for anchor in document.select(&anchors) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(captures) = presentation_re.captures(href) else {
                continue;
            };

            let title = element_title(anchor);
            if title.len() < MIN_TITLE_LEN {
                continue;
            }

            let year_str = &captures[1];
            let slug = &captures[2];
            let urls = vec![
                format!("{}/system/files/sec{year_str}_{slug}.pdf", self.base_url),
                format!(
                    "{}/system/files/conference/usenixsecurity{year_str}/sec{year_str}_{slug}.pdf",
                    self.base_url
                ),
                format!(
                    "{}/sites/default/files/sec{year_str}_paper_{slug}.pdf",
                    self.base_url
                ),
                format!("{}/sites/default/files/{slug}.pdf", self.base_url),
            ];

            let conference = self.conference();
            tasks.push(TaskDescriptor::new(
                conference.dir_name,
                0, // year is filled in by discover()
                title,
                page_url,
                urls,
            ));
        }
        tasks
    }
}

/// Extracts a display title for an anchor: its own text, or the nearest
/// ancestor heading when the anchor text is navigation chrome.
fn element_title(anchor: scraper::ElementRef<'_>) -> String {
    let own: String = anchor.text().collect::<String>().trim().to_string();
    if own.len() >= MIN_TITLE_LEN {
        return own;
    }

    for ancestor in anchor.ancestors().take(3) {
        if let Some(element) = scraper::ElementRef::wrap(ancestor) {
            let heading = Selector::parse("h3, h4, strong").unwrap_or_else(|_| unreachable!());
            if let Some(found) = element.select(&heading).next() {
                let text: String = found.text().collect::<String>().trim().to_string();
                if text.len() >= MIN_TITLE_LEN {
                    return text;
                }
            }
        }
    }
    own
}

#[async_trait]
impl SourceAdapter for UsenixAdapter {
    fn conference(&self) -> &'static ConferenceConfig {
        conference_by_key("usenix").unwrap_or_else(|| unreachable!())
    }

    async fn discover(&self, year: u16) -> Result<Vec<TaskDescriptor>, DiscoverError> {
        info!(year, "discovering USENIX Security papers");

        // Cycle pages complement each other; single pages stand alone.
        let candidates = self.index_candidates(year);
        let (cycle_pages, single_pages) = candidates.split_at(4);

        let mut tasks = Vec::new();
        for url in cycle_pages {
            match self.client.get_html(url).await {
                Ok(body) => {
                    let found = self.extract_papers(&body, url);
                    debug!(url = %url, papers = found.len(), "extracted papers");
                    tasks.extend(found);
                }
                Err(e) => debug!(url = %url, error = %e, "cycle page did not answer"),
            }
        }

        if tasks.is_empty() {
            let Some((url, body)) = self
                .client
                .first_responding(single_pages.iter().map(String::as_str))
                .await
            else {
                return Err(DiscoverError::NoIndexPage {
                    conference: self.conference().name,
                    year,
                });
            };
            tasks = self.extract_papers(&body, &url);
        }

        for task in &mut tasks {
            task.year = year;
        }
        let tasks = dedup_by_title(tasks);
        if tasks.is_empty() {
            warn!(year, "index page answered but no papers were extracted");
        } else {
            info!(year, papers = tasks.len(), "discovery complete");
        }
        Ok(tasks)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ACCEPTED_PAGE: &str = r#"
        <html><body>
          <article>
            <h3>Breaking Things With Great Precision</h3>
            <a href="/conference/usenixsecurity24/presentation/doe">
              Breaking Things With Great Precision
            </a>
          </article>
          <article>
            <a href="/conference/usenixsecurity24/presentation/smith-attack">
              Attacking Other Things At Scale
            </a>
          </article>
          <a href="/conference/usenixsecurity24/presentation/doe">dup link</a>
          <a href="/about">About</a>
        </body></html>
    "#;

    #[tokio::test]
    async fn test_discover_extracts_presentation_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conference/usenixsecurity24/summer-accepted-papers"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ACCEPTED_PAGE))
            .mount(&server)
            .await;

        let adapter = UsenixAdapter::with_base_url(server.uri());
        let tasks = adapter.discover(2024).await.unwrap();

        assert_eq!(tasks.len(), 2);
        let first = &tasks[0];
        assert_eq!(first.conference, "USENIX_Security");
        assert_eq!(first.year, 2024);
        assert_eq!(first.title, "Breaking Things With Great Precision");
        assert_eq!(first.urls.len(), 4);
        assert!(first.urls[0].ends_with("/system/files/sec24_doe.pdf"));
        assert!(first.urls[3].ends_with("/sites/default/files/doe.pdf"));
    }

    #[tokio::test]
    async fn test_discover_falls_back_to_technical_sessions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conference/usenixsecurity2020/technical-sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/conference/usenixsecurity20/presentation/old-paper">
                   A Sufficiently Old Paper Title</a>"#,
            ))
            .mount(&server)
            .await;

        let adapter = UsenixAdapter::with_base_url(server.uri());
        let tasks = adapter.discover(2020).await.unwrap();

        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].urls[0].ends_with("/system/files/sec20_old-paper.pdf"));
    }

    #[tokio::test]
    async fn test_discover_no_index_page_is_error() {
        let server = MockServer::start().await;
        let adapter = UsenixAdapter::with_base_url(server.uri());
        let result = adapter.discover(2024).await;
        assert!(matches!(result, Err(DiscoverError::NoIndexPage { .. })));
    }

    #[test]
    fn test_short_titles_filtered() {
        let adapter = UsenixAdapter::with_base_url("https://example.com");
        let html = r#"<a href="/conference/usenixsecurity24/presentation/x">Hi</a>"#;
        assert!(adapter.extract_papers(html, "https://example.com/p").is_empty());
    }
}
