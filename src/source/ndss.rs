//! NDSS Symposium discovery.
//!
//! NDSS publishes accepted papers with direct PDF links hosted under the
//! symposium site. All candidate index pages that answer are scanned, since
//! the program and accepted-papers pages overlap but are not identical.

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use super::{DiscoverError, MIN_TITLE_LEN, PageClient, SourceAdapter, dedup_by_title};
use crate::config::{ConferenceConfig, conference_by_key};
use crate::task::TaskDescriptor;

const DEFAULT_BASE_URL: &str = "https://www.ndss-symposium.org";

/// Discovery adapter for NDSS.
pub struct NdssAdapter {
    base_url: String,
    client: PageClient,
}

impl Default for NdssAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl NdssAdapter {
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

    fn index_candidates(&self, year: u16) -> Vec<String> {
        vec![
            format!("{}/ndss{year}/accepted-papers/", self.base_url),
            format!("{}/ndss{year}/program/", self.base_url),
            format!("{}/ndss{year}/", self.base_url),
            format!("{}/ndss{year}/papers/", self.base_url),
        ]
    }

    fn extract_papers(&self, body: &str, page_url: &str, year: u16) -> Vec<TaskDescriptor> {
        let document = Html::parse_document(body);
        let pdf_links = Selector::parse(r#"a[href$=".pdf"]"#).unwrap_or_else(|_| unreachable!());

        let mut tasks = Vec::new();
        for anchor in document.select(&pdf_links) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let url = if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{}{}", self.base_url, href)
            };

            let title = anchor_title(anchor);
            if title.len() < MIN_TITLE_LEN {
                continue;
            }

            let authors = sibling_authors(anchor);
            let mut task = TaskDescriptor::new(
                self.conference().dir_name,
                year,
                title,
                page_url,
                vec![url],
            );
            if let Some(authors) = authors {
                task = task.with_authors(authors);
            }
            tasks.push(task);
        }
        tasks
    }
}

/// A PDF link's display title: its own text or the nearest heading above it.
fn anchor_title(anchor: scraper::ElementRef<'_>) -> String {
    let own: String = anchor.text().collect::<String>().trim().to_string();
    if own.len() >= MIN_TITLE_LEN {
        return own;
    }

    for ancestor in anchor.ancestors().take(4) {
        if let Some(element) = scraper::ElementRef::wrap(ancestor) {
            let heading =
                Selector::parse("h3, h4, strong, .paper-title").unwrap_or_else(|_| unreachable!());
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

/// Author line, when the surrounding markup carries one.
fn sibling_authors(anchor: scraper::ElementRef<'_>) -> Option<String> {
    for ancestor in anchor.ancestors().take(4) {
        if let Some(element) = scraper::ElementRef::wrap(ancestor) {
            let authors = Selector::parse(".paper-authors, .authors, em")
                .unwrap_or_else(|_| unreachable!());
            if let Some(found) = element.select(&authors).next() {
                let text: String = found.text().collect::<String>().trim().to_string();
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
    }
    None
}

#[async_trait]
impl SourceAdapter for NdssAdapter {
    fn conference(&self) -> &'static ConferenceConfig {
        conference_by_key("ndss").unwrap_or_else(|| unreachable!())
    }

    async fn discover(&self, year: u16) -> Result<Vec<TaskDescriptor>, DiscoverError> {
        info!(year, "discovering NDSS papers");

        let mut tasks = Vec::new();
        let mut any_page = false;
        for url in self.index_candidates(year) {
            match self.client.get_html(&url).await {
                Ok(body) => {
                    any_page = true;
                    let found = self.extract_papers(&body, &url, year);
                    debug!(url = %url, papers = found.len(), "extracted papers");
                    tasks.extend(found);
                }
                Err(e) => debug!(url = %url, error = %e, "candidate page did not answer"),
            }
        }

        if !any_page {
            return Err(DiscoverError::NoIndexPage {
                conference: self.conference().name,
                year,
            });
        }

        let tasks = dedup_by_title(tasks);
        if tasks.is_empty() {
            warn!(year, "index pages answered but no papers were extracted");
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
          <div class="paper">
            <h3>Measuring the Unmeasurable at Internet Scale</h3>
            <p class="paper-authors">Ada Lovelace, Charles Babbage</p>
            <a href="/wp-content/uploads/2024-123-paper.pdf">Paper</a>
          </div>
          <div class="paper">
            <a href="https://cdn.example.org/ndss/2024-456.pdf">
              Defending the Indefensible with Style
            </a>
          </div>
          <a href="/wp-content/uploads/slides.pdf">Slides</a>
        </body></html>
    "#;

    #[tokio::test]
    async fn test_discover_extracts_pdf_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ndss2024/accepted-papers/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ACCEPTED_PAGE))
            .mount(&server)
            .await;

        let adapter = NdssAdapter::with_base_url(server.uri());
        let tasks = adapter.discover(2024).await.unwrap();

        assert_eq!(tasks.len(), 2);
        let first = &tasks[0];
        assert_eq!(first.title, "Measuring the Unmeasurable at Internet Scale");
        assert_eq!(
            first.authors.as_deref(),
            Some("Ada Lovelace, Charles Babbage")
        );
        assert!(first.urls[0].ends_with("/wp-content/uploads/2024-123-paper.pdf"));
        assert!(first.urls[0].starts_with(&server.uri()));

        let second = &tasks[1];
        assert_eq!(second.title, "Defending the Indefensible with Style");
        assert_eq!(second.urls[0], "https://cdn.example.org/ndss/2024-456.pdf");
    }

    #[tokio::test]
    async fn test_discover_merges_multiple_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ndss2024/accepted-papers/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/a.pdf">The First Paper Of The Batch</a>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ndss2024/program/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/a.pdf">The First Paper Of The Batch</a>
                   <a href="/b.pdf">The Second Paper Of The Batch</a>"#,
            ))
            .mount(&server)
            .await;

        let adapter = NdssAdapter::with_base_url(server.uri());
        let tasks = adapter.discover(2024).await.unwrap();

        // Duplicate across pages collapses to one.
        assert_eq!(tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_discover_no_pages_is_error() {
        let server = MockServer::start().await;
        let adapter = NdssAdapter::with_base_url(server.uri());
        assert!(matches!(
            adapter.discover(2024).await,
            Err(DiscoverError::NoIndexPage { .. })
        ));
    }
}
