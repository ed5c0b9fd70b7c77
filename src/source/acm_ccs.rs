//! ACM CCS discovery via DBLP.
//!
//! The ACM digital library is aggressively bot-protected, but DBLP mirrors
//! the full proceedings table of contents with DOIs. Each DOI yields a
//! `dl.acm.org/doi/pdf/` URL as the primary variant; an open-access lookup
//! appends a fallback for papers with a free copy elsewhere.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use super::{DiscoverError, MIN_TITLE_LEN, PageClient, SourceAdapter, dedup_by_title};
use crate::config::{ConferenceConfig, conference_by_key};
use crate::services::SemanticScholarClient;
use crate::task::TaskDescriptor;

const DEFAULT_DBLP_BASE: &str = "https://dblp.org";
const ACM_DL_BASE: &str = "https://dl.acm.org";

/// Discovery adapter for ACM CCS.
pub struct AcmCcsAdapter {
    dblp_base: String,
    acm_base: String,
    client: PageClient,
    semantic_scholar: Option<Arc<SemanticScholarClient>>,
}

impl AcmCcsAdapter {
    /// Creates an adapter against the production sites.
    #[must_use]
    pub fn new(semantic_scholar: Option<Arc<SemanticScholarClient>>) -> Self {
        Self {
            dblp_base: DEFAULT_DBLP_BASE.to_string(),
            acm_base: ACM_DL_BASE.to_string(),
            client: PageClient::new(),
            semantic_scholar,
        }
    }

    /// Creates an adapter against custom base URLs. Mainly for tests.
    #[must_use]
    pub fn with_base_urls(dblp_base: impl Into<String>, acm_base: impl Into<String>) -> Self {
        Self {
            dblp_base: dblp_base.into(),
            acm_base: acm_base.into(),
            client: PageClient::new(),
            semantic_scholar: None,
        }
    }

    fn toc_url(&self, year: u16) -> String {
        format!("{}/db/conf/ccs/ccs{year}.html", self.dblp_base)
    }

    fn extract_papers(&self, body: &str, page_url: &str, year: u16) -> Vec<TaskDescriptor> {
        let document = Html::parse_document(body);
        let entries =
            Selector::parse("li.entry.inproceedings").unwrap_or_else(|_| unreachable!());
        let title_sel = Selector::parse("span.title").unwrap_or_else(|_| unreachable!());
        let author_sel =
            Selector::parse(r#"span[itemprop="author"]"#).unwrap_or_else(|_| unreachable!());
        let link_sel = Selector::parse("li.ee a[href], nav.publ a[href]")
            .unwrap_or_else(|_| unreachable!());

        let mut tasks = Vec::new();
        for entry in document.select(&entries) {
            let Some(title_el) = entry.select(&title_sel).next() else {
                continue;
            };
            let title: String = title_el.text().collect::<String>();
            let title = title.trim().trim_end_matches('.').to_string();
            if title.len() < MIN_TITLE_LEN {
                continue;
            }

            let Some(doi) = entry
                .select(&link_sel)
                .filter_map(|a| a.value().attr("href"))
                .find_map(doi_from_url)
            else {
                debug!(title = %title, "entry has no DOI link");
                continue;
            };

            let authors: Vec<String> = entry
                .select(&author_sel)
                .map(|a| a.text().collect::<String>().trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();

            let mut task = TaskDescriptor::new(
                self.conference().dir_name,
                year,
                title,
                page_url,
                vec![format!("{}/doi/pdf/{doi}", self.acm_base)],
            );
            if !authors.is_empty() {
                task = task.with_authors(authors.join(", "));
            }
            // Stash the DOI for the open-access enrichment pass.
            task = task.with_header("X-Doi", doi);
            tasks.push(task);
        }
        tasks
    }
}

/// Extracts the DOI path from a `doi.org` URL.
fn doi_from_url(url: &str) -> Option<String> {
    let (_, doi) = url.split_once("doi.org/")?;
    (!doi.is_empty()).then(|| doi.to_string())
}

#[async_trait]
impl SourceAdapter for AcmCcsAdapter {
    fn conference(&self) -> &'static ConferenceConfig {
        conference_by_key("acm_ccs").unwrap_or_else(|| unreachable!())
    }

    async fn discover(&self, year: u16) -> Result<Vec<TaskDescriptor>, DiscoverError> {
        info!(year, "discovering ACM CCS papers via DBLP");

        let toc_url = self.toc_url(year);
        let body = match self.client.get_html(&toc_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %toc_url, error = %e, "DBLP page did not answer");
                return Err(DiscoverError::NoIndexPage {
                    conference: self.conference().name,
                    year,
                });
            }
        };

        let mut tasks = self.extract_papers(&body, &toc_url, year);

        if let Some(lookup) = self.semantic_scholar.as_ref() {
            for task in &mut tasks {
                let doi = task.headers.get("X-Doi").cloned();
                if let Some(url) = lookup
                    .find_open_access_pdf(doi.as_deref(), Some(&task.title))
                    .await
                {
                    if !task.urls.contains(&url) {
                        task.urls.push(url);
                    }
                }
            }
        }

        // The DOI marker is discovery-internal; strip it before the tasks
        // reach the engine.
        for task in &mut tasks {
            task.headers.remove("X-Doi");
        }

        let tasks = dedup_by_title(tasks);
        info!(year, papers = tasks.len(), "discovery complete");
        Ok(tasks)
    }
}
