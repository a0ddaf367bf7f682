pub mod http_client;
pub mod parsers;
pub mod retry;

use crate::mapping::FieldMapping;
use crate::models::{DetailRef, ExtractedRecord, PaginationRef, SearchOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};
use url::{Url, form_urlencoded};

use self::parsers::{extract_fields, extract_view_links, has_search_form, parse_results_heading};
use self::retry::RetryPolicy;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Connection error, timeout, bad status or unreadable body. Retried.
    #[error("fetch failed for {url}: {reason}")]
    TransientFetch { url: String, reason: String },

    #[error("search form '{form}' not found on {url}; wrong search URL or the site changed")]
    SiteShape { url: String, form: String },

    #[error("results heading missing or malformed on {url}")]
    ResultsHeading { url: String },

    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("bad selector {0}")]
    Selector(String),

    #[error("worker task failed: {0}")]
    Worker(String),

    /// The failure was already reported through the notifier.
    #[error("scraping failed and was reported: {reason}")]
    Handled { reason: String },
}

impl ScrapeError {
    pub fn is_handled(&self) -> bool {
        matches!(self, ScrapeError::Handled { .. })
    }
}

// ── Fetch trait ───────────────────────────────────────────────────────────────

/// Swappable page source: one GET, body as text, no retries of its own.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError>;
}

// ── Site scraper ──────────────────────────────────────────────────────────────

/// All per-page operations of a run. Every fetch goes through the retry policy.
pub struct SiteScraper {
    fetcher: Arc<dyn PageFetcher>,
    retry: RetryPolicy,
    search_url: Url,
    search_form: String,
    mapping: FieldMapping,
}

impl SiteScraper {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        retry: RetryPolicy,
        search_url: &str,
        search_form: impl Into<String>,
        mapping: FieldMapping,
    ) -> Result<Self, ScrapeError> {
        let search_url = Url::parse(search_url).map_err(|source| ScrapeError::InvalidUrl {
            url: search_url.to_string(),
            source,
        })?;
        Ok(Self {
            fetcher,
            retry,
            search_url,
            search_form: search_form.into(),
            mapping,
        })
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        debug!("GET {}", url);
        self.retry.run(url, || self.fetcher.fetch(url)).await
    }

    /// Fail unless the search page still carries the expected search form.
    pub async fn validate(&self) -> Result<(), ScrapeError> {
        let url = self.search_url.as_str();
        let html = self.fetch(url).await?;
        if has_search_form(&html, &self.search_form)? {
            info!("Search page OK ({})", url);
            return Ok(());
        }
        error!("Search form '{}' not found at {}", self.search_form, url);
        Err(ScrapeError::SiteShape {
            url: url.to_string(),
            form: self.search_form.clone(),
        })
    }

    /// `<search_url>?q=<trimmed name>`
    pub fn query_url(&self, name: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("q", name.trim())
            .finish();
        format!("{}?{}", self.search_url, query)
    }

    pub async fn search_one(&self, name: &str) -> Result<SearchOutcome, ScrapeError> {
        if name.trim().is_empty() {
            return Ok(SearchOutcome::Empty);
        }

        let url = self.query_url(name);
        let html = self.fetch(&url).await?;

        let heading = parse_results_heading(&html).ok_or_else(|| {
            error!("Unable to find results heading on {}", url);
            ScrapeError::ResultsHeading { url: url.clone() }
        })?;
        debug!(
            "{:?}: {} results, {} per page",
            name, heading.total_count, heading.page_size
        );

        if heading.total_count == 0 {
            return Ok(SearchOutcome::Empty);
        }
        if heading.total_count <= heading.page_size {
            let refs = extract_view_links(&html, &self.search_url)?;
            return Ok(SearchOutcome::Direct(refs));
        }
        if heading.page_size == 0 {
            return Err(ScrapeError::ResultsHeading { url });
        }

        let refs = page_offsets(heading.page_size, heading.total_count)
            .into_iter()
            .map(|offset| PaginationRef {
                url: format!("{}&start={}", url, offset),
                search_name: name.to_string(),
                offset,
            })
            .collect();
        Ok(SearchOutcome::Paginated(refs))
    }

    /// Detail links on one extra results page.
    pub async fn expand_page(&self, page: &PaginationRef) -> Result<Vec<DetailRef>, ScrapeError> {
        let html = self.fetch(&page.url).await?;
        let refs = extract_view_links(&html, &self.search_url)?;
        debug!("{:?} @ {}: {} detail links", page.search_name, page.offset, refs.len());
        Ok(refs)
    }

    /// One table row from a detail page.
    pub async fn extract_form(&self, detail: &DetailRef) -> Result<ExtractedRecord, ScrapeError> {
        let html = self.fetch(&detail.url).await?;
        let values = extract_fields(&html, &self.mapping)?;
        Ok(ExtractedRecord {
            source_url: detail.url.clone(),
            values,
        })
    }
}

/// `0, p, 2p, … < total` when the results overflow one page, otherwise nothing.
pub fn page_offsets(page_size: u64, total_count: u64) -> Vec<u64> {
    if page_size == 0 || total_count <= page_size {
        return Vec::new();
    }
    (0..total_count).step_by(page_size as usize).collect()
}

// ── Test support ──────────────────────────────────────────────────────────────

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory site: canned pages by URL, optional leading failures per URL.
    #[derive(Default)]
    pub struct StaticFetcher {
        pages: HashMap<String, String>,
        failures: Mutex<HashMap<String, u32>>,
        calls: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
            self.pages.insert(url.into(), html.into());
            self
        }

        /// Fail the first `times` requests for `url`.
        pub fn failing(self, url: impl Into<String>, times: u32) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(url.into(), times);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
        }
    }

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
            self.calls.lock().unwrap().push(url.to_string());

            if let Some(left) = self.failures.lock().unwrap().get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ScrapeError::TransientFetch {
                        url: url.to_string(),
                        reason: "connection reset".into(),
                    });
                }
            }

            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScrapeError::TransientFetch {
                    url: url.to_string(),
                    reason: "HTTP 404".into(),
                })
        }
    }

    pub const SEARCH_URL: &str = "https://fpds.test/ezsearch/fpdsportal";

    pub fn search_page() -> String {
        r#"<html><body><form name="search_awardfull"></form></body></html>"#.to_string()
    }

    pub fn results_page(page_size: u64, total: u64, detail_paths: &[&str]) -> String {
        let links: String = detail_paths
            .iter()
            .map(|p| format!(r#"<a title="View" href="javascript:view('{}')">View</a>"#, p))
            .collect();
        format!(
            r#"<html><body><span class="results_heading">Results</span>
               <b>1</b> - <b>{}</b> of <b>{}</b>{}</body></html>"#,
            page_size, total, links
        )
    }

    pub fn scraper(fetcher: Arc<StaticFetcher>, mapping: FieldMapping) -> SiteScraper {
        SiteScraper::new(
            fetcher,
            RetryPolicy::new(3, std::time::Duration::ZERO),
            SEARCH_URL,
            "search_awardfull",
            mapping,
        )
        .unwrap()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
