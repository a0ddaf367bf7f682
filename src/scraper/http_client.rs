use crate::config::ScraperConfig;
use crate::scraper::{PageFetcher, ScrapeError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner })
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    /// Single GET; any failure, including a non-2xx status, is transient.
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        let transient = |reason: String| ScrapeError::TransientFetch {
            url: url.to_string(),
            reason,
        };

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| transient(format!("request error: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(transient(format!("HTTP {}", status)));
        }

        resp.text()
            .await
            .map_err(|e| transient(format!("failed to read response body: {}", e)))
    }
}
