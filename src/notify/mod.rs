//! Failure notification: who hears about a run that had to be aborted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_failure(&self, reason: &str) -> Result<()>;
}

/// Writes the failure to the log and nothing else.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_failure(&self, reason: &str) -> Result<()> {
        error!("Scraping failure: {}", reason);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct FailureEvent<'a> {
    event: &'static str,
    reason: &'a str,
    at: String,
}

/// POSTs a small JSON event to an administrator webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_failure(&self, reason: &str) -> Result<()> {
        let body = FailureEvent {
            event: "scraping_failure",
            reason,
            at: Utc::now().to_rfc3339(),
        };
        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach notification webhook")?
            .error_for_status()
            .context("Notification webhook rejected the event")?;
        info!("Failure reported to {}", self.url);
        Ok(())
    }
}
