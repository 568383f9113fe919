//! Webhook Notifier - Alert Mail via HTTP Mail Relay
//!
//! Posts `{ subject, lines }` as JSON to the configured relay, which
//! turns it into an operator mail. Transient failures are retried
//! with exponential backoff before the error is handed back.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::ports::notifier::Notifier;

/// Configuration for the webhook notifier.
#[derive(Debug, Clone)]
pub struct WebhookNotifierConfig {
    /// Relay endpoint receiving the alert JSON.
    pub url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retries on failure.
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff).
    pub retry_base_delay: Duration,
}

#[derive(Debug, Serialize)]
struct AlertMail<'a> {
    subject: &'a str,
    lines: &'a [String],
}

pub struct WebhookNotifier {
    http: Client,
    config: WebhookNotifierConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookNotifierConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, config })
    }

    async fn post_once(&self, mail: &AlertMail<'_>) -> Result<()> {
        self.http
            .post(&self.config.url)
            .json(mail)
            .send()
            .await
            .context("Mail relay request failed")?
            .error_for_status()
            .context("Mail relay rejected alert")?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn send_alert(&self, subject: &str, lines: &[String]) -> Result<()> {
        let mail = AlertMail { subject, lines };
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis(), "Retrying alert mail");
                sleep(delay).await;
            }

            match self.post_once(&mail).await {
                Ok(()) => {
                    debug!(subject, "Alert mail accepted by relay");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Alert mail attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Alert mail not sent")))
    }
}
