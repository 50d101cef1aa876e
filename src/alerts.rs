//! Alert sink (C13): the monitor's single side channel (spec §4.7, §6.4
//! `slack_webhook_url`). A narrow `notify(message)` trait with a Slack-webhook
//! implementation and a no-op for when alerting is unconfigured.

use async_trait::async_trait;
use serde_json::json;

/// A destination for operator-facing alerts. Implementations MUST NOT propagate
/// delivery failures into the monitor cycle — a dropped alert is logged, not fatal.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Posts `{text: message}` to a Slack incoming webhook.
pub struct SlackAlertSink {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackAlertSink {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertSink for SlackAlertSink {
    async fn notify(&self, message: &str) {
        let result = self
            .http
            .post(&self.webhook_url)
            .json(&json!({ "text": message }))
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to deliver slack alert");
        }
    }
}

/// Used when `slack_webhook_url` is empty (spec §6.4: "empty disables alerts").
pub struct NoopAlertSink;

#[async_trait]
impl AlertSink for NoopAlertSink {
    async fn notify(&self, message: &str) {
        tracing::debug!(message, "alerting disabled, dropping alert");
    }
}

/// Builds the configured sink (spec §6.4).
pub fn from_webhook_url(webhook_url: Option<&str>) -> std::sync::Arc<dyn AlertSink> {
    match webhook_url {
        Some(url) if !url.trim().is_empty() => std::sync::Arc::new(SlackAlertSink::new(url)),
        _ => std::sync::Arc::new(NoopAlertSink),
    }
}
