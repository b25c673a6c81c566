use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::json;
use tracing::info;
use url::Url;

use super::dispatcher::OutboundEvent;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &OutboundEvent) -> Result<()>;
    fn sink_name(&self) -> &'static str;
}

/// Posts `{topic, payload, queued_at}` as JSON to a downstream URL.
pub struct WebhookEventSink {
    url: Url,
    client: Client,
}

impl WebhookEventSink {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build events http client")?;

        Ok(Self { url, client })
    }
}

#[async_trait]
impl EventSink for WebhookEventSink {
    async fn deliver(&self, event: &OutboundEvent) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({
                "topic": event.topic,
                "payload": event.payload,
                "queued_at": event.queued_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            }))
            .send()
            .await
            .map_err(sanitize_reqwest_error)?;

        if response.status().is_success() {
            return Ok(());
        }

        Err(anyhow!(
            "events webhook returned non-success status: {}",
            response.status()
        ))
    }

    fn sink_name(&self) -> &'static str {
        "webhook"
    }
}

/// Used when no downstream URL is configured.
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn deliver(&self, event: &OutboundEvent) -> Result<()> {
        info!(
            topic = %event.topic,
            payload = %event.payload,
            "events: published"
        );
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "log"
    }
}

// The URL may embed a token; keep it out of error text.
fn sanitize_reqwest_error(error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("events webhook request timed out");
    }
    if error.is_connect() {
        return anyhow!("events webhook connection failed");
    }
    anyhow!("events webhook request failed")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn log_sink_always_accepts() {
        let event = OutboundEvent {
            topic: "payment.verified".to_string(),
            payload: json!({ "plan_id": "p" }),
            queued_at: Utc::now(),
        };

        assert!(LogEventSink.deliver(&event).await.is_ok());
        assert_eq!(LogEventSink.sink_name(), "log");
    }

    #[tokio::test]
    async fn unreachable_webhook_error_hides_url() {
        let url = Url::parse("http://127.0.0.1:9/hook?token=secret").unwrap();
        let sink = WebhookEventSink::new(url, Duration::from_millis(200)).unwrap();
        let event = OutboundEvent {
            topic: "t".to_string(),
            payload: json!({}),
            queued_at: Utc::now(),
        };

        let err = sink.deliver(&event).await.unwrap_err();

        assert!(!err.to_string().contains("secret"));
    }
}
