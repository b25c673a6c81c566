use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;

use super::EventPublisher;
use super::sinks::EventSink;

#[derive(Clone, Debug, PartialEq)]
pub struct OutboundEvent {
    pub topic: String,
    pub payload: serde_json::Value,
    pub queued_at: DateTime<Utc>,
}

/// Bounded in-process queue in front of the configured sinks.
///
/// `publish` never waits on a sink: it enqueues or fails immediately.
#[derive(Clone)]
pub struct EventDispatcher {
    tx: mpsc::Sender<OutboundEvent>,
}

impl EventDispatcher {
    /// Spawns the delivery task. Must be called inside a tokio runtime.
    pub fn new(sinks: Vec<Arc<dyn EventSink>>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<OutboundEvent>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for sink in &sinks {
                    if let Err(error) = sink.deliver(&event).await {
                        warn!(
                            sink = sink.sink_name(),
                            topic = %event.topic,
                            error = %error,
                            "events: sink delivery failed"
                        );
                    }
                }
            }
        });

        Self { tx }
    }
}

#[async_trait]
impl EventPublisher for EventDispatcher {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        let event = OutboundEvent {
            topic: topic.to_string(),
            payload,
            queued_at: Utc::now(),
        };

        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(anyhow!("event queue full; dropping {topic}"))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(anyhow!("event queue closed; dropping {topic}"))
            }
        }
    }
}
