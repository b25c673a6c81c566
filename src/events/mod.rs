pub mod dispatcher;
pub mod sinks;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PAYMENT_VERIFIED_TOPIC: &str = "payment.verified";

/// Emitted once per committed verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentVerifiedEvent {
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub plan_id: Uuid,
    pub gateway_payment_id: String,
    pub end_date: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// Fire-and-forget outbound messaging. Callers treat errors as loggable only.
#[automock]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()>;
}
