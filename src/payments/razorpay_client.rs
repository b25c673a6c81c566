use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::config::config_model::Razorpay;

/// Minimal Razorpay client built on reqwest.
pub struct RazorpayClient {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub receipt: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorEnvelope {
    error: RazorpayErrorDetails,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetails {
    code: Option<String>,
    description: Option<String>,
    source: Option<String>,
    step: Option<String>,
    reason: Option<String>,
    field: Option<String>,
}

/// Out-of-band notification body. Only the fields the service reads are modelled.
#[derive(Debug, Deserialize)]
pub struct RazorpayWebhookEvent {
    pub event: String,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub payload: RazorpayWebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct RazorpayWebhookPayload {
    pub payment: Option<RazorpayEntityWrapper<RazorpayPaymentEntity>>,
    pub order: Option<RazorpayEntityWrapper<RazorpayOrderEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayEntityWrapper<T> {
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayPaymentEntity {
    pub id: String,
    pub order_id: Option<String>,
    pub status: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayOrderEntity {
    pub id: String,
    pub status: Option<String>,
}

impl RazorpayWebhookEvent {
    /// Order and payment ids of a capture notification, if the event carries both.
    pub fn captured_payment(&self) -> Option<(String, String)> {
        let payment = self.payload.payment.as_ref()?;
        let order_id = payment
            .entity
            .order_id
            .clone()
            .or_else(|| self.payload.order.as_ref().map(|o| o.entity.id.clone()))?;

        Some((order_id, payment.entity.id.clone()))
    }
}

impl RazorpayClient {
    pub fn new(config: &Razorpay) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build razorpay http client")?;

        Ok(Self {
            http,
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let details = serde_json::from_str::<RazorpayErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);

        error!(
            status = %status,
            razorpay_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
            razorpay_error_description = ?details.as_ref().and_then(|d| d.description.as_deref()),
            razorpay_error_source = ?details.as_ref().and_then(|d| d.source.as_deref()),
            razorpay_error_step = ?details.as_ref().and_then(|d| d.step.as_deref()),
            razorpay_error_reason = ?details.as_ref().and_then(|d| d.reason.as_deref()),
            razorpay_error_field = ?details.as_ref().and_then(|d| d.field.as_deref()),
            context = %context,
            "razorpay api request failed"
        );

        anyhow::bail!("Razorpay API request failed: {} (status {})", context, status);
    }

    /// Creates an order. https://razorpay.com/docs/api/orders/create/
    pub async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<RazorpayOrder> {
        let body = CreateOrderBody {
            amount: amount_minor,
            currency,
            receipt,
            payment_capture: 1,
        };

        let resp = self
            .http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create order").await?;

        let order: RazorpayOrder = resp.json().await?;
        Ok(order)
    }

    pub fn parse_webhook_event(payload: &[u8]) -> Result<RazorpayWebhookEvent> {
        serde_json::from_slice(payload).context("invalid razorpay webhook payload")
    }
}
