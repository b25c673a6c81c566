use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::{
    payments::PaymentEntity, plans::PlanEntity, subscriptions::SubscriptionEntity,
};
use crate::domain::value_objects::enums::{
    payment_statuses::PaymentStatus, subscription_statuses::SubscriptionStatus,
};

/// Keys a payment may be looked up by. Closed on purpose: callers never pass column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentLookup {
    Id(Uuid),
    GatewayOrderId(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentOrderRequest {
    pub user_id: Uuid,
    pub plan_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentOrderDto {
    pub payment_id: Uuid,
    pub gateway_order_id: String,
    pub gateway_key_id: String,
    pub amount_minor: i32,
    pub currency: String,
    pub plan_id: Uuid,
    pub expires_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedSubscriptionDto {
    pub subscription_id: Uuid,
    pub plan_id: Uuid,
    pub start_date: DateTime<FixedOffset>,
    pub end_date: DateTime<FixedOffset>,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentSubscriptionDto {
    pub subscription_id: Uuid,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub status: SubscriptionStatus,
    pub starts_at: DateTime<FixedOffset>,
    pub ends_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanDto {
    pub id: Uuid,
    pub name: String,
    pub price_minor: i32,
    pub currency: String,
    pub duration_days: i32,
}

impl From<PlanEntity> for PlanDto {
    fn from(value: PlanEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            price_minor: value.price_minor,
            currency: value.currency,
            duration_days: value.duration_days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub amount_minor: i32,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<FixedOffset>,
    pub expires_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

impl PaymentDto {
    pub fn from_entity(value: PaymentEntity, offset: &FixedOffset) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            plan_id: value.plan_id,
            status: value.status(),
            gateway_order_id: value.gateway_order_id,
            gateway_payment_id: value.gateway_payment_id,
            amount_minor: value.amount_minor,
            currency: value.currency,
            created_at: value.created_at.with_timezone(offset),
            expires_at: value.expires_at.with_timezone(offset),
            updated_at: value.updated_at.with_timezone(offset),
        }
    }
}

/// Result of one committed verification, still in UTC.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPayment {
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub gateway_payment_id: String,
    pub subscription: SubscriptionEntity,
    pub cancelled_subscription_id: Option<Uuid>,
}

impl VerifiedPayment {
    pub fn to_dto(&self, offset: &FixedOffset) -> VerifiedSubscriptionDto {
        VerifiedSubscriptionDto {
            subscription_id: self.subscription.id,
            plan_id: self.subscription.plan_id,
            start_date: self.subscription.starts_at.with_timezone(offset),
            end_date: self.subscription.ends_at.with_timezone(offset),
            status: self.subscription.status(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed { subscription_id: Uuid },
    AlreadyProcessed,
    Ignored { event: String },
    /// Signed but permanently unprocessable; acknowledged so it is not redelivered.
    Rejected { code: &'static str },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_payments: usize,
    pub expired_subscriptions: usize,
}

/// Timestamp helper shared by the DTO builders.
pub fn to_display(ts: DateTime<Utc>, offset: &FixedOffset) -> DateTime<FixedOffset> {
    ts.with_timezone(offset)
}
