#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use subscription_payments::{
    domain::{
        entities::{
            payments::{InsertPaymentEntity, PaymentEntity},
            plans::PlanEntity,
            subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
        },
        repositories::{payments::PaymentRepository, subscriptions::SubscriptionRepository},
        value_objects::{
            enums::{payment_statuses::PaymentStatus, subscription_statuses::SubscriptionStatus},
            payments::VerifyPaymentRequest,
        },
    },
    events::EventPublisher,
    infra::memory::{MemoryTables, MemoryUnitOfWork, PaymentMemory, PlanMemory, SubscriptionMemory},
    payments::signature::{GatewaySignatureVerifier, sign_payment},
    usecases::payments::{MockPaymentGateway, PaymentGateway, PaymentSettings, PaymentUseCase},
};
use uuid::Uuid;

pub const KEY_SECRET: &str = "rzp_test_key_secret";
pub const WEBHOOK_SECRET: &str = "rzp_test_webhook_secret";

pub type TestUseCase<S, G, E> = PaymentUseCase<
    MemoryUnitOfWork,
    PaymentMemory,
    S,
    PlanMemory,
    G,
    GatewaySignatureVerifier,
    E,
>;

pub fn monthly_plan() -> PlanEntity {
    let now = Utc::now();
    PlanEntity {
        id: Uuid::new_v4(),
        name: "Monthly".to_string(),
        price_minor: 49900,
        currency: "INR".to_string(),
        duration_days: 30,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn settings() -> PaymentSettings {
    PaymentSettings {
        gateway_key_id: "rzp_test_key".to_string(),
        order_ttl: Duration::minutes(30),
        gateway_timeout: std::time::Duration::from_millis(200),
        display_offset: FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap(),
    }
}

/// Gateway that hands out `ord_1`, `ord_2`, ... in call order.
pub fn sequential_gateway() -> MockPaymentGateway {
    let mut gateway = MockPaymentGateway::new();
    let mut issued = 0;
    gateway.expect_create_order().returning(move |_, _, _| {
        issued += 1;
        Ok(format!("ord_{issued}"))
    });
    gateway
}

pub fn build_usecase<S, G, E>(
    uow: &MemoryUnitOfWork,
    subscriptions: S,
    gateway: G,
    publisher: Arc<E>,
) -> TestUseCase<S, G, E>
where
    S: SubscriptionRepository<MemoryTables>,
    G: PaymentGateway + 'static,
    E: EventPublisher + 'static,
{
    PaymentUseCase::new(
        Arc::new(uow.clone()),
        Arc::new(PaymentMemory),
        Arc::new(subscriptions),
        Arc::new(PlanMemory),
        Arc::new(gateway),
        Arc::new(GatewaySignatureVerifier::new(
            KEY_SECRET.to_string(),
            WEBHOOK_SECRET.to_string(),
        )),
        publisher,
        settings(),
    )
}

pub fn signed_request(gateway_order_id: &str, gateway_payment_id: &str) -> VerifyPaymentRequest {
    VerifyPaymentRequest {
        gateway_order_id: gateway_order_id.to_string(),
        gateway_payment_id: gateway_payment_id.to_string(),
        signature: sign_payment(KEY_SECRET, gateway_order_id, gateway_payment_id).unwrap(),
    }
}

pub fn seed_pending_payment(
    uow: &MemoryUnitOfWork,
    user_id: Uuid,
    plan: &PlanEntity,
    gateway_order_id: &str,
    expires_at: DateTime<Utc>,
) -> PaymentEntity {
    uow.update(|tables| {
        PaymentMemory.insert(
            tables,
            InsertPaymentEntity {
                user_id,
                plan_id: plan.id,
                gateway_order_id: gateway_order_id.to_string(),
                amount_minor: plan.price_minor,
                currency: plan.currency.clone(),
                status: PaymentStatus::Pending.to_string(),
                expires_at,
            },
        )
    })
    .unwrap()
}

pub fn seed_active_subscription(uow: &MemoryUnitOfWork, user_id: Uuid, plan: &PlanEntity) -> Uuid {
    let now = Utc::now();
    uow.update(|tables| {
        SubscriptionMemory.insert(
            tables,
            InsertSubscriptionEntity {
                user_id,
                plan_id: plan.id,
                payment_id: None,
                starts_at: now - Duration::days(5),
                ends_at: now + Duration::days(25),
                status: SubscriptionStatus::Active.to_string(),
            },
        )
    })
    .unwrap()
}

pub fn active_count(uow: &MemoryUnitOfWork, user_id: Uuid) -> usize {
    uow.snapshot().active_subscriptions_for(user_id).len()
}

/// Collects published events; optionally refuses them all.
#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<(String, serde_json::Value)>>,
    pub fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        if self.fail {
            return Err(anyhow!("broker unavailable"));
        }
        self.events
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }
}

/// Gateway that never answers within the configured timeout.
pub struct StalledGateway;

#[async_trait]
impl PaymentGateway for StalledGateway {
    async fn create_order(&self, _: i64, _: &str, _: &str) -> Result<String> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        Ok("ord_late".to_string())
    }
}

/// Subscription store whose insert always fails, for rollback checks.
pub struct FailingSubscriptionStore;

impl SubscriptionRepository<MemoryTables> for FailingSubscriptionStore {
    fn lock_user_subscriptions(&self, conn: &mut MemoryTables, user_id: Uuid) -> Result<()> {
        SubscriptionMemory.lock_user_subscriptions(conn, user_id)
    }

    fn find_current_active_subscription(
        &self,
        conn: &mut MemoryTables,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>> {
        SubscriptionMemory.find_current_active_subscription(conn, user_id)
    }

    fn insert(&self, _conn: &mut MemoryTables, _subscription: InsertSubscriptionEntity) -> Result<Uuid> {
        bail!("injected subscription insert failure")
    }

    fn update_status(
        &self,
        conn: &mut MemoryTables,
        subscription_id: Uuid,
        status: SubscriptionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        SubscriptionMemory.update_status(conn, subscription_id, status, updated_at)
    }

    fn expire_ended_before(&self, conn: &mut MemoryTables, now: DateTime<Utc>) -> Result<usize> {
        SubscriptionMemory.expire_ended_before(conn, now)
    }
}
