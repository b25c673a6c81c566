use std::sync::Arc;

use anyhow::{Result as AnyResult, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use mockall::automock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            payments::{InsertPaymentEntity, PaymentCompletion},
            subscriptions::InsertSubscriptionEntity,
        },
        repositories::{
            payments::PaymentRepository, plans::PlanRepository,
            subscriptions::SubscriptionRepository, unit_of_work::UnitOfWork,
        },
        value_objects::{
            enums::{payment_statuses::PaymentStatus, subscription_statuses::SubscriptionStatus},
            payments::{
                CreatePaymentOrderRequest, CurrentSubscriptionDto, PaymentDto, PaymentLookup,
                PaymentOrderDto, PlanDto, VerifiedPayment, VerifiedSubscriptionDto,
                VerifyPaymentRequest, WebhookOutcome, to_display,
            },
        },
    },
    events::{EventPublisher, PAYMENT_VERIFIED_TOPIC, PaymentVerifiedEvent},
    payments::{
        razorpay_client::RazorpayClient,
        signature::{SignatureError, SignatureVerifier},
    },
};

use super::{
    errors::{PaymentError, UseCaseResult},
    unit_of_work::{run_on_connection, run_transaction},
};

const CAPTURE_EVENTS: [&str; 2] = ["payment.captured", "order.paid"];

#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Mints a gateway order and returns its id.
    async fn create_order(&self, amount_minor: i64, currency: &str, receipt: &str)
    -> AnyResult<String>;
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> AnyResult<String> {
        let order = RazorpayClient::create_order(self, amount_minor, currency, receipt).await?;
        Ok(order.id)
    }
}

/// Operations exposed to the HTTP layer and the sweeper.
#[automock]
#[async_trait]
pub trait PaymentService: Send + Sync {
    async fn create_payment_order(
        &self,
        request: CreatePaymentOrderRequest,
    ) -> UseCaseResult<PaymentOrderDto>;

    async fn verify_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> UseCaseResult<VerifiedSubscriptionDto>;

    async fn handle_gateway_webhook(
        &self,
        payload: Vec<u8>,
        signature: String,
    ) -> UseCaseResult<WebhookOutcome>;

    async fn list_plans(&self) -> UseCaseResult<Vec<PlanDto>>;

    async fn get_current_subscription(
        &self,
        user_id: Uuid,
    ) -> UseCaseResult<Option<CurrentSubscriptionDto>>;

    async fn get_payment(&self, lookup: PaymentLookup) -> UseCaseResult<Option<PaymentDto>>;

    async fn expire_stale_payments(&self, now: DateTime<Utc>) -> UseCaseResult<usize>;

    async fn expire_lapsed_subscriptions(&self, now: DateTime<Utc>) -> UseCaseResult<usize>;
}

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// Public key id handed to the checkout widget.
    pub gateway_key_id: String,
    pub order_ttl: Duration,
    pub gateway_timeout: std::time::Duration,
    pub display_offset: FixedOffset,
}

pub struct PaymentUseCase<U, Pay, Sub, Pl, G, V, E>
where
    U: UnitOfWork,
    Pay: PaymentRepository<U::Conn>,
    Sub: SubscriptionRepository<U::Conn>,
    Pl: PlanRepository<U::Conn>,
    G: PaymentGateway + 'static,
    V: SignatureVerifier,
    E: EventPublisher + 'static,
{
    uow: Arc<U>,
    payment_repo: Arc<Pay>,
    subscription_repo: Arc<Sub>,
    plan_repo: Arc<Pl>,
    gateway: Arc<G>,
    verifier: Arc<V>,
    publisher: Arc<E>,
    settings: PaymentSettings,
}

impl<U, Pay, Sub, Pl, G, V, E> PaymentUseCase<U, Pay, Sub, Pl, G, V, E>
where
    U: UnitOfWork,
    Pay: PaymentRepository<U::Conn>,
    Sub: SubscriptionRepository<U::Conn>,
    Pl: PlanRepository<U::Conn>,
    G: PaymentGateway + 'static,
    V: SignatureVerifier,
    E: EventPublisher + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        uow: Arc<U>,
        payment_repo: Arc<Pay>,
        subscription_repo: Arc<Sub>,
        plan_repo: Arc<Pl>,
        gateway: Arc<G>,
        verifier: Arc<V>,
        publisher: Arc<E>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            uow,
            payment_repo,
            subscription_repo,
            plan_repo,
            gateway,
            verifier,
            publisher,
            settings,
        }
    }

    pub async fn create_payment_order(
        &self,
        request: CreatePaymentOrderRequest,
    ) -> UseCaseResult<PaymentOrderDto> {
        let CreatePaymentOrderRequest { user_id, plan_id } = request;
        info!(%user_id, %plan_id, "payments: creating order");

        let plan_repo = Arc::clone(&self.plan_repo);
        let plan = run_on_connection(Arc::clone(&self.uow), move |conn| {
            plan_repo.find_by_id(conn, plan_id).map_err(|err| {
                error!(%plan_id, db_error = ?err, "payments: failed to load plan");
                PaymentError::Internal(err)
            })
        })
        .await?
        .ok_or_else(|| {
            warn!(%plan_id, "payments: plan not found");
            PaymentError::PlanNotFound
        })?;

        if !plan.is_active {
            warn!(%plan_id, "payments: plan is not active");
            return Err(PaymentError::PlanNotActive);
        }

        // Fresh per call so unrelated purchases never collide on gateway idempotency.
        let receipt = Uuid::new_v4().to_string();
        let gateway_call = self.gateway.create_order(
            i64::from(plan.price_minor),
            &plan.currency,
            &receipt,
        );

        let gateway_order_id =
            match tokio::time::timeout(self.settings.gateway_timeout, gateway_call).await {
                Ok(Ok(order_id)) => order_id,
                Ok(Err(err)) => {
                    error!(%user_id, %plan_id, gateway_error = ?err, "payments: gateway rejected order");
                    return Err(PaymentError::PaymentProcessingFailed(err));
                }
                Err(_) => {
                    error!(
                        %user_id,
                        %plan_id,
                        timeout_ms = self.settings.gateway_timeout.as_millis() as u64,
                        "payments: gateway order creation timed out"
                    );
                    return Err(PaymentError::PaymentProcessingFailed(anyhow!(
                        "gateway order creation timed out"
                    )));
                }
            };

        let insert = InsertPaymentEntity {
            user_id,
            plan_id: plan.id,
            gateway_order_id,
            amount_minor: plan.price_minor,
            currency: plan.currency.clone(),
            status: PaymentStatus::Pending.to_string(),
            expires_at: Utc::now() + self.settings.order_ttl,
        };

        let payment_repo = Arc::clone(&self.payment_repo);
        let payment = run_on_connection(Arc::clone(&self.uow), move |conn| {
            payment_repo.insert(conn, insert).map_err(|err| {
                error!(%user_id, db_error = ?err, "payments: failed to persist order");
                PaymentError::Internal(err)
            })
        })
        .await?;

        info!(
            %user_id,
            payment_id = %payment.id,
            gateway_order_id = %payment.gateway_order_id,
            "payments: order created"
        );

        Ok(PaymentOrderDto {
            payment_id: payment.id,
            gateway_order_id: payment.gateway_order_id,
            gateway_key_id: self.settings.gateway_key_id.clone(),
            amount_minor: payment.amount_minor,
            currency: payment.currency,
            plan_id: payment.plan_id,
            expires_at: to_display(payment.expires_at, &self.settings.display_offset),
        })
    }

    pub async fn verify_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> UseCaseResult<VerifiedSubscriptionDto> {
        let VerifyPaymentRequest {
            gateway_order_id,
            gateway_payment_id,
            signature,
        } = request;
        info!(%gateway_order_id, %gateway_payment_id, "payments: verifying payment");

        self.verifier
            .verify_payment(&gateway_order_id, &gateway_payment_id, &signature)
            .map_err(|err| map_signature_error(err, &gateway_order_id))?;

        let verified = self
            .complete_payment(PaymentCompletion {
                gateway_order_id,
                gateway_payment_id,
                gateway_signature: signature,
            })
            .await?;

        self.publish_verified(&verified).await;

        Ok(verified.to_dto(&self.settings.display_offset))
    }

    pub async fn handle_gateway_webhook(
        &self,
        payload: Vec<u8>,
        signature: String,
    ) -> UseCaseResult<WebhookOutcome> {
        self.verifier
            .verify_webhook(&payload, &signature)
            .map_err(|err| map_signature_error(err, "webhook"))?;

        match self.process_webhook(&payload, signature).await {
            Ok(outcome) => Ok(outcome),
            Err(PaymentError::PaymentAlreadyCompleted) => {
                info!("payments: webhook for already completed payment");
                Ok(WebhookOutcome::AlreadyProcessed)
            }
            Err(
                err @ (PaymentError::InvalidWebhook(_)
                | PaymentError::PaymentNotFound
                | PaymentError::PaymentExpired
                | PaymentError::PlanNotFound),
            ) => {
                warn!(code = err.code(), error = %err, "payments: acknowledging unprocessable webhook");
                Ok(WebhookOutcome::Rejected { code: err.code() })
            }
            Err(err) => Err(err),
        }
    }

    async fn process_webhook(
        &self,
        payload: &[u8],
        signature: String,
    ) -> UseCaseResult<WebhookOutcome> {
        let event = RazorpayClient::parse_webhook_event(payload).map_err(|err| {
            warn!(error = %err, "payments: unreadable webhook payload");
            PaymentError::InvalidWebhook(err.to_string())
        })?;

        if !CAPTURE_EVENTS.contains(&event.event.as_str()) {
            info!(event = %event.event, "payments: ignoring webhook event");
            return Ok(WebhookOutcome::Ignored { event: event.event });
        }

        let (gateway_order_id, gateway_payment_id) =
            event.captured_payment().ok_or_else(|| {
                warn!(event = %event.event, "payments: capture webhook without order or payment id");
                PaymentError::InvalidWebhook("missing order or payment id".to_string())
            })?;
        info!(
            event = %event.event,
            %gateway_order_id,
            %gateway_payment_id,
            "payments: processing capture webhook"
        );

        let completion = PaymentCompletion {
            gateway_order_id,
            gateway_payment_id,
            gateway_signature: signature,
        };

        let verified = self.complete_payment(completion).await?;
        self.publish_verified(&verified).await;

        Ok(WebhookOutcome::Processed {
            subscription_id: verified.subscription.id,
        })
    }

    pub async fn list_plans(&self) -> UseCaseResult<Vec<PlanDto>> {
        let plan_repo = Arc::clone(&self.plan_repo);
        let plans = run_on_connection(Arc::clone(&self.uow), move |conn| {
            plan_repo.list_active_plans(conn).map_err(|err| {
                error!(db_error = ?err, "payments: failed to list active plans");
                PaymentError::Internal(err)
            })
        })
        .await?;

        info!(plan_count = plans.len(), "payments: active plans loaded");
        Ok(plans.into_iter().map(PlanDto::from).collect())
    }

    pub async fn get_current_subscription(
        &self,
        user_id: Uuid,
    ) -> UseCaseResult<Option<CurrentSubscriptionDto>> {
        let subscription_repo = Arc::clone(&self.subscription_repo);
        let plan_repo = Arc::clone(&self.plan_repo);

        let found = run_on_connection(Arc::clone(&self.uow), move |conn| {
            let Some(subscription) = subscription_repo
                .find_current_active_subscription(conn, user_id)
                .map_err(|err| {
                    error!(%user_id, db_error = ?err, "payments: failed to load current subscription");
                    PaymentError::Internal(err)
                })?
            else {
                return Ok(None);
            };

            let plan = plan_repo
                .find_by_id(conn, subscription.plan_id)?
                .ok_or_else(|| {
                    anyhow!(
                        "plan {} referenced by subscription {} is missing",
                        subscription.plan_id,
                        subscription.id
                    )
                })?;

            Ok(Some((subscription, plan)))
        })
        .await?;

        let Some((subscription, plan)) = found else {
            info!(%user_id, "payments: no active subscription");
            return Ok(None);
        };

        let offset = &self.settings.display_offset;
        Ok(Some(CurrentSubscriptionDto {
            subscription_id: subscription.id,
            plan_id: plan.id,
            plan_name: plan.name,
            status: subscription.status(),
            starts_at: to_display(subscription.starts_at, offset),
            ends_at: to_display(subscription.ends_at, offset),
        }))
    }

    pub async fn get_payment(&self, lookup: PaymentLookup) -> UseCaseResult<Option<PaymentDto>> {
        let payment_repo = Arc::clone(&self.payment_repo);
        let payment = run_on_connection(Arc::clone(&self.uow), move |conn| {
            payment_repo.find(conn, &lookup).map_err(|err| {
                error!(lookup = ?lookup, db_error = ?err, "payments: failed to load payment");
                PaymentError::Internal(err)
            })
        })
        .await?;

        Ok(payment.map(|p| PaymentDto::from_entity(p, &self.settings.display_offset)))
    }

    pub async fn expire_stale_payments(&self, now: DateTime<Utc>) -> UseCaseResult<usize> {
        let payment_repo = Arc::clone(&self.payment_repo);
        run_on_connection(Arc::clone(&self.uow), move |conn| {
            payment_repo.expire_pending_before(conn, now).map_err(|err| {
                error!(db_error = ?err, "payments: failed to expire stale payments");
                PaymentError::Internal(err)
            })
        })
        .await
    }

    pub async fn expire_lapsed_subscriptions(&self, now: DateTime<Utc>) -> UseCaseResult<usize> {
        let subscription_repo = Arc::clone(&self.subscription_repo);
        run_on_connection(Arc::clone(&self.uow), move |conn| {
            subscription_repo.expire_ended_before(conn, now).map_err(|err| {
                error!(db_error = ?err, "payments: failed to expire lapsed subscriptions");
                PaymentError::Internal(err)
            })
        })
        .await
    }

    /// Runs the locked read, the payment update and the subscription swap as one
    /// transaction.
    async fn complete_payment(&self, completion: PaymentCompletion) -> UseCaseResult<VerifiedPayment> {
        let payment_repo = Arc::clone(&self.payment_repo);
        let plan_repo = Arc::clone(&self.plan_repo);
        let subscription_repo = Arc::clone(&self.subscription_repo);
        let gateway_order_id = completion.gateway_order_id.clone();

        let result = run_transaction(Arc::clone(&self.uow), move |conn| {
            apply_verification(
                payment_repo.as_ref(),
                plan_repo.as_ref(),
                subscription_repo.as_ref(),
                conn,
                &completion,
                Utc::now(),
            )
        })
        .await;

        match &result {
            Ok(verified) => info!(
                %gateway_order_id,
                payment_id = %verified.payment_id,
                user_id = %verified.user_id,
                subscription_id = %verified.subscription.id,
                cancelled_subscription_id = ?verified.cancelled_subscription_id,
                "payments: payment verified"
            ),
            Err(err @ PaymentError::Internal(_)) => {
                error!(%gateway_order_id, error = ?err, "payments: verification rolled back")
            }
            Err(err) => {
                warn!(%gateway_order_id, code = err.code(), "payments: verification rejected")
            }
        }

        result
    }

    async fn publish_verified(&self, verified: &VerifiedPayment) {
        let event = PaymentVerifiedEvent {
            user_id: verified.user_id,
            subscription_id: verified.subscription.id,
            plan_id: verified.subscription.plan_id,
            gateway_payment_id: verified.gateway_payment_id.clone(),
            end_date: verified.subscription.ends_at,
            timestamp: Utc::now(),
        };

        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "payments: failed to encode verified event");
                return;
            }
        };

        // The transaction has committed; a lost event must not fail the caller.
        if let Err(err) = self.publisher.publish(PAYMENT_VERIFIED_TOPIC, payload).await {
            warn!(
                user_id = %verified.user_id,
                subscription_id = %verified.subscription.id,
                error = %err,
                "payments: failed to publish verified event"
            );
        }
    }
}

fn map_signature_error(err: SignatureError, context: &str) -> PaymentError {
    match err {
        SignatureError::Mismatch => {
            warn!(context = %context, "payments: signature mismatch");
            PaymentError::SignatureInvalid
        }
        SignatureError::Unavailable(err) => {
            error!(context = %context, error = ?err, "payments: signature check unavailable");
            PaymentError::PaymentProcessingFailed(err)
        }
    }
}

/// Body of the verification transaction. Every early return rolls back.
pub fn apply_verification<C, Pay, Pl, Sub>(
    payment_repo: &Pay,
    plan_repo: &Pl,
    subscription_repo: &Sub,
    conn: &mut C,
    completion: &PaymentCompletion,
    now: DateTime<Utc>,
) -> UseCaseResult<VerifiedPayment>
where
    Pay: PaymentRepository<C> + ?Sized,
    Pl: PlanRepository<C> + ?Sized,
    Sub: SubscriptionRepository<C> + ?Sized,
{
    let payment = payment_repo
        .find_by_gateway_order_id_for_update(conn, &completion.gateway_order_id)?
        .ok_or(PaymentError::PaymentNotFound)?;

    match payment.status() {
        PaymentStatus::Completed => return Err(PaymentError::PaymentAlreadyCompleted),
        PaymentStatus::Expired => return Err(PaymentError::PaymentExpired),
        PaymentStatus::Pending => {}
    }

    if payment.is_expired_at(now) {
        return Err(PaymentError::PaymentExpired);
    }

    // Honoured even if deactivated since the order was created.
    let plan = plan_repo
        .find_by_id(conn, payment.plan_id)?
        .ok_or(PaymentError::PlanNotFound)?;

    if !payment_repo.mark_completed(conn, payment.id, completion, now)? {
        return Err(PaymentError::PaymentAlreadyCompleted);
    }

    subscription_repo.lock_user_subscriptions(conn, payment.user_id)?;

    let cancelled_subscription_id =
        match subscription_repo.find_current_active_subscription(conn, payment.user_id)? {
            Some(existing) => subscription_repo
                .update_status(conn, existing.id, SubscriptionStatus::Cancelled, now)?
                .then_some(existing.id),
            None => None,
        };

    let subscription_id = subscription_repo.insert(
        conn,
        InsertSubscriptionEntity {
            user_id: payment.user_id,
            plan_id: plan.id,
            payment_id: Some(payment.id),
            starts_at: now,
            ends_at: now + Duration::days(i64::from(plan.duration_days)),
            status: SubscriptionStatus::Active.to_string(),
        },
    )?;

    let subscription = subscription_repo
        .find_current_active_subscription(conn, payment.user_id)?
        .filter(|s| s.id == subscription_id)
        .ok_or_else(|| anyhow!("subscription {subscription_id} not visible after insert"))?;

    Ok(VerifiedPayment {
        payment_id: payment.id,
        user_id: payment.user_id,
        gateway_payment_id: completion.gateway_payment_id.clone(),
        subscription,
        cancelled_subscription_id,
    })
}

#[async_trait]
impl<U, Pay, Sub, Pl, G, V, E> PaymentService for PaymentUseCase<U, Pay, Sub, Pl, G, V, E>
where
    U: UnitOfWork,
    Pay: PaymentRepository<U::Conn>,
    Sub: SubscriptionRepository<U::Conn>,
    Pl: PlanRepository<U::Conn>,
    G: PaymentGateway + 'static,
    V: SignatureVerifier,
    E: EventPublisher + 'static,
{
    async fn create_payment_order(
        &self,
        request: CreatePaymentOrderRequest,
    ) -> UseCaseResult<PaymentOrderDto> {
        PaymentUseCase::create_payment_order(self, request).await
    }

    async fn verify_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> UseCaseResult<VerifiedSubscriptionDto> {
        PaymentUseCase::verify_payment(self, request).await
    }

    async fn handle_gateway_webhook(
        &self,
        payload: Vec<u8>,
        signature: String,
    ) -> UseCaseResult<WebhookOutcome> {
        PaymentUseCase::handle_gateway_webhook(self, payload, signature).await
    }

    async fn list_plans(&self) -> UseCaseResult<Vec<PlanDto>> {
        PaymentUseCase::list_plans(self).await
    }

    async fn get_current_subscription(
        &self,
        user_id: Uuid,
    ) -> UseCaseResult<Option<CurrentSubscriptionDto>> {
        PaymentUseCase::get_current_subscription(self, user_id).await
    }

    async fn get_payment(&self, lookup: PaymentLookup) -> UseCaseResult<Option<PaymentDto>> {
        PaymentUseCase::get_payment(self, lookup).await
    }

    async fn expire_stale_payments(&self, now: DateTime<Utc>) -> UseCaseResult<usize> {
        PaymentUseCase::expire_stale_payments(self, now).await
    }

    async fn expire_lapsed_subscriptions(&self, now: DateTime<Utc>) -> UseCaseResult<usize> {
        PaymentUseCase::expire_lapsed_subscriptions(self, now).await
    }
}
