use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    axum_http::error_responses::AppError,
    domain::value_objects::payments::{
        CreatePaymentOrderRequest, PaymentLookup, VerifyPaymentRequest,
    },
    usecases::{errors::PaymentError, payments::PaymentService},
};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

pub fn routes(service: Arc<dyn PaymentService>) -> Router {
    Router::new()
        .route("/plans", get(list_plans))
        .route("/orders", post(create_order))
        .route("/orders/:gateway_order_id", get(get_order))
        .route("/verify", post(verify_payment))
        .route("/webhook", post(gateway_webhook))
        .route("/subscriptions/:user_id/current", get(current_subscription))
        .with_state(service)
}

pub async fn list_plans(State(service): State<Arc<dyn PaymentService>>) -> Response {
    match service.list_plans().await {
        Ok(plans) => (StatusCode::OK, Json(plans)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn create_order(
    State(service): State<Arc<dyn PaymentService>>,
    Json(request): Json<CreatePaymentOrderRequest>,
) -> Response {
    info!(
        user_id = %request.user_id,
        plan_id = %request.plan_id,
        "payments http: create order received"
    );
    match service.create_payment_order(request).await {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn verify_payment(
    State(service): State<Arc<dyn PaymentService>>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Response {
    info!(
        gateway_order_id = %request.gateway_order_id,
        "payments http: verify received"
    );
    match service.verify_payment(request).await {
        Ok(subscription) => (StatusCode::OK, Json(subscription)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

/// Signature covers the raw body, so it is read as bytes rather than `Json`.
pub async fn gateway_webhook(
    State(service): State<Arc<dyn PaymentService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
    else {
        warn!("payments http: webhook without signature header");
        return AppError::from(PaymentError::SignatureInvalid).into_response();
    };

    match service.handle_gateway_webhook(body.to_vec(), signature).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn current_subscription(
    State(service): State<Arc<dyn PaymentService>>,
    Path(user_id): Path<Uuid>,
) -> Response {
    match service.get_current_subscription(user_id).await {
        Ok(Some(subscription)) => (StatusCode::OK, Json(subscription)).into_response(),
        Ok(None) => AppError::NotFound("subscription").into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn get_order(
    State(service): State<Arc<dyn PaymentService>>,
    Path(gateway_order_id): Path<String>,
) -> Response {
    match service
        .get_payment(PaymentLookup::GatewayOrderId(gateway_order_id))
        .await
    {
        Ok(Some(payment)) => (StatusCode::OK, Json(payment)).into_response(),
        Ok(None) => AppError::NotFound("payment").into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}
