use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment signature is invalid")]
    SignatureInvalid,
    #[error("payment not found")]
    PaymentNotFound,
    #[error("payment already completed")]
    PaymentAlreadyCompleted,
    #[error("payment expired")]
    PaymentExpired,
    #[error("plan not found")]
    PlanNotFound,
    #[error("plan is not active")]
    PlanNotActive,
    #[error("invalid webhook payload: {0}")]
    InvalidWebhook(String),
    #[error("payment processing failed: {0}")]
    PaymentProcessingFailed(anyhow::Error),
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::SignatureInvalid => StatusCode::UNAUTHORIZED,
            PaymentError::PaymentNotFound | PaymentError::PlanNotFound => StatusCode::NOT_FOUND,
            PaymentError::PaymentAlreadyCompleted => StatusCode::CONFLICT,
            PaymentError::PaymentExpired => StatusCode::GONE,
            PaymentError::PlanNotActive => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentError::InvalidWebhook(_) => StatusCode::BAD_REQUEST,
            PaymentError::PaymentProcessingFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::SignatureInvalid => "signature_invalid",
            PaymentError::PaymentNotFound => "payment_not_found",
            PaymentError::PaymentAlreadyCompleted => "payment_already_completed",
            PaymentError::PaymentExpired => "payment_expired",
            PaymentError::PlanNotFound => "plan_not_found",
            PaymentError::PlanNotActive => "plan_not_active",
            PaymentError::InvalidWebhook(_) => "invalid_webhook",
            PaymentError::PaymentProcessingFailed(_) => "payment_processing_failed",
            PaymentError::Cancelled => "cancelled",
            PaymentError::Internal(_) => "internal_error",
        }
    }

    /// Only transient gateway or verifier trouble is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::PaymentProcessingFailed(_))
    }
}

pub type UseCaseResult<T> = std::result::Result<T, PaymentError>;
