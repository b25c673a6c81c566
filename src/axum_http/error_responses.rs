use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::usecases::errors::PaymentError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::Payment(err) => {
                let status = err.status_code();
                let message = match &err {
                    // Don't leak internal error detail to client
                    PaymentError::Internal(_) => "Internal server error".to_string(),
                    PaymentError::PaymentProcessingFailed(_) => {
                        "Payment processing is temporarily unavailable".to_string()
                    }
                    other => other.to_string(),
                };

                if status.is_server_error() {
                    error!(code = err.code(), error = ?err, "payments http: request failed");
                }

                (status, err.code(), message)
            }
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            error,
            message,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_detail() {
        let response =
            AppError::from(PaymentError::Internal(anyhow!("password=hunter2"))).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Internal server error");
        assert_eq!(body["error"], "internal_error");
    }

    #[tokio::test]
    async fn conflict_carries_stable_code() {
        let response = AppError::from(PaymentError::PaymentAlreadyCompleted).into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["code"], 409);
        assert_eq!(body["error"], "payment_already_completed");
    }
}
