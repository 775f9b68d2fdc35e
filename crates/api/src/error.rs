//! API error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use paysync_billing::{BillingError, WebhookError};
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Webhook delivery failed authentication or decoding
    #[error("Webhook Error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Billing not configured")]
    BillingUnavailable,

    /// Outbound operation failed. The message names the operation only;
    /// processor and store detail is logged where the failure happens.
    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    /// Map an outbound billing failure. Bad input stays a client error,
    /// everything else becomes an opaque 500 naming the operation.
    pub fn billing(operation: &'static str, err: BillingError) -> Self {
        match err {
            BillingError::InvalidInput(msg) => ApiError::Validation(msg),
            other => {
                tracing::error!(error = %other, operation = operation, "Outbound operation failed");
                ApiError::Internal(operation)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Webhook(err) => (
                StatusCode::BAD_REQUEST,
                format!("Webhook Error: {}", err),
            )
                .into_response(),
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "validation", "message": msg})),
            )
                .into_response(),
            ApiError::BillingUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "unavailable", "message": "Billing not configured"})),
            )
                .into_response(),
            ApiError::Internal(operation) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal", "message": operation})),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripe_failures_are_opaque() {
        let err = ApiError::billing(
            "Failed to create payment intent",
            BillingError::StripeApi("card_declined: secret detail".to_string()),
        );
        assert!(matches!(err, ApiError::Internal("Failed to create payment intent")));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn invalid_input_is_a_client_error() {
        let err = ApiError::billing(
            "Failed to create refund",
            BillingError::InvalidInput("Unsupported refund reason: x".to_string()),
        );
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn webhook_errors_are_bad_requests() {
        let err = ApiError::from(WebhookError::Authentication("Missing signature header".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
