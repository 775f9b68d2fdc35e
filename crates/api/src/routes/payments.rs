//! Outbound billing routes
//!
//! Thin wrappers over the billing services. Each maps a failure to an
//! opaque 500 naming the operation.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use paysync_billing::{
    BillingService, CreateCustomerRequest, CreatePaymentIntentRequest, CustomerCreated,
    InvoiceSent, PaymentIntentCreated, PaymentStatusView, RefundIssued, RefundRequest,
    SendInvoiceRequest,
};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

fn billing(state: &AppState) -> ApiResult<&Arc<BillingService>> {
    state.billing_service().ok_or(ApiError::BillingUnavailable)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

/// POST /api/v1/payment-intents
pub async fn create_payment_intent(
    State(state): State<AppState>,
    payload: Result<Json<CreatePaymentIntentRequest>, JsonRejection>,
) -> ApiResult<Json<PaymentIntentCreated>> {
    let request = body(payload)?;
    let created = billing(&state)?
        .payments
        .create_payment_intent(request)
        .await
        .map_err(|e| ApiError::billing("Failed to create payment intent", e))?;

    Ok(Json(created))
}

/// GET /api/v1/payment-intents/{id}/status
pub async fn get_payment_status(
    State(state): State<AppState>,
    Path(payment_intent_id): Path<String>,
) -> ApiResult<Json<PaymentStatusView>> {
    let status = billing(&state)?
        .payments
        .get_payment_status(&payment_intent_id)
        .await
        .map_err(|e| ApiError::billing("Failed to get payment status", e))?;

    Ok(Json(status))
}

/// POST /api/v1/customers
pub async fn create_customer(
    State(state): State<AppState>,
    payload: Result<Json<CreateCustomerRequest>, JsonRejection>,
) -> ApiResult<Json<CustomerCreated>> {
    let request = body(payload)?;
    let customer = billing(&state)?
        .customers
        .create_customer(request)
        .await
        .map_err(|e| ApiError::billing("Failed to create customer", e))?;

    Ok(Json(customer))
}

/// POST /api/v1/invoices
pub async fn send_invoice(
    State(state): State<AppState>,
    payload: Result<Json<SendInvoiceRequest>, JsonRejection>,
) -> ApiResult<Json<InvoiceSent>> {
    let request = body(payload)?;
    let invoice = billing(&state)?
        .invoices
        .send_invoice(request)
        .await
        .map_err(|e| ApiError::billing("Failed to send invoice", e))?;

    Ok(Json(invoice))
}

/// POST /api/v1/refunds
pub async fn refund_payment(
    State(state): State<AppState>,
    payload: Result<Json<RefundRequest>, JsonRejection>,
) -> ApiResult<Json<RefundIssued>> {
    let request = body(payload)?;
    let refund = billing(&state)?
        .refunds
        .refund_payment(request)
        .await
        .map_err(|e| ApiError::billing("Failed to create refund", e))?;

    Ok(Json(refund))
}
