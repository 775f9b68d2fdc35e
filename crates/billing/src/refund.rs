//! Refunds against a payment intent
//!
//! Full or partial refunds. The refund is recorded under `refunds/<id>` only
//! once Stripe has accepted it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stripe::{CreateRefund, PaymentIntentId, Refund, RefundReasonFilter};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::records::{Collection, RefundRecord};
use crate::store::{Patch, RecordStore};

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    pub payment_intent_id: String,
    /// Minor currency units; omitted means the full remaining amount
    pub amount: Option<i64>,
    pub reason: Option<String>,
}

/// Result of a refund operation
#[derive(Debug, Clone, Serialize)]
pub struct RefundIssued {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub payment_intent_id: String,
    pub reason: Option<String>,
}

/// Map a caller-supplied reason onto the reasons Stripe accepts
fn parse_reason(reason: &str) -> BillingResult<RefundReasonFilter> {
    match reason {
        "duplicate" => Ok(RefundReasonFilter::Duplicate),
        "fraudulent" => Ok(RefundReasonFilter::Fraudulent),
        "requested_by_customer" => Ok(RefundReasonFilter::RequestedByCustomer),
        other => Err(BillingError::InvalidInput(format!(
            "Unsupported refund reason: {}",
            other
        ))),
    }
}

/// Pull a string field out of a serialized refund
fn string_field(refund: &Value, field: &str) -> Option<String> {
    refund.get(field).and_then(Value::as_str).map(str::to_string)
}

pub struct RefundService {
    stripe: StripeClient,
    store: Arc<dyn RecordStore>,
}

impl RefundService {
    pub fn new(stripe: StripeClient, store: Arc<dyn RecordStore>) -> Self {
        Self { stripe, store }
    }

    /// Issue a refund to the customer's payment method
    pub async fn refund_payment(&self, request: RefundRequest) -> BillingResult<RefundIssued> {
        if let Some(amount) = request.amount {
            if amount <= 0 {
                return Err(BillingError::InvalidInput(format!(
                    "Refund amount must be positive, got {}",
                    amount
                )));
            }
        }
        let reason = request.reason.as_deref().map(parse_reason).transpose()?;
        let payment_intent = request
            .payment_intent_id
            .parse::<PaymentIntentId>()
            .map_err(|e| BillingError::InvalidInput(format!("Invalid payment intent ID: {}", e)))?;

        let mut params = CreateRefund::new();
        params.payment_intent = Some(payment_intent);
        params.amount = request.amount;
        params.reason = reason;

        let refund = Refund::create(self.stripe.inner(), params)
            .await
            .map_err(|e| {
                tracing::error!(
                    payment_intent_id = %request.payment_intent_id,
                    amount = ?request.amount,
                    error = %e,
                    "Failed to issue refund"
                );
                BillingError::from(e)
            })?;

        let raw = serde_json::to_value(&refund).map_err(|e| {
            BillingError::StripeApi(format!("Unreadable refund response: {}", e))
        })?;

        let record = RefundRecord {
            id: refund.id.to_string(),
            amount: raw.get("amount").and_then(Value::as_i64).unwrap_or(0),
            currency: string_field(&raw, "currency").unwrap_or_default(),
            payment_intent_id: request.payment_intent_id.clone(),
            status: string_field(&raw, "status").unwrap_or_else(|| "pending".to_string()),
            reason: string_field(&raw, "reason").or_else(|| request.reason.clone()),
            created_at: None,
        };

        self.store
            .set(
                Collection::Refunds,
                &record.id,
                Patch::from_record(&record)?.server_timestamp("created_at"),
            )
            .await?;

        tracing::info!(
            refund_id = %record.id,
            payment_intent_id = %record.payment_intent_id,
            amount = record.amount,
            status = %record.status,
            "Issued refund"
        );

        Ok(RefundIssued {
            id: record.id,
            amount: record.amount,
            currency: record.currency,
            status: record.status,
            payment_intent_id: record.payment_intent_id,
            reason: record.reason,
        })
    }
}
