//! Payment intent operations
//!
//! Each operation is one Stripe call followed by at most one store write.
//! The write only happens after Stripe accepted the request, so a rejected
//! call leaves nothing behind.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stripe::{CreatePaymentIntent, Currency, PaymentIntent, PaymentIntentId};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::records::{Collection, PaymentIntentRecord, PaymentStatus};
use crate::store::{Patch, RecordStore};

/// Store write for a newly created intent. `status` carries the processor's
/// own status string, which reads back as [`PaymentStatus::Created`] until a
/// webhook moves it on.
pub(crate) fn creation_patch(
    record: &PaymentIntentRecord,
    processor_status: &str,
) -> BillingResult<Patch> {
    Ok(Patch::from_record(record)?
        .set("status", processor_status)
        .server_timestamp("created_at"))
}

/// Parse a lowercase ISO currency code into Stripe's enum
pub(crate) fn parse_currency(code: &str) -> BillingResult<Currency> {
    serde_json::from_value(serde_json::Value::String(code.trim().to_lowercase()))
        .map_err(|_| BillingError::InvalidInput(format!("Unsupported currency: {}", code)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentIntentRequest {
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub invoice_id: Option<String>,
    pub invoice_number: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentCreated {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub status: String,
    pub amount: i64,
    pub currency: String,
}

pub struct PaymentService {
    stripe: StripeClient,
    store: Arc<dyn RecordStore>,
}

impl PaymentService {
    pub fn new(stripe: StripeClient, store: Arc<dyn RecordStore>) -> Self {
        Self { stripe, store }
    }

    /// Create a payment intent and persist it under `payment_intents/<id>`.
    ///
    /// Invoice and customer details travel in the intent's metadata so the
    /// success webhook can find the application invoice again.
    pub async fn create_payment_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> BillingResult<PaymentIntentCreated> {
        if request.amount <= 0 {
            return Err(BillingError::InvalidInput(format!(
                "Amount must be positive, got {}",
                request.amount
            )));
        }
        let currency = parse_currency(&request.currency)?;

        let mut metadata = request.metadata.clone();
        if let Some(invoice_id) = &request.invoice_id {
            metadata.insert("invoice_id".to_string(), invoice_id.clone());
        }
        if let Some(invoice_number) = &request.invoice_number {
            metadata.insert("invoice_number".to_string(), invoice_number.clone());
        }
        if let Some(customer_name) = &request.customer_name {
            metadata.insert("customer_name".to_string(), customer_name.clone());
        }

        let mut params = CreatePaymentIntent::new(request.amount, currency);
        params.metadata = Some(metadata);
        params.receipt_email = request.customer_email.as_deref();

        let intent = PaymentIntent::create(self.stripe.inner(), params)
            .await
            .map_err(|e| {
                tracing::error!(
                    amount = request.amount,
                    currency = %request.currency,
                    invoice_id = ?request.invoice_id,
                    error = %e,
                    "Error creating payment intent"
                );
                BillingError::from(e)
            })?;

        let currency = currency.to_string();
        let processor_status = intent.status.to_string();
        let record = PaymentIntentRecord {
            id: intent.id.to_string(),
            amount: request.amount,
            currency: currency.clone(),
            status: PaymentStatus::from_processor(&processor_status),
            invoice_id: request.invoice_id.clone(),
            invoice_number: request.invoice_number.clone(),
            customer_name: request.customer_name.clone(),
            customer_email: request.customer_email.clone(),
            failure_message: None,
            created_at: None,
            updated_at: None,
        };

        self.store
            .set(
                Collection::PaymentIntents,
                &record.id,
                creation_patch(&record, &processor_status)?,
            )
            .await?;

        tracing::info!(
            payment_intent_id = %record.id,
            amount = record.amount,
            invoice_id = ?record.invoice_id,
            "Created payment intent"
        );

        Ok(PaymentIntentCreated {
            id: record.id,
            client_secret: intent.client_secret,
            amount: intent.amount,
            currency,
            status: processor_status,
        })
    }

    /// Fetch the current status straight from Stripe. No store write.
    pub async fn get_payment_status(&self, payment_intent_id: &str) -> BillingResult<PaymentStatusView> {
        let id = payment_intent_id
            .parse::<PaymentIntentId>()
            .map_err(|e| BillingError::InvalidInput(format!("Invalid payment intent ID: {}", e)))?;

        let intent = PaymentIntent::retrieve(self.stripe.inner(), &id, &[])
            .await
            .map_err(|e| {
                tracing::error!(
                    payment_intent_id = %payment_intent_id,
                    error = %e,
                    "Error getting payment status"
                );
                BillingError::from(e)
            })?;

        Ok(PaymentStatusView {
            status: intent.status.to_string(),
            amount: intent.amount,
            currency: intent.currency.to_string(),
        })
    }
}
