//! Invoice creation and delivery
//!
//! Builds a draft invoice, attaches the caller's line items to it, then
//! finalizes and sends it. Line-item pricing is taken as given; no billing
//! logic happens here.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stripe::{CollectionMethod, CreateInvoice, CreateInvoiceItem, CustomerId, Invoice, InvoiceItem};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::records::{Collection, InvoiceRecord, InvoiceStatus};
use crate::store::{Patch, RecordStore};

/// Days until due when the caller gives no due date
const DEFAULT_DAYS_UNTIL_DUE: u32 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceLineItem {
    pub description: Option<String>,
    pub quantity: Option<u64>,
    /// Minor currency units per unit
    pub unit_amount: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceData {
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Unix seconds
    pub due_date: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendInvoiceRequest {
    pub customer_id: String,
    #[serde(default)]
    pub invoice_data: InvoiceData,
    pub line_items: Vec<InvoiceLineItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceSent {
    pub id: String,
    pub number: Option<String>,
    pub status: Option<String>,
    pub amount_due: Option<i64>,
    pub amount_paid: Option<i64>,
    pub currency: Option<String>,
    pub customer: String,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf: Option<String>,
    pub due_date: Option<i64>,
    pub created: Option<i64>,
}

pub struct InvoiceService {
    stripe: StripeClient,
    store: Arc<dyn RecordStore>,
}

impl InvoiceService {
    pub fn new(stripe: StripeClient, store: Arc<dyn RecordStore>) -> Self {
        Self { stripe, store }
    }

    /// Create, finalize and send an invoice, then persist it under
    /// `stripe_invoices/<id>`
    pub async fn send_invoice(&self, request: SendInvoiceRequest) -> BillingResult<InvoiceSent> {
        if request.line_items.is_empty() {
            return Err(BillingError::InvalidInput(
                "Invoice needs at least one line item".to_string(),
            ));
        }
        if let Some(item) = request.line_items.iter().find(|i| i.unit_amount < 0) {
            return Err(BillingError::InvalidInput(format!(
                "Negative unit amount: {}",
                item.unit_amount
            )));
        }

        let customer_id = request
            .customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::InvalidInput(format!("Invalid customer ID: {}", e)))?;

        let mut invoice_params = CreateInvoice::new();
        invoice_params.customer = Some(customer_id.clone());
        invoice_params.description = request.invoice_data.description.as_deref();
        invoice_params.collection_method = Some(CollectionMethod::SendInvoice);
        if !request.invoice_data.metadata.is_empty() {
            invoice_params.metadata = Some(request.invoice_data.metadata.clone());
        }
        match request.invoice_data.due_date {
            Some(due_date) => invoice_params.due_date = Some(due_date),
            None => invoice_params.days_until_due = Some(DEFAULT_DAYS_UNTIL_DUE),
        }

        let invoice = Invoice::create(self.stripe.inner(), invoice_params)
            .await
            .map_err(|e| self.log_failure(&request.customer_id, e))?;

        for item in &request.line_items {
            let mut item_params = CreateInvoiceItem::new(customer_id.clone());
            item_params.invoice = Some(invoice.id.clone());
            item_params.description = item.description.as_deref();
            item_params.quantity = item.quantity;
            item_params.unit_amount = Some(item.unit_amount);

            InvoiceItem::create(self.stripe.inner(), item_params)
                .await
                .map_err(|e| self.log_failure(&request.customer_id, e))?;
        }

        Invoice::finalize(self.stripe.inner(), &invoice.id, Default::default())
            .await
            .map_err(|e| self.log_failure(&request.customer_id, e))?;

        let sent = self
            .stripe
            .inner()
            .post::<Invoice>(&format!("/invoices/{}/send", invoice.id))
            .await
            .map_err(|e| self.log_failure(&request.customer_id, e))?;

        let processor_status = sent.status.as_ref().map(|s| s.to_string());
        let currency = sent.currency.as_ref().map(|c| c.to_string());
        let record = InvoiceRecord {
            id: sent.id.to_string(),
            number: sent.number.clone(),
            status: processor_status
                .as_deref()
                .map(InvoiceStatus::from_processor)
                .unwrap_or(InvoiceStatus::Open),
            amount_due: sent.amount_due.unwrap_or(0),
            amount_paid: sent.amount_paid.unwrap_or(0),
            currency: currency.clone().unwrap_or_else(|| "usd".to_string()),
            customer_id: Some(request.customer_id.clone()),
            payment_intent_id: None,
            hosted_invoice_url: sent.hosted_invoice_url.clone(),
            invoice_pdf: sent.invoice_pdf.clone(),
            due_date: sent.due_date,
            created_at: None,
            updated_at: None,
        };

        let mut patch = Patch::from_record(&record)?;
        if let Some(status) = &processor_status {
            patch = patch.set("status", status.as_str());
        }
        self.store
            .set(
                Collection::StripeInvoices,
                &record.id,
                patch.server_timestamp("created_at"),
            )
            .await?;

        tracing::info!(
            customer_id = %request.customer_id,
            invoice_id = %record.id,
            line_items = request.line_items.len(),
            status = ?processor_status,
            "Created and sent invoice"
        );

        Ok(InvoiceSent {
            id: record.id,
            number: record.number,
            status: processor_status,
            amount_due: sent.amount_due,
            amount_paid: sent.amount_paid,
            currency,
            customer: request.customer_id,
            hosted_invoice_url: record.hosted_invoice_url,
            invoice_pdf: record.invoice_pdf,
            due_date: record.due_date,
            created: sent.created,
        })
    }

    fn log_failure(&self, customer_id: &str, err: stripe::StripeError) -> BillingError {
        tracing::error!(customer_id = %customer_id, error = %err, "Error sending invoice");
        BillingError::from(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StripeConfig;
    use crate::signature::DEFAULT_TOLERANCE;
    use crate::store::MemoryRecordStore;

    fn service(base: &str, store: MemoryRecordStore) -> InvoiceService {
        let stripe = StripeClient::new(StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test".to_string(),
            webhook_tolerance: DEFAULT_TOLERANCE,
            api_base: Some(base.to_string()),
        });
        InvoiceService::new(stripe, Arc::new(store))
    }

    fn request(line_items: Vec<InvoiceLineItem>) -> SendInvoiceRequest {
        SendInvoiceRequest {
            customer_id: "cus_123".to_string(),
            invoice_data: InvoiceData::default(),
            line_items,
        }
    }

    #[tokio::test]
    async fn rejected_invoice_persists_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/invoices")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"type":"invalid_request_error","message":"No such customer: 'cus_123'"}}"#)
            .create_async()
            .await;

        let store = MemoryRecordStore::new();
        let result = service(&server.url(), store.clone())
            .send_invoice(request(vec![InvoiceLineItem {
                description: Some("Consulting".to_string()),
                quantity: Some(2),
                unit_amount: 5000,
            }]))
            .await;

        assert!(matches!(result, Err(BillingError::StripeApi(_))));
        assert!(store.is_empty().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_or_negative_line_items_are_rejected_locally() {
        let server = mockito::Server::new_async().await;
        let store = MemoryRecordStore::new();
        let service = service(&server.url(), store.clone());

        assert!(matches!(
            service.send_invoice(request(vec![])).await,
            Err(BillingError::InvalidInput(_))
        ));
        assert!(matches!(
            service
                .send_invoice(request(vec![InvoiceLineItem {
                    description: None,
                    quantity: None,
                    unit_amount: -1,
                }]))
                .await,
            Err(BillingError::InvalidInput(_))
        ));
        assert!(store.is_empty().await);
    }
}
