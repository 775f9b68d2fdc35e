// Billing crate clippy configuration
#![allow(clippy::result_large_err)] // StripeError payloads are converted, not boxed
#![allow(clippy::field_reassign_with_default)] // Used for conditional struct field setting
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Paysync Billing Module
//!
//! Keeps a document store in step with Stripe.
//!
//! ## Features
//!
//! - **Webhook Ingestion**: Verify `Stripe-Signature`, decode and route events
//! - **Reconciliation**: Fold payment intent and invoice outcomes into stored records
//! - **Payment Intents**: Create intents and read their live status
//! - **Customers**: Create customers
//! - **Invoices**: Create, finalize and send invoices
//! - **Refunds**: Full or partial refunds against a payment intent
//! - **Record Stores**: In-memory and Postgres (JSONB) backends behind one trait

pub mod client;
pub mod customer;
pub mod error;
pub mod events;
pub mod invoices;
pub mod payments;
pub mod pg_store;
pub mod records;
pub mod refund;
pub mod signature;
pub mod store;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

use std::sync::Arc;

// Client
pub use client::{StripeClient, StripeConfig};

// Customer
pub use customer::{CreateCustomerRequest, CustomerCreated, CustomerService};

// Error
pub use error::{BillingError, BillingResult, HandlerError, StoreError, StoreResult, WebhookError};

// Events
pub use events::{EventData, InvoiceSnapshot, PaymentIntentSnapshot, WebhookEvent};

// Invoices
pub use invoices::{InvoiceData, InvoiceLineItem, InvoiceSent, InvoiceService, SendInvoiceRequest};

// Payments
pub use payments::{CreatePaymentIntentRequest, PaymentIntentCreated, PaymentService, PaymentStatusView};

// Records
pub use records::{
    Collection, CustomerRecord, DocumentRef, InvoiceRecord, InvoiceStatus, PaymentIntentRecord,
    PaymentStatus, RefundRecord,
};

// Refund
pub use refund::{RefundIssued, RefundRequest, RefundService};

// Signature
pub use signature::{sign_payload, verify_signature, WebhookVerifier, DEFAULT_TOLERANCE};

// Store
pub use pg_store::PgRecordStore;
pub use store::{Document, MemoryRecordStore, Patch, RecordStore, TimedStore};

// Webhooks
pub use webhooks::{Reconciliation, WebhookAck, WebhookHandler};

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub payments: PaymentService,
    pub customers: CustomerService,
    pub invoices: InvoiceService,
    pub refunds: RefundService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, store: Arc<dyn RecordStore>) -> Self {
        let verifier = config.verifier();
        let stripe = StripeClient::new(config);

        Self {
            payments: PaymentService::new(stripe.clone(), store.clone()),
            customers: CustomerService::new(stripe.clone(), store.clone()),
            invoices: InvoiceService::new(stripe.clone(), store.clone()),
            refunds: RefundService::new(stripe, store.clone()),
            webhooks: WebhookHandler::new(store, verifier),
        }
    }
}
