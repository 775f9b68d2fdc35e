//! Stripe webhook handling
//!
//! Verifies inbound deliveries, routes each event to its reconciliation
//! handler, and folds the result into the record store. Once a delivery is
//! authenticated it is always acknowledged: store failures are logged and
//! reported as a [`Reconciliation`] value, never raised to the sender.
//! Redelivery of lost writes is left to the processor's own retry policy.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{HandlerError, WebhookError};
use crate::events::{EventData, InvoiceSnapshot, PaymentIntentSnapshot, WebhookEvent};
use crate::records::{Collection, DocumentRef, InvoiceStatus, PaymentStatus};
use crate::signature::WebhookVerifier;
use crate::store::{Patch, RecordStore};

/// Outcome of folding one event into the store
#[derive(Debug)]
pub enum Reconciliation {
    /// Every write for the event succeeded
    Applied(Vec<DocumentRef>),
    /// The event type has no handler
    Ignored { event_type: String },
    /// Some writes landed before a later one failed. Nothing is rolled back.
    PartiallyApplied {
        applied: Vec<DocumentRef>,
        error: HandlerError,
    },
    /// No write landed
    Failed(HandlerError),
}

impl Reconciliation {
    pub fn is_applied(&self) -> bool {
        matches!(self, Reconciliation::Applied(_))
    }

    /// Documents written while handling the event
    pub fn applied(&self) -> &[DocumentRef] {
        match self {
            Reconciliation::Applied(docs) => docs,
            Reconciliation::PartiallyApplied { applied, .. } => applied,
            Reconciliation::Ignored { .. } | Reconciliation::Failed(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&HandlerError> {
        match self {
            Reconciliation::PartiallyApplied { error, .. } | Reconciliation::Failed(error) => {
                Some(error)
            }
            _ => None,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Reconciliation::Applied(_) => "applied",
            Reconciliation::Ignored { .. } => "ignored",
            Reconciliation::PartiallyApplied { .. } => "partially_applied",
            Reconciliation::Failed(_) => "failed",
        }
    }
}

/// Acknowledgment body returned for every authenticated delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Webhook handler for Stripe events
#[derive(Clone)]
pub struct WebhookHandler {
    store: Arc<dyn RecordStore>,
    verifier: WebhookVerifier,
}

impl WebhookHandler {
    pub fn new(store: Arc<dyn RecordStore>, verifier: WebhookVerifier) -> Self {
        Self { store, verifier }
    }

    /// Verify the signature over the raw body, then decode it.
    ///
    /// `payload` must be the exact request bytes.
    pub fn verify_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, WebhookError> {
        if let Err(e) = self.verifier.verify(payload, signature) {
            tracing::warn!(
                payload_len = payload.len(),
                has_signature = signature.is_some(),
                error = %e,
                "Webhook signature verification failed"
            );
            return Err(e);
        }

        let event = WebhookEvent::decode(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to decode verified webhook payload");
            e
        })?;

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            livemode = event.livemode,
            "Webhook event verified"
        );

        Ok(event)
    }

    /// Full ingestion path: authenticate, decode, dispatch.
    ///
    /// Only authentication and decode failures are errors. Any
    /// reconciliation outcome, including a failed write, is `Ok`.
    pub async fn receive(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<Reconciliation, WebhookError> {
        let event = self.verify_event(payload, signature)?;
        Ok(self.handle_event(&event).await)
    }

    /// Dispatch a decoded event and log the outcome
    pub async fn handle_event(&self, event: &WebhookEvent) -> Reconciliation {
        let result = self.dispatch(event).await;

        match &result {
            Reconciliation::Applied(docs) => tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                documents = docs.len(),
                "Webhook event reconciled"
            ),
            Reconciliation::Ignored { event_type } => tracing::info!(
                event_id = %event.id,
                event_type = %event_type,
                "Received unhandled Stripe event type - no handler configured"
            ),
            Reconciliation::PartiallyApplied { applied, error } => tracing::error!(
                event_id = %event.id,
                event_type = %event.event_type,
                applied = ?applied.iter().map(ToString::to_string).collect::<Vec<_>>(),
                error = %error,
                outcome = result.outcome(),
                "Webhook event only partially reconciled"
            ),
            Reconciliation::Failed(error) => tracing::error!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %error,
                outcome = result.outcome(),
                "Failed to reconcile webhook event"
            ),
        }

        result
    }

    /// Route an event to its handler. Every type has a defined outcome.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Reconciliation {
        match &event.data {
            EventData::PaymentIntentSucceeded(pi) => self.handle_payment_success(pi).await,
            EventData::PaymentIntentPaymentFailed(pi) => self.handle_payment_failure(pi).await,
            EventData::InvoicePaymentSucceeded(invoice) => {
                self.handle_invoice_payment_success(invoice).await
            }
            EventData::InvoicePaymentFailed(invoice) => {
                self.handle_invoice_payment_failure(invoice).await
            }
            EventData::Malformed { error, .. } => {
                Reconciliation::Failed(HandlerError::InvalidObject(error.clone()))
            }
            EventData::Unhandled(_) => Reconciliation::Ignored {
                event_type: event.event_type.clone(),
            },
        }
    }

    /// `payment_intent.succeeded`
    ///
    /// Marks the payment intent succeeded and, when its metadata names an
    /// application invoice, marks that invoice paid. The two writes are
    /// independent; if the second fails the first stays applied.
    pub async fn handle_payment_success(&self, pi: &PaymentIntentSnapshot) -> Reconciliation {
        if pi.id.is_empty() {
            return Reconciliation::Failed(HandlerError::MissingField("id"));
        }

        let payment_doc = DocumentRef::new(Collection::PaymentIntents, &pi.id);
        let patch = Patch::new()
            .set("status", PaymentStatus::Succeeded.as_str())
            .server_timestamp("updated_at");

        if let Err(e) = self
            .store
            .update(Collection::PaymentIntents, &pi.id, patch)
            .await
        {
            return Reconciliation::Failed(e.into());
        }

        let mut applied = vec![payment_doc];

        if let Some(invoice_id) = pi.correlated_invoice_id() {
            let patch = Patch::new()
                .set("status", InvoiceStatus::Paid.as_str())
                .set("payment_intent_id", pi.id.as_str())
                .server_timestamp("paid_at");

            if let Err(e) = self
                .store
                .update(Collection::Invoices, invoice_id, patch)
                .await
            {
                return Reconciliation::PartiallyApplied {
                    applied,
                    error: e.into(),
                };
            }
            applied.push(DocumentRef::new(Collection::Invoices, invoice_id));
        }

        tracing::info!(
            payment_intent_id = %pi.id,
            amount = ?pi.amount,
            invoice_id = ?pi.correlated_invoice_id(),
            "Payment succeeded"
        );

        Reconciliation::Applied(applied)
    }

    /// `payment_intent.payment_failed`
    pub async fn handle_payment_failure(&self, pi: &PaymentIntentSnapshot) -> Reconciliation {
        if pi.id.is_empty() {
            return Reconciliation::Failed(HandlerError::MissingField("id"));
        }

        let mut patch = Patch::new()
            .set("status", PaymentStatus::Failed.as_str())
            .server_timestamp("updated_at");

        let failure_message = pi
            .last_payment_error
            .as_ref()
            .and_then(|e| e.message.as_deref());
        if let Some(message) = failure_message {
            patch = patch.set("failure_message", message);
        }

        if let Err(e) = self
            .store
            .update(Collection::PaymentIntents, &pi.id, patch)
            .await
        {
            return Reconciliation::Failed(e.into());
        }

        tracing::info!(
            payment_intent_id = %pi.id,
            failure_message = ?failure_message,
            "Payment failed"
        );

        Reconciliation::Applied(vec![DocumentRef::new(Collection::PaymentIntents, &pi.id)])
    }

    /// `invoice.payment_succeeded`
    pub async fn handle_invoice_payment_success(&self, invoice: &InvoiceSnapshot) -> Reconciliation {
        if invoice.id.is_empty() {
            return Reconciliation::Failed(HandlerError::MissingField("id"));
        }

        let mut patch = Patch::new()
            .set("status", InvoiceStatus::Paid.as_str())
            .server_timestamp("updated_at");
        if let Some(amount_paid) = invoice.amount_paid {
            patch = patch.set("amount_paid", amount_paid);
        }
        if let Some(payment_intent_id) = invoice.payment_intent.as_deref() {
            patch = patch.set("payment_intent_id", payment_intent_id);
        }

        if let Err(e) = self
            .store
            .update(Collection::StripeInvoices, &invoice.id, patch)
            .await
        {
            return Reconciliation::Failed(e.into());
        }

        tracing::info!(
            invoice_id = %invoice.id,
            amount_paid = ?invoice.amount_paid,
            "Invoice payment succeeded"
        );

        Reconciliation::Applied(vec![DocumentRef::new(
            Collection::StripeInvoices,
            &invoice.id,
        )])
    }

    /// `invoice.payment_failed`. Leaves `amount_paid` untouched.
    pub async fn handle_invoice_payment_failure(&self, invoice: &InvoiceSnapshot) -> Reconciliation {
        if invoice.id.is_empty() {
            return Reconciliation::Failed(HandlerError::MissingField("id"));
        }

        let patch = Patch::new()
            .set("status", InvoiceStatus::PaymentFailed.as_str())
            .server_timestamp("updated_at");

        if let Err(e) = self
            .store
            .update(Collection::StripeInvoices, &invoice.id, patch)
            .await
        {
            return Reconciliation::Failed(e.into());
        }

        tracing::info!(
            invoice_id = %invoice.id,
            amount_due = ?invoice.amount_due,
            attempt_count = ?invoice.attempt_count,
            "Invoice payment failed"
        );

        Reconciliation::Applied(vec![DocumentRef::new(
            Collection::StripeInvoices,
            &invoice.id,
        )])
    }
}
