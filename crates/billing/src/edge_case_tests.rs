// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Webhook Reconciliation
//!
//! Tests boundary conditions across the whole ingestion path:
//! - Signature authentication (timestamps, header shapes, secrets)
//! - Event routing (unknown types, malformed objects)
//! - Reconciliation (redelivery, correlation, partial writes)
//! - Store failures (timeouts, outages after authentication)

#[cfg(test)]
mod support {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::error::{StoreError, StoreResult};
    use crate::records::Collection;
    use crate::signature::{sign_payload, unix_now, WebhookVerifier, DEFAULT_TOLERANCE};
    use crate::store::{Document, MemoryRecordStore, Patch, RecordStore};
    use crate::webhooks::WebhookHandler;

    pub const SECRET: &str = "whsec_edge_cases";

    /// Store whose every call fails as if the database were down
    pub struct UnavailableStore;

    #[async_trait]
    impl RecordStore for UnavailableStore {
        async fn get(&self, _: Collection, _: &str) -> StoreResult<Option<Document>> {
            Err(StoreError::Database("connection refused".to_string()))
        }

        async fn set(&self, _: Collection, _: &str, _: Patch) -> StoreResult<()> {
            Err(StoreError::Database("connection refused".to_string()))
        }

        async fn update(&self, _: Collection, _: &str, _: Patch) -> StoreResult<()> {
            Err(StoreError::Database("connection refused".to_string()))
        }
    }

    /// Store that never answers
    pub struct HangingStore;

    #[async_trait]
    impl RecordStore for HangingStore {
        async fn get(&self, _: Collection, _: &str) -> StoreResult<Option<Document>> {
            std::future::pending().await
        }

        async fn set(&self, _: Collection, _: &str, _: Patch) -> StoreResult<()> {
            std::future::pending().await
        }

        async fn update(&self, _: Collection, _: &str, _: Patch) -> StoreResult<()> {
            std::future::pending().await
        }
    }

    pub fn handler(store: Arc<dyn RecordStore>) -> WebhookHandler {
        WebhookHandler::new(store, WebhookVerifier::new(SECRET, DEFAULT_TOLERANCE))
    }

    pub fn payload(event_id: &str, event_type: &str, object: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": event_id,
            "object": "event",
            "type": event_type,
            "created": 1_700_000_000,
            "livemode": false,
            "data": {"object": object}
        }))
        .unwrap()
    }

    pub fn sign(payload: &[u8]) -> String {
        sign_payload(payload, SECRET, unix_now().unwrap()).unwrap()
    }

    pub async fn seed(store: &MemoryRecordStore, collection: Collection, id: &str, doc: Value) {
        let mut patch = Patch::new();
        for (k, v) in doc.as_object().unwrap() {
            patch = patch.set(k, v.clone());
        }
        store.set(collection, id, patch).await.unwrap();
    }

    pub fn hanging_store(timeout: Duration) -> crate::store::TimedStore<HangingStore> {
        crate::store::TimedStore::new(HangingStore, timeout)
    }
}

#[cfg(test)]
mod signature_tests {
    use crate::signature::{sign_payload, verify_signature, DEFAULT_TOLERANCE};

    const SECRET: &str = "whsec_edge_cases";
    const NOW: i64 = 1_700_000_000;

    // =========================================================================
    // Signature exactly at the tolerance edge is accepted, one second past is not
    // =========================================================================
    #[test]
    fn test_timestamp_tolerance_boundary() {
        let payload = b"{}";

        for (age, accepted) in [(299, true), (300, true), (301, false), (-300, true), (-301, false)] {
            let header = sign_payload(payload, SECRET, NOW - age).unwrap();
            let result = verify_signature(payload, Some(&header), SECRET, DEFAULT_TOLERANCE, NOW);
            assert_eq!(result.is_ok(), accepted, "age {}s", age);
        }
    }

    // =========================================================================
    // Only v1 is trusted; a v0 entry alone never authenticates
    // =========================================================================
    #[test]
    fn test_v0_signature_is_not_trusted() {
        let payload = b"{}";
        let header = sign_payload(payload, SECRET, NOW).unwrap();
        let downgraded = header.replace("v1=", "v0=");

        assert!(verify_signature(payload, Some(&downgraded), SECRET, DEFAULT_TOLERANCE, NOW).is_err());
    }

    // =========================================================================
    // One good signature among rotated stale ones is enough
    // =========================================================================
    #[test]
    fn test_rotated_secret_headers() {
        let payload = b"{\"id\":\"evt_1\"}";
        let good = sign_payload(payload, SECRET, NOW).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "00".repeat(32), good_sig);

        assert!(verify_signature(payload, Some(&header), SECRET, DEFAULT_TOLERANCE, NOW).is_ok());
    }

    // =========================================================================
    // Trailing newline is a different body
    // =========================================================================
    #[test]
    fn test_whitespace_change_breaks_signature() {
        let payload = b"{\"id\":\"evt_1\"}";
        let header = sign_payload(payload, SECRET, NOW).unwrap();

        assert!(verify_signature(b"{\"id\":\"evt_1\"}\n", Some(&header), SECRET, DEFAULT_TOLERANCE, NOW).is_err());
    }
}

#[cfg(test)]
mod webhook_tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::support::*;
    use crate::error::{HandlerError, StoreError, WebhookError};
    use crate::records::Collection;
    use crate::store::{MemoryRecordStore, RecordStore};
    use crate::webhooks::Reconciliation;

    // =========================================================================
    // Same signed delivery twice lands in the same state
    // =========================================================================
    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let store = MemoryRecordStore::new();
        seed(&store, Collection::PaymentIntents, "pi_1", json!({"status": "processing", "amount": 1200})).await;
        let handler = handler(Arc::new(store.clone()));

        let body = payload("evt_1", "payment_intent.succeeded", json!({"id": "pi_1"}));
        let header = sign(&body);

        let first = handler.receive(&body, Some(&header)).await.unwrap();
        let after_first = store.get(Collection::PaymentIntents, "pi_1").await.unwrap().unwrap();
        let second = handler.receive(&body, Some(&header)).await.unwrap();
        let after_second = store.get(Collection::PaymentIntents, "pi_1").await.unwrap().unwrap();

        assert!(first.is_applied());
        assert!(second.is_applied());
        assert_eq!(after_first["status"], "succeeded");
        assert_eq!(after_second["status"], after_first["status"]);
        assert_eq!(after_second["amount"], after_first["amount"]);
        assert_eq!(store.len().await, 1);
    }

    // =========================================================================
    // Concurrent redeliveries converge
    // =========================================================================
    #[tokio::test]
    async fn test_concurrent_redeliveries_converge() {
        let store = MemoryRecordStore::new();
        seed(&store, Collection::StripeInvoices, "in_5", json!({"status": "open", "amount_paid": 0})).await;
        let handler = Arc::new(handler(Arc::new(store.clone())));

        let body = payload("evt_5", "invoice.payment_succeeded", json!({"id": "in_5", "amount_paid": 700}));
        let header = sign(&body);

        let mut handles = vec![];
        for _ in 0..8 {
            let handler = handler.clone();
            let body = body.clone();
            let header = header.clone();
            handles.push(tokio::spawn(async move {
                handler.receive(&body, Some(&header)).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_applied());
        }

        let invoice = store.get(Collection::StripeInvoices, "in_5").await.unwrap().unwrap();
        assert_eq!(invoice["status"], "paid");
        assert_eq!(invoice["amount_paid"], 700);
    }

    // =========================================================================
    // Unknown event type is acknowledged and mutates nothing
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_event_type_mutates_nothing() {
        let store = MemoryRecordStore::new();
        seed(&store, Collection::PaymentIntents, "pi_1", json!({"status": "processing"})).await;
        let before = store.snapshot().await;
        let handler = handler(Arc::new(store.clone()));

        let body = payload("evt_2", "foo.bar", json!({"id": "pi_1", "status": "succeeded"}));
        let result = handler.receive(&body, Some(&sign(&body))).await.unwrap();

        assert!(matches!(result, Reconciliation::Ignored { ref event_type } if event_type == "foo.bar"));
        assert!(result.applied().is_empty());
        assert_eq!(store.snapshot().await, before);
    }

    // =========================================================================
    // Mistyped field in a handled object is acknowledged, not a decode error
    // =========================================================================
    #[tokio::test]
    async fn test_mistyped_field_is_failed_not_rejected() {
        let store = MemoryRecordStore::new();
        seed(&store, Collection::StripeInvoices, "in_99", json!({"status": "open", "attempt_count": 1})).await;
        let before = store.snapshot().await;
        let handler = handler(Arc::new(store.clone()));

        let body = payload("evt_9", "invoice.payment_failed", json!({"id": "in_99", "attempt_count": "3"}));
        let result = handler.receive(&body, Some(&sign(&body))).await;

        assert!(matches!(result, Ok(Reconciliation::Failed(HandlerError::InvalidObject(_)))));
        assert_eq!(store.snapshot().await, before);
    }

    // =========================================================================
    // Application invoice is found through the intent's metadata
    // =========================================================================
    #[tokio::test]
    async fn test_metadata_correlation_marks_invoice_paid() {
        let store = MemoryRecordStore::new();
        seed(&store, Collection::PaymentIntents, "pi_7", json!({"status": "processing"})).await;
        seed(&store, Collection::Invoices, "inv_42", json!({"status": "open", "number": "INV-42"})).await;
        let handler = handler(Arc::new(store.clone()));

        let body = payload(
            "evt_3",
            "payment_intent.succeeded",
            json!({"id": "pi_7", "metadata": {"invoice_id": "inv_42", "invoice_number": "INV-42"}}),
        );
        let result = handler.receive(&body, Some(&sign(&body))).await.unwrap();

        assert_eq!(result.applied().len(), 2);
        let invoice = store.get(Collection::Invoices, "inv_42").await.unwrap().unwrap();
        assert_eq!(invoice["status"], "paid");
        assert_eq!(invoice["payment_intent_id"], "pi_7");
        assert_eq!(invoice["number"], "INV-42");
    }

    // =========================================================================
    // Empty invoice_id metadata is treated as absent
    // =========================================================================
    #[tokio::test]
    async fn test_empty_invoice_metadata_is_ignored() {
        let store = MemoryRecordStore::new();
        seed(&store, Collection::PaymentIntents, "pi_8", json!({"status": "processing"})).await;
        let handler = handler(Arc::new(store.clone()));

        let body = payload(
            "evt_4",
            "payment_intent.succeeded",
            json!({"id": "pi_8", "metadata": {"invoice_id": ""}}),
        );
        let result = handler.receive(&body, Some(&sign(&body))).await.unwrap();

        assert!(result.is_applied());
        assert_eq!(result.applied().len(), 1);
    }

    // =========================================================================
    // invoice.payment_failed leaves amount_paid alone
    // =========================================================================
    #[tokio::test]
    async fn test_invoice_failure_keeps_amount_paid() {
        let store = MemoryRecordStore::new();
        seed(&store, Collection::StripeInvoices, "in_99", json!({"status": "open", "amount_paid": 300})).await;
        let handler = handler(Arc::new(store.clone()));

        let body = payload("evt_6", "invoice.payment_failed", json!({"id": "in_99", "amount_paid": 0, "attempt_count": 3}));
        handler.receive(&body, Some(&sign(&body))).await.unwrap();

        let invoice = store.get(Collection::StripeInvoices, "in_99").await.unwrap().unwrap();
        assert_eq!(invoice["status"], "payment_failed");
        assert_eq!(invoice["amount_paid"], 300);
    }

    // =========================================================================
    // Event for a record the store never saw is a handler failure, still ack'd
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_record_is_failed_not_created() {
        let store = MemoryRecordStore::new();
        let handler = handler(Arc::new(store.clone()));

        let body = payload("evt_7", "payment_intent.payment_failed", json!({"id": "pi_ghost"}));
        let result = handler.receive(&body, Some(&sign(&body))).await.unwrap();

        assert!(matches!(
            result,
            Reconciliation::Failed(HandlerError::Store(StoreError::NotFound { .. }))
        ));
        assert!(store.is_empty().await);
    }

    // =========================================================================
    // Store outage after authentication is reported, never raised
    // =========================================================================
    #[tokio::test]
    async fn test_store_outage_is_still_acknowledged() {
        let handler = handler(Arc::new(UnavailableStore));

        let body = payload("evt_8", "invoice.payment_succeeded", json!({"id": "in_1", "amount_paid": 100}));
        let result = handler.receive(&body, Some(&sign(&body))).await;

        let reconciliation = result.expect("authenticated delivery must not error");
        assert!(matches!(
            reconciliation,
            Reconciliation::Failed(HandlerError::Store(StoreError::Database(_)))
        ));
    }

    // =========================================================================
    // Store that never answers is cut off by the timeout
    // =========================================================================
    #[tokio::test]
    async fn test_hanging_store_times_out() {
        let handler = handler(Arc::new(hanging_store(std::time::Duration::from_millis(20))));

        let body = payload("evt_9", "payment_intent.succeeded", json!({"id": "pi_1"}));
        let result = handler.receive(&body, Some(&sign(&body))).await.unwrap();

        assert!(matches!(
            result,
            Reconciliation::Failed(HandlerError::Store(StoreError::Timeout(_)))
        ));
    }

    // =========================================================================
    // Missing header or valid signature over garbage: rejected before dispatch
    // =========================================================================
    #[tokio::test]
    async fn test_rejections_happen_before_dispatch() {
        let store = MemoryRecordStore::new();
        seed(&store, Collection::PaymentIntents, "pi_1", json!({"status": "processing"})).await;
        let before = store.snapshot().await;
        let handler = handler(Arc::new(store.clone()));

        let body = payload("evt_10", "payment_intent.succeeded", json!({"id": "pi_1"}));
        assert!(matches!(
            handler.receive(&body, None).await,
            Err(WebhookError::Authentication(_))
        ));

        let garbage = b"not json at all".to_vec();
        assert!(matches!(
            handler.receive(&garbage, Some(&sign(&garbage))).await,
            Err(WebhookError::Decode(_))
        ));

        let no_object = br#"{"id":"evt_11","type":"payment_intent.succeeded","data":{}}"#.to_vec();
        assert!(matches!(
            handler.receive(&no_object, Some(&sign(&no_object))).await,
            Err(WebhookError::Decode(_))
        ));

        assert_eq!(store.snapshot().await, before);
    }
}
