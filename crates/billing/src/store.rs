//! Record store adapter
//!
//! The reconciliation core treats persistence as a keyed document store:
//! get/set/update by `(collection, id)`, merge semantics on update, and
//! timestamps assigned by the store rather than the caller. There are no
//! multi-document transactions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::records::Collection;

/// A stored document: a flat JSON object
pub type Document = Map<String, Value>;

/// A set of field writes. Fields named with [`Patch::server_timestamp`] are
/// filled in by the store at write time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: Document,
    server_timestamps: Vec<String>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.fields.remove(field);
        self.server_timestamps.push(field.to_string());
        self
    }

    /// Build a patch from a serializable record. The record must serialize
    /// to a JSON object.
    pub fn from_record<T: Serialize>(record: &T) -> StoreResult<Self> {
        match serde_json::to_value(record)? {
            Value::Object(fields) => Ok(Self {
                fields,
                server_timestamps: Vec::new(),
            }),
            other => Err(StoreError::Serialization(format!(
                "record must serialize to an object, got {}",
                other
            ))),
        }
    }

    pub fn fields(&self) -> &Document {
        &self.fields
    }

    pub fn server_timestamps(&self) -> &[String] {
        &self.server_timestamps
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.server_timestamps.is_empty()
    }

    /// Resolve server timestamps against `now`, yielding the concrete fields
    pub fn resolve(self, now: OffsetDateTime) -> StoreResult<Document> {
        let mut fields = self.fields;
        if !self.server_timestamps.is_empty() {
            let stamp = now
                .format(&Rfc3339)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            for field in self.server_timestamps {
                fields.insert(field, Value::String(stamp.clone()));
            }
        }
        Ok(fields)
    }
}

/// Keyed document store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a document, `None` if it does not exist
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>>;

    /// Create or fully overwrite a document
    async fn set(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()>;

    /// Merge the patch into an existing document. Fields not named in the
    /// patch are preserved. Fails with [`StoreError::NotFound`] when the
    /// document does not exist.
    async fn update(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()>;
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        (**self).get(collection, id).await
    }

    async fn set(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()> {
        (**self).set(collection, id, patch).await
    }

    async fn update(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()> {
        (**self).update(collection, id, patch).await
    }
}

/// In-process store, used when no database is configured and in tests
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    documents: Arc<RwLock<HashMap<(Collection, String), Document>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all collections
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Copy of every stored document
    pub async fn snapshot(&self) -> HashMap<(Collection, String), Document> {
        self.documents.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(documents.get(&(collection, id.to_string())).cloned())
    }

    async fn set(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()> {
        let fields = patch.resolve(OffsetDateTime::now_utc())?;
        let mut documents = self.documents.write().await;
        documents.insert((collection, id.to_string()), fields);
        Ok(())
    }

    async fn update(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()> {
        let fields = patch.resolve(OffsetDateTime::now_utc())?;
        let mut documents = self.documents.write().await;
        let doc = documents
            .get_mut(&(collection, id.to_string()))
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;
        doc.extend(fields);
        Ok(())
    }
}

/// Bounds every call on the inner store by a fixed timeout
pub struct TimedStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: RecordStore> TimedStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        collection: Collection,
        id: &str,
        fut: impl std::future::Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    op = op,
                    collection = %collection,
                    id = %id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Record store call timed out"
                );
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for TimedStore<S> {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        self.bounded("get", collection, id, self.inner.get(collection, id))
            .await
    }

    async fn set(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()> {
        self.bounded("set", collection, id, self.inner.set(collection, id, patch))
            .await
    }

    async fn update(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()> {
        self.bounded(
            "update",
            collection,
            id,
            self.inner.update(collection, id, patch),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn update_merges_and_preserves_other_fields() {
        let store = MemoryRecordStore::new();
        store
            .set(
                Collection::StripeInvoices,
                "in_1",
                Patch::new()
                    .set("status", "open")
                    .set("amount_paid", 0)
                    .set("amount_due", 500),
            )
            .await
            .unwrap();

        store
            .update(
                Collection::StripeInvoices,
                "in_1",
                Patch::new().set("status", "paid").set("amount_paid", 500),
            )
            .await
            .unwrap();

        let doc = store
            .get(Collection::StripeInvoices, "in_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["status"], "paid");
        assert_eq!(doc["amount_paid"], 500);
        assert_eq!(doc["amount_due"], 500);
    }

    #[tokio::test]
    async fn update_on_missing_document_is_not_found() {
        let store = MemoryRecordStore::new();
        let err = store
            .update(
                Collection::PaymentIntents,
                "pi_missing",
                Patch::new().set("status", "succeeded"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound { collection: Collection::PaymentIntents, ref id } if id == "pi_missing"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn server_timestamp_is_filled_by_store() {
        let store = MemoryRecordStore::new();
        store
            .set(
                Collection::Customers,
                "cus_1",
                Patch::new()
                    .set("name", "Ada")
                    .set("created_at", "caller value")
                    .server_timestamp("created_at"),
            )
            .await
            .unwrap();

        let doc = store.get(Collection::Customers, "cus_1").await.unwrap().unwrap();
        let stamp = doc["created_at"].as_str().unwrap();
        assert!(OffsetDateTime::parse(stamp, &Rfc3339).is_ok());
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let store = MemoryRecordStore::new();
        store
            .set(Collection::Invoices, "x", Patch::new().set("status", "open"))
            .await
            .unwrap();

        assert!(store
            .get(Collection::StripeInvoices, "x")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn patch_from_record_requires_object() {
        assert!(Patch::from_record(&json!({"id": "a"})).is_ok());
        assert!(matches!(
            Patch::from_record(&json!(["a"])),
            Err(StoreError::Serialization(_))
        ));
    }

    struct SlowStore;

    #[async_trait]
    impl RecordStore for SlowStore {
        async fn get(&self, _: Collection, _: &str) -> StoreResult<Option<Document>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn set(&self, _: Collection, _: &str, _: Patch) -> StoreResult<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn update(&self, _: Collection, _: &str, _: Patch) -> StoreResult<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn timed_store_reports_timeout() {
        let store = TimedStore::new(SlowStore, Duration::from_millis(50));
        let err = store
            .update(
                Collection::PaymentIntents,
                "pi_1",
                Patch::new().set("status", "succeeded"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Timeout(d) if d == Duration::from_millis(50)));
    }
}
