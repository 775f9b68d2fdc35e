//! Webhook event decoding
//!
//! A verified payload is decoded into a [`WebhookEvent`] whose `data` is a
//! tagged union keyed by the event `type`. Only the envelope is validated
//! here; the snapshot structs are lenient and each handler checks the
//! fields it actually needs. Types we do not handle decode to
//! [`EventData::Unhandled`] so new processor events never break ingestion.
//! A handled type whose object has a mistyped field decodes to
//! [`EventData::Malformed`] and fails at reconciliation, not here.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::WebhookError;

/// Event type tags handled by the reconciliation core
pub mod event_types {
    pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
    pub const PAYMENT_INTENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";
    pub const INVOICE_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";
    pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts either a bare id or an expanded object carrying an `id`
fn expandable_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(id)) => Some(id),
        Some(Value::Object(obj)) => obj.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PaymentError {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Payment intent as embedded in `payment_intent.*` events
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PaymentIntentSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub status: Option<String>,
    #[serde(deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, String>,
    pub last_payment_error: Option<PaymentError>,
}

impl PaymentIntentSnapshot {
    /// Application invoice this payment settles, if any
    pub fn correlated_invoice_id(&self) -> Option<&str> {
        self.metadata
            .get("invoice_id")
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// Invoice as embedded in `invoice.*` events
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InvoiceSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    pub number: Option<String>,
    pub status: Option<String>,
    pub amount_due: Option<i64>,
    pub amount_paid: Option<i64>,
    pub currency: Option<String>,
    #[serde(deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(deserialize_with = "expandable_id")]
    pub payment_intent: Option<String>,
    pub attempt_count: Option<i64>,
}

/// Event payload, one shape per handled type
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    PaymentIntentSucceeded(PaymentIntentSnapshot),
    PaymentIntentPaymentFailed(PaymentIntentSnapshot),
    InvoicePaymentSucceeded(InvoiceSnapshot),
    InvoicePaymentFailed(InvoiceSnapshot),
    /// Handled type whose object did not fit its snapshot
    Malformed { object: Value, error: String },
    /// Any type without a handler; the object is kept opaque
    Unhandled(Value),
}

impl EventData {
    /// Build the typed payload for `event_type` from `data.object`
    pub fn from_object(event_type: &str, object: Value) -> Self {
        use event_types::*;

        fn snapshot<T: for<'de> Deserialize<'de>>(
            object: Value,
            wrap: fn(T) -> EventData,
        ) -> EventData {
            match T::deserialize(&object) {
                Ok(parsed) => wrap(parsed),
                Err(e) => EventData::Malformed {
                    object,
                    error: e.to_string(),
                },
            }
        }

        match event_type {
            PAYMENT_INTENT_SUCCEEDED => snapshot(object, EventData::PaymentIntentSucceeded),
            PAYMENT_INTENT_PAYMENT_FAILED => {
                snapshot(object, EventData::PaymentIntentPaymentFailed)
            }
            INVOICE_PAYMENT_SUCCEEDED => snapshot(object, EventData::InvoicePaymentSucceeded),
            INVOICE_PAYMENT_FAILED => snapshot(object, EventData::InvoicePaymentFailed),
            _ => EventData::Unhandled(object),
        }
    }
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    livemode: bool,
}

#[derive(Deserialize)]
struct RawEventData {
    object: Value,
}

/// A decoded webhook event. Constructed per request and discarded after
/// dispatch; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub created: Option<i64>,
    pub livemode: bool,
    pub data: EventData,
}

impl WebhookEvent {
    /// Decode a verified raw payload
    pub fn decode(payload: &[u8]) -> Result<Self, WebhookError> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::Decode(e.to_string()))?;

        if raw.id.is_empty() {
            return Err(WebhookError::Decode("event id is empty".to_string()));
        }
        if !raw.data.object.is_object() {
            return Err(WebhookError::Decode(
                "data.object is not an object".to_string(),
            ));
        }

        let data = EventData::from_object(&raw.event_type, raw.data.object);

        Ok(Self {
            id: raw.id,
            event_type: raw.event_type,
            created: raw.created,
            livemode: raw.livemode,
            data,
        })
    }
}
