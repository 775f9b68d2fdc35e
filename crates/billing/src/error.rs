//! Billing error types

use std::time::Duration;

use thiserror::Error;

use crate::records::Collection;

/// Errors raised while authenticating or decoding an inbound webhook.
///
/// Both variants are fatal to the request and map to a client error at the
/// HTTP boundary. No state is touched once either is returned.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("{0}")]
    Authentication(String),

    #[error("Invalid payload: {0}")]
    Decode(String),
}

/// Errors raised by a record store adapter
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No document {collection}/{id}")]
    NotFound { collection: Collection, id: String },

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a reconciliation handler. These never reach the
/// webhook sender; they are logged and the event is still acknowledged.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Event object is missing `{0}`")]
    MissingField(&'static str),

    #[error("Event object did not parse: {0}")]
    InvalidObject(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the outbound processor operations
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
