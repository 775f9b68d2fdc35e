//! HTTP routes

mod payments;
mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub use payments::{
    create_customer, create_payment_intent, get_payment_status, refund_payment, send_invoice,
};
pub use webhooks::stripe_webhook;

/// GET /health
async fn health() -> &'static str {
    "ok"
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/stripe", post(stripe_webhook))
        .route("/api/v1/payment-intents", post(create_payment_intent))
        .route(
            "/api/v1/payment-intents/{id}/status",
            get(get_payment_status),
        )
        .route("/api/v1/customers", post(create_customer))
        .route("/api/v1/invoices", post(send_invoice))
        .route("/api/v1/refunds", post(refund_payment))
        .with_state(state)
}
