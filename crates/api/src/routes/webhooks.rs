//! Stripe webhook endpoint

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use paysync_billing::WebhookAck;

use crate::{error::ApiResult, state::AppState};

/// POST /webhooks/stripe
///
/// The body is taken as raw bytes; the signature covers them exactly.
/// Authentication and decode failures are 400. Anything after that is
/// acknowledged, including reconciliation failures.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get(state.config.signature_header.as_str())
        .and_then(|v| v.to_str().ok());

    let reconciliation = state.webhooks.receive(&body, signature).await?;

    if !reconciliation.is_applied() {
        tracing::debug!(
            applied = reconciliation.applied().len(),
            error = ?reconciliation.error().map(ToString::to_string),
            "Acknowledging webhook without full reconciliation"
        );
    }

    Ok(Json(WebhookAck { received: true }))
}
