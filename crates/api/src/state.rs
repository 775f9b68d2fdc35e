//! Application state

use std::sync::Arc;

use paysync_billing::{BillingService, RecordStore, WebhookHandler};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub webhooks: Arc<WebhookHandler>,
    /// Outbound operations; `None` when no Stripe secret key is configured
    pub billing: Option<Arc<BillingService>>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RecordStore>) -> Self {
        let webhooks = Arc::new(WebhookHandler::new(store.clone(), config.webhook_verifier()));

        let billing = match config.stripe() {
            Some(stripe) => {
                tracing::info!("Stripe billing service initialized");
                Some(Arc::new(BillingService::new(stripe, store.clone())))
            }
            None => {
                tracing::warn!(
                    "Stripe billing not configured (missing STRIPE_SECRET_KEY) - outbound operations disabled"
                );
                None
            }
        };

        Self {
            config,
            store,
            webhooks,
            billing,
        }
    }

    /// Get billing service reference
    pub fn billing_service(&self) -> Option<&Arc<BillingService>> {
        self.billing.as_ref()
    }
}
