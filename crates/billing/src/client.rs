//! Stripe client wrapper and configuration

use std::time::Duration;

use crate::signature::WebhookVerifier;

/// Stripe credentials and webhook settings
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub webhook_tolerance: Duration,
    /// Override for the API base URL (tests point this at a mock server)
    pub api_base: Option<String>,
}

impl StripeConfig {
    pub fn verifier(&self) -> WebhookVerifier {
        WebhookVerifier::new(self.webhook_secret.clone(), self.webhook_tolerance)
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[redacted]")
            .field("webhook_secret", &"[redacted]")
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Shared handle to the Stripe API
#[derive(Clone)]
pub struct StripeClient {
    inner: stripe::Client,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = match &config.api_base {
            Some(base) => stripe::Client::from_url(base.as_str(), config.secret_key.clone()),
            None => stripe::Client::new(config.secret_key.clone()),
        };
        Self { inner }
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.inner
    }
}
