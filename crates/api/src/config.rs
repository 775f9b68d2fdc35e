//! Server configuration

use std::time::Duration;

use paysync_billing::{StripeConfig, WebhookVerifier, DEFAULT_TOLERANCE};
use thiserror::Error;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_SIGNATURE_HEADER: &str = "stripe-signature";
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone)]
pub struct Config {
    /// Postgres URL; the in-memory store is used when absent
    pub database_url: Option<String>,
    pub bind_address: String,
    /// Needed only for outbound operations
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: String,
    pub webhook_tolerance: Duration,
    pub signature_header: String,
    pub store_timeout: Duration,
    pub run_migrations: bool,
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match optional(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
        }),
        None => Ok(default),
    }
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match optional(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value: raw }),
        },
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let stripe_webhook_secret =
            optional("STRIPE_WEBHOOK_SECRET").ok_or(ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))?;

        Ok(Self {
            database_url: optional("DATABASE_URL"),
            bind_address: optional("BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            stripe_secret_key: optional("STRIPE_SECRET_KEY"),
            stripe_webhook_secret,
            webhook_tolerance: Duration::from_secs(parse_u64(
                "WEBHOOK_TOLERANCE_SECS",
                DEFAULT_TOLERANCE.as_secs(),
            )?),
            signature_header: optional("WEBHOOK_SIGNATURE_HEADER")
                .map(|h| h.trim().to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_SIGNATURE_HEADER.to_string()),
            store_timeout: Duration::from_millis(parse_u64(
                "STORE_TIMEOUT_MS",
                DEFAULT_STORE_TIMEOUT_MS,
            )?),
            run_migrations: parse_bool("RUN_MIGRATIONS", true)?,
        })
    }

    pub fn webhook_verifier(&self) -> WebhookVerifier {
        WebhookVerifier::new(self.stripe_webhook_secret.clone(), self.webhook_tolerance)
    }

    /// Stripe settings for outbound calls, if a secret key is configured
    pub fn stripe(&self) -> Option<StripeConfig> {
        self.stripe_secret_key.as_ref().map(|secret_key| StripeConfig {
            secret_key: secret_key.clone(),
            webhook_secret: self.stripe_webhook_secret.clone(),
            webhook_tolerance: self.webhook_tolerance,
            api_base: None,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("bind_address", &self.bind_address)
            .field("stripe_secret_key", &self.stripe_secret_key.as_ref().map(|_| "[redacted]"))
            .field("stripe_webhook_secret", &"[redacted]")
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("signature_header", &self.signature_header)
            .field("store_timeout", &self.store_timeout)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}
