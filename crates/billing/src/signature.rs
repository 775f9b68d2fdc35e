//! Webhook signature verification
//!
//! The processor signs each delivery with HMAC-SHA256 over
//! `"<timestamp>." ++ <raw body>` and sends the result in a header of the
//! form `t=<timestamp>,v1=<hex>[,v1=<hex>...]`. Verification must run on the
//! exact bytes received. Re-serializing a parsed body changes key order and
//! whitespace and breaks the signature.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Default allowed clock skew between the signed timestamp and now
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Parsed `t=...,v1=...` header
#[derive(Debug, PartialEq, Eq)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                // A malformed entry is skipped; a later valid one may still match
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        WebhookError::Authentication("Unable to extract timestamp from header".to_string())
    })?;

    if signatures.is_empty() {
        return Err(WebhookError::Authentication(
            "No v1 signatures found in header".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> Result<Vec<u8>, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::Authentication("Invalid webhook secret".to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify a signed payload against the signature header.
///
/// `now` is the current unix time in seconds. Fails closed: every path that
/// is not a positive match returns [`WebhookError::Authentication`].
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance: Duration,
    now: i64,
) -> Result<(), WebhookError> {
    if secret.is_empty() {
        return Err(WebhookError::Authentication(
            "Webhook secret is not configured".to_string(),
        ));
    }

    let header = header
        .ok_or_else(|| WebhookError::Authentication("Missing signature header".to_string()))?;
    let parsed = parse_header(header)?;

    let skew = now.saturating_sub(parsed.timestamp).unsigned_abs();
    if skew > tolerance.as_secs() {
        tracing::warn!(
            timestamp = parsed.timestamp,
            now = now,
            skew_secs = skew,
            "Webhook timestamp outside tolerance"
        );
        return Err(WebhookError::Authentication(
            "Timestamp outside the tolerance zone".to_string(),
        ));
    }

    let expected = compute_signature(payload, secret, parsed.timestamp)?;
    let matched = parsed
        .signatures
        .iter()
        .any(|candidate| bool::from(candidate.as_slice().ct_eq(&expected)));

    if !matched {
        return Err(WebhookError::Authentication(
            "No signatures found matching the expected signature for payload".to_string(),
        ));
    }

    Ok(())
}

/// Build a valid signature header for `payload`, as the processor would
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, WebhookError> {
    let signature = compute_signature(payload, secret, timestamp)?;
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

pub(crate) fn unix_now() -> Result<i64, WebhookError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .map_err(|e| WebhookError::Authentication(format!("System time error: {}", e)))
}

/// Verifier bound to a shared secret and tolerance
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), WebhookError> {
        self.verify_at(payload, header, unix_now()?)
    }

    /// Verify against a caller-supplied clock, in unix seconds
    pub fn verify_at(&self, payload: &[u8], header: Option<&str>, now: i64) -> Result<(), WebhookError> {
        verify_signature(payload, header, &self.secret, self.tolerance, now)
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[redacted]")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}
