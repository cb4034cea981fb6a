//! Webhook authentication and event parsing
//!
//! The provider signs each delivery with HMAC-SHA256 over `"{t}.{raw body}"`
//! and sends the result in a header of the form
//! `t=<unix seconds>,v1=<hex digest>[,v1=<hex digest>...]`.
//! A delivery is accepted when any `v1` digest matches and `t` is within the
//! configured tolerance of the current time.

use crate::{metrics::WEBHOOK_VERIFICATIONS_TOTAL, Error, Result};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Event type for a confirmed charge
pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";

/// Event type for a failed charge
pub const EVENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";

/// Default accepted clock skew between provider and us (seconds)
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

/// Parsed signature header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Signing timestamp (unix seconds)
    pub timestamp: i64,
    /// Candidate `v1` digests
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parse `t=...,v1=...` header
    pub fn parse(header: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        Error::SignatureInvalid("timestamp is not an integer".into())
                    })?)
                }
                "v1" => {
                    // Undecodable candidates simply never match
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| Error::SignatureInvalid("missing timestamp".into()))?;
        if signatures.is_empty() {
            return Err(Error::SignatureInvalid("missing v1 signature".into()));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Verifies webhook deliveries against the shared secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance_seconds: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_seconds", &self.tolerance_seconds)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    /// Create verifier for a shared secret
    pub fn new(secret: impl Into<Vec<u8>>, tolerance_seconds: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_seconds,
        }
    }

    /// Verify a delivery against the current time
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<()> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    /// Verify a delivery against an explicit clock
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<()> {
        let result = self.check(payload, header, now);
        let outcome = if result.is_ok() { "valid" } else { "invalid" };
        WEBHOOK_VERIFICATIONS_TOTAL
            .with_label_values(&[outcome])
            .inc();
        if let Err(e) = &result {
            warn!(error = %e, "Rejected webhook delivery");
        }
        result
    }

    fn check(&self, payload: &[u8], header: &str, now: i64) -> Result<()> {
        if self.secret.is_empty() {
            return Err(Error::SignatureInvalid("webhook secret not configured".into()));
        }

        let parsed = SignatureHeader::parse(header)?;

        if (now - parsed.timestamp).abs() > self.tolerance_seconds {
            return Err(Error::SignatureInvalid(
                "timestamp outside the tolerance zone".into(),
            ));
        }

        let matched = parsed.signatures.iter().any(|candidate| {
            let mut mac = match self.mac() {
                Ok(mac) => mac,
                Err(_) => return false,
            };
            mac.update(parsed.timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload);
            // Constant-time comparison
            mac.verify_slice(candidate).is_ok()
        });

        if matched {
            Ok(())
        } else {
            Err(Error::SignatureInvalid("no matching signature".into()))
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::Config(format!("invalid webhook secret: {}", e)))
    }

    /// Produce a signature header for `payload` at `timestamp`
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let digest = hex::encode(mac.finalize().into_bytes());
        Ok(format!("t={},v1={}", timestamp, digest))
    }
}

/// Kind of provider event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    /// Charge confirmed
    PaymentSucceeded,
    /// Charge failed
    PaymentFailed,
    /// Any other event type
    Other(String),
}

impl WebhookEventKind {
    /// Classify a raw event type
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            EVENT_PAYMENT_SUCCEEDED => WebhookEventKind::PaymentSucceeded,
            EVENT_PAYMENT_FAILED => WebhookEventKind::PaymentFailed,
            other => WebhookEventKind::Other(other.to_string()),
        }
    }
}

/// Provider event, reduced to what settlement needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    /// Provider event ID
    pub id: String,
    /// Event kind
    pub kind: WebhookEventKind,
    /// Intent the event refers to
    pub intent_id: Option<String>,
    /// `transactionId` metadata echoed back from intent creation
    pub transaction_id: Option<String>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<RawEventData>,
}

#[derive(Deserialize)]
struct RawEventData {
    object: RawEventObject,
}

#[derive(Deserialize)]
struct RawEventObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl WebhookEvent {
    /// Parse a raw event body
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let raw: RawEvent =
            serde_json::from_slice(payload).map_err(|e| Error::MalformedEvent(e.to_string()))?;

        let (intent_id, transaction_id) = match raw.data {
            Some(data) => {
                let mut metadata = data.object.metadata;
                (data.object.id, metadata.remove("transactionId"))
            }
            None => (None, None),
        };

        Ok(Self {
            id: raw.id,
            kind: WebhookEventKind::from_type(&raw.event_type),
            intent_id,
            transaction_id,
        })
    }
}
