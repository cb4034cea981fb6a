//! Shared types for payment provider adapters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    /// Card processor reached over its REST API
    Http,
    /// In-process mock
    Mock,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Http => write!(f, "HTTP"),
            ProviderType::Mock => write!(f, "MOCK"),
        }
    }
}

/// Create-intent request (to send to the provider)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIntentRequest {
    /// Amount in minor units (cents)
    pub amount_minor: i64,
    /// Lowercase currency code
    pub currency: String,
    /// Metadata echoed back on webhook events
    pub metadata: BTreeMap<String, String>,
    /// Idempotency key, stable across client retries
    pub idempotency_key: String,
}

/// Payment intent (from the provider)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Provider intent ID
    pub id: String,
    /// Secret handed to the client to confirm the payment
    pub client_secret: String,
    /// Amount in minor units
    pub amount: i64,
    /// Lowercase currency code
    pub currency: String,
    /// Provider-side status string
    #[serde(default)]
    pub status: Option<String>,
}
