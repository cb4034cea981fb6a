//! # ShareFair Payment Adapters
//!
//! Payment provider connectivity layer with:
//! - Idempotent payment-intent creation
//! - HTTP connector for the card processor's REST API
//! - In-memory connector for tests and local runs
//! - Webhook signature verification and event parsing
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        Payment Gateway (engine)          │
//! └──────────┬───────────────────┬───────────┘
//!            │ create_intent     │ raw webhook
//! ┌──────────▼─────────┐ ┌───────▼───────────┐
//! │  PaymentProvider   │ │  WebhookVerifier  │
//! │  (HTTP | Mock)     │ │  + WebhookEvent   │
//! └────────────────────┘ └───────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod connector;
pub mod error;
pub mod http;
#[allow(missing_docs)]
pub mod metrics;
pub mod mock;
pub mod types;
pub mod webhook;

pub use connector::PaymentProvider;
pub use error::{Error, Result};
pub use http::{HttpPaymentProvider, HttpProviderConfig};
pub use mock::MockPaymentProvider;
pub use types::*;
pub use webhook::{WebhookEvent, WebhookEventKind, WebhookVerifier};

/// Default request timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Prefix of the idempotency key used for intent creation
pub const INTENT_IDEMPOTENCY_PREFIX: &str = "pi-create-";

/// Idempotency key for creating the intent of a transaction
pub fn intent_idempotency_key(transaction_id: impl std::fmt::Display) -> String {
    format!("{}{}", INTENT_IDEMPOTENCY_PREFIX, transaction_id)
}
