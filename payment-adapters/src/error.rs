//! Error types for payment adapters

use thiserror::Error;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter errors
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Provider API error
    #[error("Payment provider error {status_code}: {message}")]
    ProviderApi {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },

    /// Webhook signature did not verify
    #[error("Invalid webhook signature: {0}")]
    SignatureInvalid(String),

    /// Webhook body is not a provider event
    #[error("Malformed webhook event: {0}")]
    MalformedEvent(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
