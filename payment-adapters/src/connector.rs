//! Payment provider interface

use crate::{types::*, Result};
use async_trait::async_trait;

/// Payment provider trait
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Get provider type
    fn provider_type(&self) -> ProviderType;

    /// Create a payment intent.
    ///
    /// Repeating a request with the same idempotency key must return the
    /// intent created by the first call.
    async fn create_intent(&self, request: &CreateIntentRequest) -> Result<PaymentIntent>;

    /// Health check
    async fn health_check(&self) -> Result<()>;

    /// Get provider name
    fn name(&self) -> &str;
}
