//! In-memory payment provider
//!
//! Honours idempotency keys the way a real processor does: a repeated key
//! returns the intent created by the first request.

use crate::{connector::PaymentProvider, types::*, Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Mock provider
#[derive(Debug, Default)]
pub struct MockPaymentProvider {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    sequence: AtomicU64,
    calls: AtomicU64,
    fail_next: AtomicBool,
}

impl MockPaymentProvider {
    /// Create empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next create-intent call fail with a provider error
    pub fn fail_next_request(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of create-intent calls received, including replays
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of distinct intents created
    pub fn intent_count(&self) -> usize {
        self.intents.lock().len()
    }

    /// Intent created for an idempotency key
    pub fn intent_for_key(&self, idempotency_key: &str) -> Option<PaymentIntent> {
        self.intents.lock().get(idempotency_key).cloned()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Mock
    }

    async fn create_intent(&self, request: &CreateIntentRequest) -> Result<PaymentIntent> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::ProviderApi {
                status_code: 503,
                message: "mock provider unavailable".to_string(),
            });
        }

        let mut intents = self.intents.lock();
        if let Some(existing) = intents.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let intent = PaymentIntent {
            id: format!("pi_mock_{:06}", n),
            client_secret: format!("pi_mock_{:06}_secret", n),
            amount: request.amount_minor,
            currency: request.currency.clone(),
            status: Some("requires_payment_method".to_string()),
        };
        intents.insert(request.idempotency_key.clone(), intent.clone());
        Ok(intent)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
