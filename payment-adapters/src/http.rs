//! HTTP payment provider connector
//!
//! Talks to a card processor exposing a form-encoded REST API:
//! `POST {api_base_url}/v1/payment_intents` with bearer authentication and an
//! `Idempotency-Key` header.

use crate::{
    connector::PaymentProvider,
    metrics::{PROVIDER_REQUESTS_TOTAL, PROVIDER_REQUEST_DURATION},
    types::*,
    Error, Result,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// HTTP provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpProviderConfig {
    /// API base URL
    pub api_base_url: String,
    /// Secret API key
    pub secret_key: String,
    /// Timeout
    pub timeout_seconds: u64,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.stripe.com".to_string(),
            secret_key: String::new(),
            timeout_seconds: crate::DEFAULT_REQUEST_TIMEOUT_SECONDS,
        }
    }
}

/// HTTP connector
#[derive(Debug)]
pub struct HttpPaymentProvider {
    config: HttpProviderConfig,
    client: Client,
}

impl HttpPaymentProvider {
    /// Create new HTTP connector
    pub fn new(config: HttpProviderConfig) -> Result<Self> {
        if config.secret_key.is_empty() {
            return Err(Error::Config("payment provider secret key is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn form_fields(request: &CreateIntentRequest) -> Vec<(String, String)> {
        let mut fields = vec![
            ("amount".to_string(), request.amount_minor.to_string()),
            ("currency".to_string(), request.currency.clone()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        for (key, value) in &request.metadata {
            fields.push((format!("metadata[{}]", key), value.clone()));
        }
        fields
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Http
    }

    async fn create_intent(&self, request: &CreateIntentRequest) -> Result<PaymentIntent> {
        info!(
            idempotency_key = %request.idempotency_key,
            amount_minor = request.amount_minor,
            currency = %request.currency,
            "Creating payment intent"
        );

        let started = Instant::now();
        let result = self
            .client
            .post(self.endpoint("/v1/payment_intents"))
            .bearer_auth(&self.config.secret_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&Self::form_fields(request))
            .send()
            .await;

        PROVIDER_REQUEST_DURATION
            .with_label_values(&[self.name(), "create_intent"])
            .observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                PROVIDER_REQUESTS_TOTAL
                    .with_label_values(&[self.name(), "create_intent", "error"])
                    .inc();
                return Err(Error::Connection(e.to_string()));
            }
        };

        if response.status().is_success() {
            PROVIDER_REQUESTS_TOTAL
                .with_label_values(&[self.name(), "create_intent", "ok"])
                .inc();
            Ok(response.json::<PaymentIntent>().await?)
        } else {
            PROVIDER_REQUESTS_TOTAL
                .with_label_values(&[self.name(), "create_intent", "rejected"])
                .inc();

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            warn!(status, "Payment provider rejected create-intent");
            Err(Error::ProviderApi {
                status_code: status,
                message: body,
            })
        }
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint("/v1/balance"))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::ProviderApi {
                status_code: response.status().as_u16(),
                message: "health check failed".to_string(),
            })
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}
