//! Payment gateway
//!
//! Creates provider intents for PENDING transactions and settles them from
//! signed provider webhooks. Webhook deliveries are at-least-once and may
//! arrive in any order; every event is applied through the state machine,
//! so redeliveries are no-ops.

use crate::{
    collaborators::Notifier,
    metrics::{PAYMENT_INTENTS_TOTAL, WEBHOOK_EVENTS_TOTAL},
    projections::Projector,
    state::{PaymentOutcome, PaymentUpdate, TransactionStateMachine},
    Error, Result,
};
use payment_adapters::{
    intent_idempotency_key, CreateIntentRequest, PaymentProvider, WebhookEvent, WebhookEventKind,
    WebhookVerifier,
};
use rental_ledger::{to_minor_units, Currency, LedgerStore, Transaction, TransactionStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Title used in payment notifications when the listing cannot be resolved
const FALLBACK_ITEM_TITLE: &str = "the item";

/// Client-facing handle for completing a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    /// Provider intent ID
    pub intent_id: String,
    /// Secret the client confirms the payment with
    pub client_secret: String,
    /// Amount in minor units
    pub amount: i64,
    /// Lowercase currency code
    pub currency: String,
}

/// What a webhook delivery did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Payment state changed
    Applied,
    /// Already applied earlier, or superseded by a settled payment
    Duplicate,
    /// Event type or target not handled
    Ignored,
}

/// Payment gateway
pub struct PaymentGateway {
    store: Arc<dyn LedgerStore>,
    state: Arc<TransactionStateMachine>,
    provider: Arc<dyn PaymentProvider>,
    verifier: WebhookVerifier,
    currency: Currency,
    projector: Projector,
    notifier: Notifier,
}

impl std::fmt::Debug for PaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateway")
            .field("provider", &self.provider.name())
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

impl PaymentGateway {
    /// Create gateway
    pub fn new(
        store: Arc<dyn LedgerStore>,
        state: Arc<TransactionStateMachine>,
        provider: Arc<dyn PaymentProvider>,
        verifier: WebhookVerifier,
        currency: Currency,
        projector: Projector,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            state,
            provider,
            verifier,
            currency,
            projector,
            notifier,
        }
    }

    /// Create (or replay) the provider intent for a transaction.
    ///
    /// The idempotency key is derived from the transaction ID, so repeated
    /// calls yield the same intent.
    pub async fn create_payment_intent(
        &self,
        transaction_id: Uuid,
        requester_id: Uuid,
    ) -> Result<PaymentIntentResponse> {
        let tx = self.store.get_transaction(transaction_id)?;

        if tx.borrower_id != requester_id {
            return Err(Error::Forbidden(
                "Only the borrower can pay for this transaction".into(),
            ));
        }
        if tx.status != TransactionStatus::Pending {
            return Err(Error::InvalidTransition(
                "Transaction is not in PENDING status".into(),
            ));
        }
        if tx.total_amount <= Decimal::ZERO {
            return Err(Error::InvalidArgument(
                "Payment is not required for free transactions".into(),
            ));
        }
        let amount_minor = to_minor_units(tx.total_amount)
            .ok_or_else(|| Error::InvalidArgument("Amount out of range".into()))?;

        let request = CreateIntentRequest {
            amount_minor,
            currency: self.currency.provider_code(),
            metadata: Self::intent_metadata(&tx),
            idempotency_key: intent_idempotency_key(transaction_id),
        };

        let intent = match self.provider.create_intent(&request).await {
            Ok(intent) => intent,
            Err(e) => {
                PAYMENT_INTENTS_TOTAL.with_label_values(&["failed"]).inc();
                error!(
                    %transaction_id,
                    provider = self.provider.name(),
                    error = %e,
                    "Payment intent creation failed"
                );
                return Err(Error::ExternalService(format!(
                    "Payment processing error: {}",
                    e
                )));
            }
        };
        PAYMENT_INTENTS_TOTAL.with_label_values(&["created"]).inc();

        self.state
            .mark_payment_processing(transaction_id, &intent.id)?;

        info!(
            %transaction_id,
            intent_id = %intent.id,
            amount_minor,
            currency = %self.currency,
            "Payment intent created"
        );

        Ok(PaymentIntentResponse {
            intent_id: intent.id,
            client_secret: intent.client_secret,
            amount: intent.amount,
            currency: intent.currency,
        })
    }

    fn intent_metadata(tx: &Transaction) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert("transactionId".to_string(), tx.id.to_string());
        metadata.insert("borrowerId".to_string(), tx.borrower_id.to_string());
        metadata.insert("ownerId".to_string(), tx.owner_id.to_string());
        metadata
    }

    /// Verify and apply a raw provider webhook
    pub async fn handle_webhook_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookOutcome> {
        if let Err(e) = self.verifier.verify(payload, signature_header) {
            WEBHOOK_EVENTS_TOTAL
                .with_label_values(&["unknown", "rejected"])
                .inc();
            return Err(e.into());
        }

        let event = WebhookEvent::parse(payload)?;
        let (event_type, outcome) = match &event.kind {
            WebhookEventKind::PaymentSucceeded => ("payment_succeeded", PaymentOutcome::Succeeded),
            WebhookEventKind::PaymentFailed => ("payment_failed", PaymentOutcome::Failed),
            WebhookEventKind::Other(other) => {
                debug!(event_id = %event.id, event_type = %other, "Ignoring webhook event");
                WEBHOOK_EVENTS_TOTAL
                    .with_label_values(&["other", "ignored"])
                    .inc();
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let result = self.settle(&event, outcome).await?;
        WEBHOOK_EVENTS_TOTAL
            .with_label_values(&[
                event_type,
                match result {
                    WebhookOutcome::Applied => "applied",
                    WebhookOutcome::Duplicate => "duplicate",
                    WebhookOutcome::Ignored => "ignored",
                },
            ])
            .inc();
        Ok(result)
    }

    async fn settle(&self, event: &WebhookEvent, outcome: PaymentOutcome) -> Result<WebhookOutcome> {
        let transaction_id = match event
            .transaction_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok())
        {
            Some(id) => id,
            None => {
                warn!(
                    event_id = %event.id,
                    "Webhook event without a usable transactionId"
                );
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let applied =
            self.state
                .apply_payment_outcome(transaction_id, outcome, event.intent_id.as_deref());
        let (tx, update) = match applied {
            Ok(result) => result,
            Err(Error::NotFound(_)) => {
                warn!(
                    event_id = %event.id,
                    %transaction_id,
                    "Webhook event for an unknown transaction"
                );
                return Ok(WebhookOutcome::Ignored);
            }
            Err(e) => return Err(e),
        };

        match update {
            PaymentUpdate::Duplicate | PaymentUpdate::Stale => {
                debug!(event_id = %event.id, %transaction_id, ?update, "Webhook already settled");
                Ok(WebhookOutcome::Duplicate)
            }
            PaymentUpdate::Applied { activated } => {
                info!(
                    event_id = %event.id,
                    %transaction_id,
                    payment_status = %tx.payment_status,
                    activated,
                    "Payment settled from webhook"
                );
                let title = self
                    .projector
                    .listing_title(tx.listing_id)
                    .await
                    .unwrap_or_else(|| FALLBACK_ITEM_TITLE.to_string());
                match outcome {
                    PaymentOutcome::Succeeded => {
                        for user_id in [tx.borrower_id, tx.owner_id] {
                            self.notifier
                                .status_change(user_id, TransactionStatus::Active.as_str(), &title, tx.id)
                                .await;
                        }
                    }
                    PaymentOutcome::Failed => {
                        self.notifier
                            .status_change(tx.borrower_id, "PAYMENT_FAILED", &title, tx.id)
                            .await;
                    }
                }
                Ok(WebhookOutcome::Applied)
            }
        }
    }
}
