//! Rental engine
//!
//! Wires the components over one ledger store and one state machine.

use crate::{
    carbon::CarbonAccountant,
    collaborators::{Collaborators, Notifier},
    config::Config,
    dispute::DisputeManager,
    insurance::InsuranceManager,
    orchestrator::TransactionOrchestrator,
    payment::PaymentGateway,
    projections::Projector,
    state::TransactionStateMachine,
    trust::TrustEvaluator,
    Result,
};
use payment_adapters::{PaymentProvider, WebhookVerifier};
use rental_ledger::LedgerStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Transaction lifecycle and settlement engine
#[derive(Debug)]
pub struct RentalEngine {
    /// Request, accept, cancel, complete
    pub orchestrator: TransactionOrchestrator,

    /// Intents and webhooks
    pub payments: PaymentGateway,

    /// Carbon records and reports
    pub carbon: Arc<CarbonAccountant>,

    /// Trust scores
    pub trust: Arc<TrustEvaluator>,

    /// Policies and claims
    pub insurance: InsuranceManager,

    /// Disputes
    pub disputes: DisputeManager,

    /// Status writer shared by every component
    pub state: Arc<TransactionStateMachine>,

    config: Config,
}

impl RentalEngine {
    /// Create engine
    pub fn new(
        config: Config,
        store: Arc<dyn LedgerStore>,
        collaborators: Collaborators,
        provider: Arc<dyn PaymentProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let currency = config.payment.currency()?;

        if config.payment.webhook_secret.is_empty() {
            warn!("No webhook secret configured; every webhook will be rejected");
        }

        let state = Arc::new(TransactionStateMachine::new(store.clone()));
        let notifier = Notifier::new(collaborators.notifications.clone());
        let projector = Projector::new(collaborators.listings.clone(), collaborators.users.clone());

        let carbon = Arc::new(CarbonAccountant::new(
            store.clone(),
            collaborators.listings.clone(),
            collaborators.users.clone(),
            config.carbon.clone(),
        ));
        let trust = Arc::new(TrustEvaluator::new(
            store.clone(),
            collaborators.users.clone(),
            collaborators.reviews.clone(),
            config.trust.clone(),
        ));

        let orchestrator = TransactionOrchestrator::new(
            store.clone(),
            state.clone(),
            collaborators.listings.clone(),
            collaborators.fees.clone(),
            carbon.clone(),
            trust.clone(),
            projector.clone(),
            notifier.clone(),
            config.fees.clone(),
        );

        let payments = PaymentGateway::new(
            store.clone(),
            state.clone(),
            provider.clone(),
            WebhookVerifier::new(
                config.payment.webhook_secret.as_bytes(),
                config.payment.webhook_tolerance_seconds,
            ),
            currency,
            projector.clone(),
            notifier.clone(),
        );

        let insurance = InsuranceManager::new(
            store.clone(),
            notifier.clone(),
            projector.clone(),
            config.insurance.clone(),
        );

        let disputes = DisputeManager::new(store, state.clone(), notifier, projector);

        info!(
            service = %config.service_name,
            provider = provider.name(),
            %currency,
            "Rental engine ready"
        );

        Ok(Self {
            orchestrator,
            payments,
            carbon,
            trust,
            insurance,
            disputes,
            state,
            config,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }
}
