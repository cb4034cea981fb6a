//! Rental engine binary
//!
//! Opens the ledger and wires the engine with in-process collaborators. At
//! startup it logs the effective settings and a community carbon report read
//! back through the engine, then runs until interrupted.

use anyhow::Context;
use payment_adapters::{HttpPaymentProvider, MockPaymentProvider, PaymentProvider};
use rental_engine::{
    memory::{
        InMemoryListings, InMemoryReviews, InMemoryUsers, RecordingNotifier, StaticFeeSchedule,
    },
    Collaborators, Config, RentalEngine,
};
use rental_ledger::{LedgerStore, Storage};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting ShareFair rental engine");

    // Load configuration
    let config = match std::env::var("RENTAL_ENGINE_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => Config::from_env()?,
    };

    // Open ledger
    let storage = Arc::new(Storage::open(&config.ledger)?);
    let stats = storage.get_stats()?;
    tracing::info!(
        transactions = stats.total_transactions,
        carbon_records = stats.total_carbon_records,
        policies = stats.total_policies,
        disputes = stats.total_disputes,
        "Ledger opened"
    );

    let provider: Arc<dyn PaymentProvider> = if config.payment.provider.secret_key.is_empty() {
        tracing::warn!("No payment secret key configured; using the mock provider");
        Arc::new(MockPaymentProvider::new())
    } else {
        Arc::new(HttpPaymentProvider::new(config.payment.provider.clone())?)
    };

    let collaborators = Collaborators {
        listings: Arc::new(InMemoryListings::new()),
        users: Arc::new(InMemoryUsers::new()),
        reviews: Arc::new(InMemoryReviews::new()),
        fees: Arc::new(StaticFeeSchedule::new(None)),
        notifications: Arc::new(RecordingNotifier::new()),
    };

    let store: Arc<dyn LedgerStore> = storage.clone();
    let engine = RentalEngine::new(config, store, collaborators, provider)?;

    let config = engine.config();
    tracing::info!(
        service = %config.service_name,
        currency = %config.payment.currency,
        default_fee_pct = %config.fees.default_percentage,
        "Rental engine ready"
    );

    // Ledger sanity check through the engine's own read path
    let report = engine.carbon.community_report().await?;
    tracing::info!(
        carbon_saved_kg = %report.total_carbon_saved_kg,
        completed = report.total_completed_transactions,
        active_users = report.total_active_users,
        "Community carbon report"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down rental engine");
    drop(engine);
    match Arc::try_unwrap(storage) {
        Ok(storage) => storage.close()?,
        Err(_) => tracing::warn!("Ledger still referenced at shutdown; skipping close"),
    }
    Ok(())
}
