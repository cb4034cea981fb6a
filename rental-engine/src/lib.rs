//! ShareFair Rental Engine
//!
//! Transaction lifecycle and settlement for peer-to-peer rentals.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            │         RentalEngine         │
//!            └──┬──────┬──────┬──────┬──────┘
//!   orchestrator│  payments   insurance   disputes
//!               │      │                     │
//!        ┌──────▼──────▼─────────────────────▼──┐
//!        │      TransactionStateMachine         │
//!        └──────────────────┬───────────────────┘
//!   carbon, trust           │
//!        ┌──────────────────▼───────────────────┐
//!        │        LedgerStore (RocksDB)         │
//!        └──────────────────────────────────────┘
//! ```
//!
//! - **Single status writer**: actor transitions and system events (payment
//!   confirmed, dispute opened) both go through [`state::TransactionStateMachine`]
//! - **Idempotent settlement**: webhook redeliveries, repeated intent requests
//!   and repeated completions leave the ledger unchanged
//! - **Fire-and-forget notifications**: sink failures never roll back state
//!
//! # Invariants
//!
//! - `total = daily rate x max(1, days)`, fee and premiums rounded half-up to cents
//! - One carbon record pair and at most one policy per transaction
//! - At most one open dispute per transaction

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod carbon;
pub mod collaborators;
pub mod config;
pub mod dispute;
pub mod engine;
pub mod error;
pub mod insurance;
pub mod memory;
#[allow(missing_docs)]
pub mod metrics;
pub mod orchestrator;
pub mod payment;
#[allow(missing_docs)]
pub mod projections;
pub mod state;
pub mod trust;

// Re-exports
pub use carbon::{CarbonAccountant, CommunityReport, LeaderboardEntry};
pub use collaborators::{
    Collaborators, FeeSchedule, ListingDirectory, ListingInfo, NotificationSink, Notifier,
    ReviewSource, UserDirectory, UserInfo, VerificationStatus,
};
pub use config::Config;
pub use dispute::DisputeManager;
pub use engine::RentalEngine;
pub use error::{Error, Result};
pub use insurance::{quote, InsuranceManager, Quote};
pub use orchestrator::{price_rental, Pricing, TransactionOrchestrator};
pub use payment::{PaymentGateway, PaymentIntentResponse, WebhookOutcome};
pub use projections::{ClaimView, DisputeView, TransactionView};
pub use state::{PaymentOutcome, PaymentUpdate, SystemEvent, TransactionStateMachine};
pub use trust::{TrustEvaluator, TrustPolicy};
