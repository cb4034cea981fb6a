//! ShareFair Rental Ledger
//!
//! Durable store for rental transactions and everything hanging off them:
//! carbon records, trust scores, insurance policies and claims, disputes.
//!
//! # Architecture
//!
//! - **Write-through**: every engine operation reads and writes via [`LedgerStore`]
//! - **Column families**: one per entity plus a shared index family
//! - **Atomic guards**: uniqueness checks and their inserts share one write lock
//!
//! # Invariants
//!
//! - Money amounts are `Decimal`, rounded half-up to cents
//! - At most one carbon record set and one policy per transaction
//! - At most one open dispute per transaction

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod storage;
pub mod store;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use storage::{Storage, StorageStats};
pub use store::LedgerStore;
pub use types::{
    rental_days, round_money, to_minor_units, CarbonRecord, ClaimStatus, CoverageType, Currency, Dispute,
    DisputeReason, DisputeStatus, InsuranceClaim, InsurancePolicy, PaymentStatus, PolicyStatus,
    Transaction, TransactionStatus, TrustScore, TrustTier,
};
