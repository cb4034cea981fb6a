//! Repository interface over the ledger
//!
//! Engine components depend on this trait, never on RocksDB directly. Every
//! call reads or writes through to storage; implementations keep no cache.
//!
//! Uniqueness rules are enforced here, atomically:
//! - at most one set of carbon records per transaction
//! - at most one insurance policy per transaction
//! - at most one OPEN/UNDER_REVIEW dispute per transaction
//!
//! A dispute lands together with its transaction row, and a claim together
//! with its policy row.

use crate::{
    types::{
        CarbonRecord, Dispute, InsuranceClaim, InsurancePolicy, Transaction, TransactionStatus,
        TrustScore,
    },
    Result,
};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Repository-shaped access to every ledger entity
pub trait LedgerStore: Send + Sync {
    // Transactions

    /// Insert a new transaction with its party indices
    fn put_transaction(&self, tx: &Transaction) -> Result<()>;

    /// Overwrite an existing transaction row
    fn update_transaction(&self, tx: &Transaction) -> Result<()>;

    /// Get transaction by ID (`NotFound` if absent)
    fn get_transaction(&self, id: Uuid) -> Result<Transaction>;

    /// Transactions where the user is the borrower
    fn transactions_by_borrower(&self, user_id: Uuid) -> Result<Vec<Transaction>>;

    /// Transactions where the user is the owner
    fn transactions_by_owner(&self, user_id: Uuid) -> Result<Vec<Transaction>>;

    /// COMPLETED transactions as borrower plus COMPLETED as owner
    fn count_completed_for_user(&self, user_id: Uuid) -> Result<u32> {
        let as_borrower = self
            .transactions_by_borrower(user_id)?
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Completed)
            .count();
        let as_owner = self
            .transactions_by_owner(user_id)?
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Completed)
            .count();
        Ok((as_borrower + as_owner) as u32)
    }

    /// Count all transactions in the given status
    fn count_transactions_with_status(&self, status: TransactionStatus) -> Result<u64>;

    // Carbon

    /// Insert the carbon records of a transaction.
    ///
    /// Returns `false` without writing anything if records already exist for
    /// `transaction_id`.
    fn insert_carbon_records(&self, transaction_id: Uuid, records: &[CarbonRecord]) -> Result<bool>;

    /// Records created for a transaction
    fn carbon_by_transaction(&self, transaction_id: Uuid) -> Result<Vec<CarbonRecord>>;

    /// Records credited to a user
    fn carbon_by_user(&self, user_id: Uuid) -> Result<Vec<CarbonRecord>>;

    /// Sum of all carbon credited to a user
    fn carbon_total_for_user(&self, user_id: Uuid) -> Result<Decimal> {
        Ok(self
            .carbon_by_user(user_id)?
            .iter()
            .map(|r| r.carbon_saved_kg)
            .sum())
    }

    /// Top users by total carbon saved, descending
    fn carbon_leaderboard(&self, limit: usize) -> Result<Vec<(Uuid, Decimal)>>;

    /// Sum of carbon over all records
    fn carbon_community_total(&self) -> Result<Decimal>;

    // Trust

    /// Insert or replace a user's trust score
    fn upsert_trust_score(&self, score: &TrustScore) -> Result<()>;

    /// Stored trust score, if any
    fn get_trust_score(&self, user_id: Uuid) -> Result<Option<TrustScore>>;

    // Insurance

    /// Insert a policy (`Conflict` if the transaction already has one)
    fn insert_policy(&self, policy: &InsurancePolicy) -> Result<()>;

    /// Get policy by ID (`NotFound` if absent)
    fn get_policy(&self, id: Uuid) -> Result<InsurancePolicy>;

    /// Policy for a transaction, if any
    fn policy_by_transaction(&self, transaction_id: Uuid) -> Result<Option<InsurancePolicy>>;

    /// Overwrite an existing policy row
    fn update_policy(&self, policy: &InsurancePolicy) -> Result<()>;

    /// Insert a claim and overwrite its policy row in one atomic write
    fn insert_claim(&self, claim: &InsuranceClaim, policy: &InsurancePolicy) -> Result<()>;

    /// Get claim by ID (`NotFound` if absent)
    fn get_claim(&self, id: Uuid) -> Result<InsuranceClaim>;

    /// Claims filed against a policy, oldest first
    fn claims_by_policy(&self, policy_id: Uuid) -> Result<Vec<InsuranceClaim>>;

    /// Overwrite an existing claim row
    fn update_claim(&self, claim: &InsuranceClaim) -> Result<()>;

    // Disputes

    /// Insert a dispute and overwrite its transaction row in one atomic write
    /// (`Conflict` if the transaction has an open one)
    fn insert_dispute(&self, dispute: &Dispute, transaction: &Transaction) -> Result<()>;

    /// Get dispute by ID (`NotFound` if absent)
    fn get_dispute(&self, id: Uuid) -> Result<Dispute>;

    /// Disputes over a transaction, oldest first
    fn disputes_by_transaction(&self, transaction_id: Uuid) -> Result<Vec<Dispute>>;

    /// Disputes filed by a user, oldest first
    fn disputes_by_reporter(&self, reporter_id: Uuid) -> Result<Vec<Dispute>>;

    /// Overwrite an existing dispute row
    fn update_dispute(&self, dispute: &Dispute) -> Result<()>;
}
