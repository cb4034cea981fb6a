//! Shared harness for engine integration tests

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, Utc};
use payment_adapters::{MockPaymentProvider, WebhookVerifier};
use rental_engine::{
    memory::{
        InMemoryListings, InMemoryReviews, InMemoryUsers, RecordingNotifier, StaticFeeSchedule,
    },
    Collaborators, Config, ListingInfo, RentalEngine, UserInfo, VerificationStatus,
};
use rental_ledger::{
    CarbonRecord, Dispute, InsuranceClaim, InsurancePolicy, LedgerStore, Storage, Transaction,
    TransactionStatus, TrustScore,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Ledger wrapper that fails selected operations on demand
pub struct FaultyStore {
    inner: Storage,
    pub fail_transaction_updates: AtomicBool,
    pub fail_dispute_inserts: AtomicBool,
    pub fail_claim_inserts: AtomicBool,
    pub fail_claim_reads: AtomicBool,
}

impl FaultyStore {
    fn new(inner: Storage) -> Self {
        Self {
            inner,
            fail_transaction_updates: AtomicBool::new(false),
            fail_dispute_inserts: AtomicBool::new(false),
            fail_claim_inserts: AtomicBool::new(false),
            fail_claim_reads: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool) -> rental_ledger::Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(rental_ledger::Error::Storage("injected storage failure".into()));
        }
        Ok(())
    }
}

impl LedgerStore for FaultyStore {
    fn put_transaction(&self, tx: &Transaction) -> rental_ledger::Result<()> {
        self.inner.put_transaction(tx)
    }

    fn update_transaction(&self, tx: &Transaction) -> rental_ledger::Result<()> {
        Self::check(&self.fail_transaction_updates)?;
        self.inner.update_transaction(tx)
    }

    fn get_transaction(&self, id: Uuid) -> rental_ledger::Result<Transaction> {
        self.inner.get_transaction(id)
    }

    fn transactions_by_borrower(&self, user_id: Uuid) -> rental_ledger::Result<Vec<Transaction>> {
        self.inner.transactions_by_borrower(user_id)
    }

    fn transactions_by_owner(&self, user_id: Uuid) -> rental_ledger::Result<Vec<Transaction>> {
        self.inner.transactions_by_owner(user_id)
    }

    fn count_transactions_with_status(&self, status: TransactionStatus) -> rental_ledger::Result<u64> {
        self.inner.count_transactions_with_status(status)
    }

    fn insert_carbon_records(
        &self,
        transaction_id: Uuid,
        records: &[CarbonRecord],
    ) -> rental_ledger::Result<bool> {
        self.inner.insert_carbon_records(transaction_id, records)
    }

    fn carbon_by_transaction(&self, transaction_id: Uuid) -> rental_ledger::Result<Vec<CarbonRecord>> {
        self.inner.carbon_by_transaction(transaction_id)
    }

    fn carbon_by_user(&self, user_id: Uuid) -> rental_ledger::Result<Vec<CarbonRecord>> {
        self.inner.carbon_by_user(user_id)
    }

    fn carbon_leaderboard(&self, limit: usize) -> rental_ledger::Result<Vec<(Uuid, Decimal)>> {
        self.inner.carbon_leaderboard(limit)
    }

    fn carbon_community_total(&self) -> rental_ledger::Result<Decimal> {
        self.inner.carbon_community_total()
    }

    fn upsert_trust_score(&self, score: &TrustScore) -> rental_ledger::Result<()> {
        self.inner.upsert_trust_score(score)
    }

    fn get_trust_score(&self, user_id: Uuid) -> rental_ledger::Result<Option<TrustScore>> {
        self.inner.get_trust_score(user_id)
    }

    fn insert_policy(&self, policy: &InsurancePolicy) -> rental_ledger::Result<()> {
        self.inner.insert_policy(policy)
    }

    fn get_policy(&self, id: Uuid) -> rental_ledger::Result<InsurancePolicy> {
        self.inner.get_policy(id)
    }

    fn policy_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> rental_ledger::Result<Option<InsurancePolicy>> {
        self.inner.policy_by_transaction(transaction_id)
    }

    fn update_policy(&self, policy: &InsurancePolicy) -> rental_ledger::Result<()> {
        self.inner.update_policy(policy)
    }

    fn insert_claim(
        &self,
        claim: &InsuranceClaim,
        policy: &InsurancePolicy,
    ) -> rental_ledger::Result<()> {
        Self::check(&self.fail_claim_inserts)?;
        self.inner.insert_claim(claim, policy)
    }

    fn get_claim(&self, id: Uuid) -> rental_ledger::Result<InsuranceClaim> {
        Self::check(&self.fail_claim_reads)?;
        self.inner.get_claim(id)
    }

    fn claims_by_policy(&self, policy_id: Uuid) -> rental_ledger::Result<Vec<InsuranceClaim>> {
        self.inner.claims_by_policy(policy_id)
    }

    fn update_claim(&self, claim: &InsuranceClaim) -> rental_ledger::Result<()> {
        self.inner.update_claim(claim)
    }

    fn insert_dispute(&self, dispute: &Dispute, transaction: &Transaction) -> rental_ledger::Result<()> {
        Self::check(&self.fail_dispute_inserts)?;
        self.inner.insert_dispute(dispute, transaction)
    }

    fn get_dispute(&self, id: Uuid) -> rental_ledger::Result<Dispute> {
        self.inner.get_dispute(id)
    }

    fn disputes_by_transaction(&self, transaction_id: Uuid) -> rental_ledger::Result<Vec<Dispute>> {
        self.inner.disputes_by_transaction(transaction_id)
    }

    fn disputes_by_reporter(&self, reporter_id: Uuid) -> rental_ledger::Result<Vec<Dispute>> {
        self.inner.disputes_by_reporter(reporter_id)
    }

    fn update_dispute(&self, dispute: &Dispute) -> rental_ledger::Result<()> {
        self.inner.update_dispute(dispute)
    }
}

/// Engine over a throwaway ledger with in-memory collaborators
pub struct TestEnvironment {
    pub engine: RentalEngine,
    pub store: Arc<dyn LedgerStore>,
    pub faults: Arc<FaultyStore>,
    pub listings: Arc<InMemoryListings>,
    pub users: Arc<InMemoryUsers>,
    pub reviews: Arc<InMemoryReviews>,
    pub fees: Arc<StaticFeeSchedule>,
    pub notifications: Arc<RecordingNotifier>,
    pub provider: Arc<MockPaymentProvider>,
    pub signer: WebhookVerifier,
    _temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(mut config: Config) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        config.ledger.data_dir = temp_dir.path().to_path_buf();
        config.payment.webhook_secret = WEBHOOK_SECRET.to_string();

        let faults = Arc::new(FaultyStore::new(Storage::open(&config.ledger).unwrap()));
        let store: Arc<dyn LedgerStore> = faults.clone();
        let listings = Arc::new(InMemoryListings::new());
        let users = Arc::new(InMemoryUsers::new());
        let reviews = Arc::new(InMemoryReviews::new());
        let fees = Arc::new(StaticFeeSchedule::new(None));
        let notifications = Arc::new(RecordingNotifier::new());
        let provider = Arc::new(MockPaymentProvider::new());

        let collaborators = Collaborators {
            listings: listings.clone(),
            users: users.clone(),
            reviews: reviews.clone(),
            fees: fees.clone(),
            notifications: notifications.clone(),
        };
        let engine =
            RentalEngine::new(config.clone(), store.clone(), collaborators, provider.clone())
                .unwrap();

        Self {
            engine,
            store,
            faults,
            listings,
            users,
            reviews,
            fees,
            notifications,
            provider,
            signer: WebhookVerifier::new(WEBHOOK_SECRET, config.payment.webhook_tolerance_seconds),
            _temp_dir: temp_dir,
        }
    }

    pub fn add_user(&self, name: &str, verification: VerificationStatus) -> Uuid {
        let id = Uuid::now_v7();
        self.users.insert(UserInfo {
            id,
            name: name.to_string(),
            verification_status: verification,
        });
        id
    }

    pub fn add_listing(&self, owner_id: Uuid, category: &str, price_per_day: Decimal) -> Uuid {
        let id = Uuid::now_v7();
        self.listings.insert(ListingInfo {
            id,
            owner_id,
            title: format!("{} listing", category),
            category: category.to_string(),
            price_per_day: Some(price_per_day),
            price: None,
            available: true,
        });
        id
    }

    /// Owner, borrower and a PENDING transaction over `days` days starting tomorrow
    pub async fn pending_transaction(
        &self,
        category: &str,
        price_per_day: Decimal,
        days: i64,
    ) -> Transaction {
        let owner = self.add_user("Olive Owner", VerificationStatus::EmailVerified);
        let borrower = self.add_user("Ben Borrower", VerificationStatus::PhoneVerified);
        let listing = self.add_listing(owner, category, price_per_day);
        let (start, end) = upcoming(days);
        self.engine
            .orchestrator
            .create_transaction(listing, borrower, start, end)
            .await
            .unwrap()
    }

    /// PENDING transaction accepted by its owner
    pub async fn active_transaction(
        &self,
        category: &str,
        price_per_day: Decimal,
        days: i64,
    ) -> Transaction {
        let tx = self.pending_transaction(category, price_per_day, days).await;
        self.engine
            .orchestrator
            .update_status(tx.id, TransactionStatus::Active, tx.owner_id)
            .await
            .unwrap()
    }

    /// Signed provider event for a transaction
    pub fn webhook(&self, event_type: &str, intent_id: &str, transaction_id: Uuid) -> (Vec<u8>, String) {
        let payload = serde_json::json!({
            "id": format!("evt_{}", Uuid::now_v7().simple()),
            "type": event_type,
            "data": {
                "object": {
                    "id": intent_id,
                    "metadata": { "transactionId": transaction_id.to_string() }
                }
            }
        });
        let body = serde_json::to_vec(&payload).unwrap();
        let header = self.signer.sign(&body, Utc::now().timestamp()).unwrap();
        (body, header)
    }
}

/// Date range of `days` days starting tomorrow
pub fn upcoming(days: i64) -> (NaiveDate, NaiveDate) {
    let start = Utc::now().date_naive() + Duration::days(1);
    (start, start + Duration::days(days))
}
