//! In-memory collaborators
//!
//! Stand-ins for the listing, user, review, fee and notification services.
//! Used by tests and by the binary for local runs.

use crate::collaborators::{
    FeeSchedule, ListingDirectory, ListingInfo, NotificationSink, ReviewSource, UserDirectory,
    UserInfo,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use rental_ledger::CoverageType;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// In-memory listing directory
#[derive(Debug, Default)]
pub struct InMemoryListings {
    listings: RwLock<HashMap<Uuid, ListingInfo>>,
}

impl InMemoryListings {
    /// Create empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a listing
    pub fn insert(&self, listing: ListingInfo) {
        self.listings.write().insert(listing.id, listing);
    }
}

#[async_trait]
impl ListingDirectory for InMemoryListings {
    async fn find_listing(&self, listing_id: Uuid) -> anyhow::Result<Option<ListingInfo>> {
        Ok(self.listings.read().get(&listing_id).cloned())
    }
}

/// Profile fields the engine mirrors onto a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileMirror {
    /// Whole kg of carbon saved
    pub carbon_saved: Option<i64>,
    /// Integer trust score
    pub trust_score: Option<i64>,
}

/// In-memory user directory
#[derive(Debug, Default)]
pub struct InMemoryUsers {
    users: RwLock<HashMap<Uuid, UserInfo>>,
    profiles: RwLock<HashMap<Uuid, ProfileMirror>>,
}

impl InMemoryUsers {
    /// Create empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user
    pub fn insert(&self, user: UserInfo) {
        self.users.write().insert(user.id, user);
    }

    /// Mirrored profile fields for a user
    pub fn profile(&self, user_id: Uuid) -> ProfileMirror {
        self.profiles
            .read()
            .get(&user_id)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUsers {
    async fn find_user(&self, user_id: Uuid) -> anyhow::Result<Option<UserInfo>> {
        Ok(self.users.read().get(&user_id).cloned())
    }

    async fn update_carbon_saved(&self, user_id: Uuid, total_kg: i64) -> anyhow::Result<()> {
        self.profiles.write().entry(user_id).or_default().carbon_saved = Some(total_kg);
        Ok(())
    }

    async fn update_trust_score(&self, user_id: Uuid, score: i64) -> anyhow::Result<()> {
        self.profiles.write().entry(user_id).or_default().trust_score = Some(score);
        Ok(())
    }
}

/// In-memory review store
#[derive(Debug, Default)]
pub struct InMemoryReviews {
    ratings: RwLock<HashMap<Uuid, Vec<u8>>>,
}

impl InMemoryReviews {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rating received by `reviewee_id`
    pub fn add_rating(&self, reviewee_id: Uuid, rating: u8) {
        self.ratings.write().entry(reviewee_id).or_default().push(rating);
    }
}

#[async_trait]
impl ReviewSource for InMemoryReviews {
    async fn ratings_received(&self, user_id: Uuid) -> anyhow::Result<Vec<u8>> {
        Ok(self.ratings.read().get(&user_id).cloned().unwrap_or_default())
    }
}

/// Fee schedule with at most one active row
#[derive(Debug, Default)]
pub struct StaticFeeSchedule {
    active: RwLock<Option<Decimal>>,
}

impl StaticFeeSchedule {
    /// Schedule with the given active percentage
    pub fn new(active: Option<Decimal>) -> Self {
        Self {
            active: RwLock::new(active),
        }
    }

    /// Replace the active percentage
    pub fn set_active(&self, percentage: Option<Decimal>) {
        *self.active.write() = percentage;
    }
}

#[async_trait]
impl FeeSchedule for StaticFeeSchedule {
    async fn active_fee_percentage(&self) -> anyhow::Result<Option<Decimal>> {
        Ok(*self.active.read())
    }
}

/// A delivered notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// New rental request
    NewTransaction {
        /// Recipient
        owner_id: Uuid,
        /// Transaction
        transaction_id: Uuid,
    },
    /// Status change
    StatusChange {
        /// Recipient
        user_id: Uuid,
        /// New status label
        status: String,
        /// Transaction
        transaction_id: Uuid,
    },
    /// Dispute filed against the recipient
    DisputeFiled {
        /// Recipient
        user_id: Uuid,
        /// Transaction
        transaction_id: Uuid,
    },
    /// Dispute resolved
    DisputeResolved {
        /// Recipient
        user_id: Uuid,
        /// Resolution text
        resolution: String,
    },
    /// Insurance purchased
    InsurancePurchased {
        /// Recipient
        user_id: Uuid,
        /// Coverage tier
        coverage_type: CoverageType,
    },
    /// Insurance claim filed
    InsuranceClaimFiled {
        /// Recipient
        user_id: Uuid,
        /// Policy
        policy_id: Uuid,
    },
}

impl Notification {
    /// Recipient of the notification
    pub fn recipient(&self) -> Uuid {
        match self {
            Notification::NewTransaction { owner_id, .. } => *owner_id,
            Notification::StatusChange { user_id, .. }
            | Notification::DisputeFiled { user_id, .. }
            | Notification::DisputeResolved { user_id, .. }
            | Notification::InsurancePurchased { user_id, .. }
            | Notification::InsuranceClaimFiled { user_id, .. } => *user_id,
        }
    }
}

/// Sink that records every notification, optionally failing each call
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    /// Create recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (after recording it)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything recorded so far
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.read().clone()
    }

    /// Forget recorded notifications
    pub fn clear(&self) {
        self.sent.write().clear();
    }

    fn record(&self, notification: Notification) -> anyhow::Result<()> {
        self.sent.write().push(notification);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("notification delivery unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify_new_transaction(
        &self,
        owner_id: Uuid,
        _borrower_name: &str,
        _listing_title: &str,
        transaction_id: Uuid,
    ) -> anyhow::Result<()> {
        self.record(Notification::NewTransaction {
            owner_id,
            transaction_id,
        })
    }

    async fn notify_transaction_status_change(
        &self,
        user_id: Uuid,
        status: &str,
        _listing_title: &str,
        transaction_id: Uuid,
    ) -> anyhow::Result<()> {
        self.record(Notification::StatusChange {
            user_id,
            status: status.to_string(),
            transaction_id,
        })
    }

    async fn notify_dispute_filed(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> anyhow::Result<()> {
        self.record(Notification::DisputeFiled {
            user_id,
            transaction_id,
        })
    }

    async fn notify_dispute_resolved(
        &self,
        user_id: Uuid,
        resolution: &str,
        _transaction_id: Uuid,
    ) -> anyhow::Result<()> {
        self.record(Notification::DisputeResolved {
            user_id,
            resolution: resolution.to_string(),
        })
    }

    async fn notify_insurance_purchased(
        &self,
        user_id: Uuid,
        coverage_type: CoverageType,
        _transaction_id: Uuid,
    ) -> anyhow::Result<()> {
        self.record(Notification::InsurancePurchased {
            user_id,
            coverage_type,
        })
    }

    async fn notify_insurance_claim_filed(
        &self,
        user_id: Uuid,
        policy_id: Uuid,
        _transaction_id: Uuid,
    ) -> anyhow::Result<()> {
        self.record(Notification::InsuranceClaimFiled { user_id, policy_id })
    }
}
