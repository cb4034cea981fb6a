//! External collaborators
//!
//! The engine does not own listings, users, reviews, the fee schedule or
//! notification delivery. It consumes them through these traits.

use async_trait::async_trait;
use rental_ledger::CoverageType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Listing as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingInfo {
    /// Listing ID
    pub id: Uuid,
    /// Listing owner
    pub owner_id: Uuid,
    /// Display title
    pub title: String,
    /// Category used for carbon accounting
    pub category: String,
    /// Per-day rate
    pub price_per_day: Option<Decimal>,
    /// Flat price, used when no per-day rate is set
    pub price: Option<Decimal>,
    /// Open for new rentals
    pub available: bool,
}

impl ListingInfo {
    /// Rate charged per rental day
    pub fn daily_rate(&self) -> Option<Decimal> {
        self.price_per_day.or(self.price)
    }
}

/// Verification level of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// Nothing verified
    Unverified,
    /// Email confirmed
    EmailVerified,
    /// Phone confirmed
    PhoneVerified,
    /// Government ID checked
    IdentityVerified,
}

/// User as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    /// User ID
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Verification level
    pub verification_status: VerificationStatus,
}

/// Listing lookup
#[async_trait]
pub trait ListingDirectory: Send + Sync {
    /// Find a listing by ID
    async fn find_listing(&self, listing_id: Uuid) -> anyhow::Result<Option<ListingInfo>>;
}

/// User lookup and profile mirrors
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by ID
    async fn find_user(&self, user_id: Uuid) -> anyhow::Result<Option<UserInfo>>;

    /// Mirror the user's carbon total (whole kg) onto the profile
    async fn update_carbon_saved(&self, user_id: Uuid, total_kg: i64) -> anyhow::Result<()>;

    /// Mirror the user's integer trust score onto the profile
    async fn update_trust_score(&self, user_id: Uuid, score: i64) -> anyhow::Result<()>;
}

/// Review aggregate
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Ratings (1-5) the user received as reviewee
    async fn ratings_received(&self, user_id: Uuid) -> anyhow::Result<Vec<u8>>;
}

/// Fee-schedule lookup
#[async_trait]
pub trait FeeSchedule: Send + Sync {
    /// Currently active fee percentage, if any row is active
    async fn active_fee_percentage(&self) -> anyhow::Result<Option<Decimal>>;
}

/// Outbound notification triggers
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// A borrower requested one of the owner's listings
    async fn notify_new_transaction(
        &self,
        owner_id: Uuid,
        borrower_name: &str,
        listing_title: &str,
        transaction_id: Uuid,
    ) -> anyhow::Result<()>;

    /// A transaction the user is party to changed status
    async fn notify_transaction_status_change(
        &self,
        user_id: Uuid,
        status: &str,
        listing_title: &str,
        transaction_id: Uuid,
    ) -> anyhow::Result<()>;

    /// The counterparty filed a dispute
    async fn notify_dispute_filed(&self, user_id: Uuid, transaction_id: Uuid)
        -> anyhow::Result<()>;

    /// A dispute the user filed was resolved
    async fn notify_dispute_resolved(
        &self,
        user_id: Uuid,
        resolution: &str,
        transaction_id: Uuid,
    ) -> anyhow::Result<()>;

    /// Insurance was purchased
    async fn notify_insurance_purchased(
        &self,
        user_id: Uuid,
        coverage_type: CoverageType,
        transaction_id: Uuid,
    ) -> anyhow::Result<()>;

    /// An insurance claim was filed
    async fn notify_insurance_claim_filed(
        &self,
        user_id: Uuid,
        policy_id: Uuid,
        transaction_id: Uuid,
    ) -> anyhow::Result<()>;
}

/// Fire-and-forget wrapper around a [`NotificationSink`].
///
/// Sink failures are logged and counted, never returned.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

impl Notifier {
    /// Wrap a sink
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    fn swallow(kind: &'static str, result: anyhow::Result<()>) {
        if let Err(e) = result {
            crate::metrics::NOTIFICATION_FAILURES_TOTAL
                .with_label_values(&[kind])
                .inc();
            warn!(kind, error = %e, "Notification failed");
        }
    }

    /// See [`NotificationSink::notify_new_transaction`]
    pub async fn new_transaction(
        &self,
        owner_id: Uuid,
        borrower_name: &str,
        listing_title: &str,
        transaction_id: Uuid,
    ) {
        let result = self
            .sink
            .notify_new_transaction(owner_id, borrower_name, listing_title, transaction_id)
            .await;
        Self::swallow("new_transaction", result);
    }

    /// See [`NotificationSink::notify_transaction_status_change`]
    pub async fn status_change(
        &self,
        user_id: Uuid,
        status: &str,
        listing_title: &str,
        transaction_id: Uuid,
    ) {
        let result = self
            .sink
            .notify_transaction_status_change(user_id, status, listing_title, transaction_id)
            .await;
        Self::swallow("transaction_status", result);
    }

    /// See [`NotificationSink::notify_dispute_filed`]
    pub async fn dispute_filed(&self, user_id: Uuid, transaction_id: Uuid) {
        let result = self.sink.notify_dispute_filed(user_id, transaction_id).await;
        Self::swallow("dispute_filed", result);
    }

    /// See [`NotificationSink::notify_dispute_resolved`]
    pub async fn dispute_resolved(&self, user_id: Uuid, resolution: &str, transaction_id: Uuid) {
        let result = self
            .sink
            .notify_dispute_resolved(user_id, resolution, transaction_id)
            .await;
        Self::swallow("dispute_resolved", result);
    }

    /// See [`NotificationSink::notify_insurance_purchased`]
    pub async fn insurance_purchased(
        &self,
        user_id: Uuid,
        coverage_type: CoverageType,
        transaction_id: Uuid,
    ) {
        let result = self
            .sink
            .notify_insurance_purchased(user_id, coverage_type, transaction_id)
            .await;
        Self::swallow("insurance_purchased", result);
    }

    /// See [`NotificationSink::notify_insurance_claim_filed`]
    pub async fn insurance_claim_filed(&self, user_id: Uuid, policy_id: Uuid, transaction_id: Uuid) {
        let result = self
            .sink
            .notify_insurance_claim_filed(user_id, policy_id, transaction_id)
            .await;
        Self::swallow("insurance_claim", result);
    }
}

/// Bundle of collaborator handles passed to the engine
#[derive(Clone)]
pub struct Collaborators {
    /// Listing lookup
    pub listings: Arc<dyn ListingDirectory>,
    /// User lookup
    pub users: Arc<dyn UserDirectory>,
    /// Review aggregate
    pub reviews: Arc<dyn ReviewSource>,
    /// Fee schedule
    pub fees: Arc<dyn FeeSchedule>,
    /// Notification sink
    pub notifications: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
