//! Read projections
//!
//! Entities enriched with display names for the outer API layer. Lookup
//! failures fall back to placeholder names instead of failing the read.

use crate::collaborators::{ListingDirectory, UserDirectory};
use chrono::{DateTime, NaiveDate, Utc};
use rental_ledger::{
    ClaimStatus, Dispute, DisputeReason, DisputeStatus, InsuranceClaim, PaymentStatus,
    Transaction, TransactionStatus,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Placeholder for a listing that cannot be resolved
pub const UNKNOWN_LISTING: &str = "Unknown Listing";

/// Placeholder for a user that cannot be resolved
pub const UNKNOWN_USER: &str = "Unknown User";

/// Placeholder for a dispute reporter that cannot be resolved
pub const UNKNOWN_REPORTER: &str = "Unknown";

/// Transaction with listing title and party names
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub listing_title: String,
    pub borrower_id: Uuid,
    pub borrower_name: String,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub status: TransactionStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_amount: Decimal,
    pub service_fee: Decimal,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Dispute with reporter and resolver names
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeView {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub reporter_id: Uuid,
    pub reporter_name: String,
    pub reason: DisputeReason,
    pub details: String,
    pub status: DisputeStatus,
    pub resolution: Option<String>,
    pub resolved_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Insurance claim with claimant name
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimView {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub claimant_id: Uuid,
    pub claimant_name: String,
    pub description: String,
    pub claim_amount: Decimal,
    pub status: ClaimStatus,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Builds views from entities
#[derive(Clone)]
pub struct Projector {
    listings: Arc<dyn ListingDirectory>,
    users: Arc<dyn UserDirectory>,
}

impl std::fmt::Debug for Projector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projector").finish_non_exhaustive()
    }
}

impl Projector {
    /// Create projector over the directories
    pub fn new(listings: Arc<dyn ListingDirectory>, users: Arc<dyn UserDirectory>) -> Self {
        Self { listings, users }
    }

    /// Listing title, if it resolves
    pub async fn listing_title(&self, listing_id: Uuid) -> Option<String> {
        match self.listings.find_listing(listing_id).await {
            Ok(listing) => listing.map(|l| l.title),
            Err(e) => {
                debug!(%listing_id, error = %e, "Listing lookup failed");
                None
            }
        }
    }

    /// User name, if it resolves
    pub async fn user_name(&self, user_id: Uuid) -> Option<String> {
        match self.users.find_user(user_id).await {
            Ok(user) => user.map(|u| u.name),
            Err(e) => {
                debug!(%user_id, error = %e, "User lookup failed");
                None
            }
        }
    }

    /// Project a transaction
    pub async fn transaction(&self, tx: &Transaction) -> TransactionView {
        let listing_title = self
            .listing_title(tx.listing_id)
            .await
            .unwrap_or_else(|| UNKNOWN_LISTING.to_string());
        let borrower_name = self
            .user_name(tx.borrower_id)
            .await
            .unwrap_or_else(|| UNKNOWN_USER.to_string());
        let owner_name = self
            .user_name(tx.owner_id)
            .await
            .unwrap_or_else(|| UNKNOWN_USER.to_string());

        TransactionView {
            id: tx.id,
            listing_id: tx.listing_id,
            listing_title,
            borrower_id: tx.borrower_id,
            borrower_name,
            owner_id: tx.owner_id,
            owner_name,
            status: tx.status,
            start_date: tx.start_date,
            end_date: tx.end_date,
            total_amount: tx.total_amount,
            service_fee: tx.service_fee,
            payment_status: tx.payment_status,
            created_at: tx.created_at,
            completed_at: tx.completed_at,
        }
    }

    /// Project a dispute
    pub async fn dispute(&self, d: &Dispute) -> DisputeView {
        let reporter_name = self
            .user_name(d.reporter_id)
            .await
            .unwrap_or_else(|| UNKNOWN_REPORTER.to_string());
        let resolved_by_name = match d.resolved_by_id {
            Some(id) => self.user_name(id).await,
            None => None,
        };

        DisputeView {
            id: d.id,
            transaction_id: d.transaction_id,
            reporter_id: d.reporter_id,
            reporter_name,
            reason: d.reason,
            details: d.details.clone(),
            status: d.status,
            resolution: d.resolution.clone(),
            resolved_by_name,
            created_at: d.created_at,
            resolved_at: d.resolved_at,
        }
    }

    /// Project a claim
    pub async fn claim(&self, c: &InsuranceClaim) -> ClaimView {
        let claimant_name = self
            .user_name(c.claimant_id)
            .await
            .unwrap_or_else(|| UNKNOWN_USER.to_string());

        ClaimView {
            id: c.id,
            policy_id: c.policy_id,
            claimant_id: c.claimant_id,
            claimant_name,
            description: c.description.clone(),
            claim_amount: c.claim_amount,
            status: c.status,
            resolution_notes: c.resolution_notes.clone(),
            created_at: c.created_at,
            resolved_at: c.resolved_at,
        }
    }
}
