//! Carbon accountant
//!
//! Credits the CO2 avoided by a completed rental: a per-category base
//! estimate split between borrower and owner.

use crate::{
    collaborators::{ListingDirectory, UserDirectory},
    config::CarbonConfig,
    metrics::CARBON_RECORDS_TOTAL,
    projections::{Projector, UNKNOWN_USER},
    Error, Result,
};
use chrono::Utc;
use rental_ledger::{round_money, CarbonRecord, LedgerStore, TransactionStatus};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Leaderboard row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// User
    pub user_id: Uuid,
    /// Display name
    pub name: String,
    /// Total kg credited
    pub total_carbon_saved: Decimal,
}

/// Community-wide sustainability figures
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityReport {
    /// Sum over all records, 2 dp
    pub total_carbon_saved_kg: Decimal,
    /// COMPLETED transactions
    pub total_completed_transactions: u64,
    /// Users with at least one record
    pub total_active_users: u64,
    /// Total kg per completed transaction, 2 dp
    pub avg_carbon_per_transaction: Decimal,
    /// Top users by total
    pub top_contributors: Vec<LeaderboardEntry>,
}

/// Number of contributors listed in the community report
const REPORT_TOP_CONTRIBUTORS: usize = 10;

/// Carbon accountant
pub struct CarbonAccountant {
    store: Arc<dyn LedgerStore>,
    listings: Arc<dyn ListingDirectory>,
    users: Arc<dyn UserDirectory>,
    projector: Projector,
    table: CarbonConfig,
}

impl std::fmt::Debug for CarbonAccountant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarbonAccountant")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl CarbonAccountant {
    /// Create accountant
    pub fn new(
        store: Arc<dyn LedgerStore>,
        listings: Arc<dyn ListingDirectory>,
        users: Arc<dyn UserDirectory>,
        table: CarbonConfig,
    ) -> Self {
        let projector = Projector::new(listings.clone(), users.clone());
        Self {
            store,
            listings,
            users,
            projector,
            table,
        }
    }

    /// Borrower and owner shares of a base estimate
    pub fn split(&self, base_kg: Decimal) -> (Decimal, Decimal) {
        (
            round_money(base_kg * self.table.borrower_share),
            round_money(base_kg * self.table.owner_share),
        )
    }

    /// Record the savings of a completed transaction.
    ///
    /// Returns `false` when records already exist; calling this any number of
    /// times leaves exactly one borrower/owner pair.
    pub async fn record_savings(&self, transaction_id: Uuid) -> Result<bool> {
        let tx = self.store.get_transaction(transaction_id)?;
        if tx.status != TransactionStatus::Completed {
            return Err(Error::InvalidTransition(
                "Carbon savings are only recorded for COMPLETED transactions".into(),
            ));
        }

        if !self.store.carbon_by_transaction(transaction_id)?.is_empty() {
            debug!(%transaction_id, "Carbon already recorded");
            return Ok(false);
        }

        let listing = self
            .listings
            .find_listing(tx.listing_id)
            .await
            .map_err(|e| Error::collaborator("listing directory", e))?
            .ok_or_else(|| Error::NotFound("Listing not found".into()))?;

        let base_kg = self.table.base_kg(&listing.category);
        let (borrower_kg, owner_kg) = self.split(base_kg);
        let now = Utc::now();

        let records = [(tx.borrower_id, borrower_kg), (tx.owner_id, owner_kg)].map(
            |(user_id, kg)| CarbonRecord {
                id: Uuid::now_v7(),
                transaction_id,
                user_id,
                carbon_saved_kg: kg,
                estimated_new_product_carbon: base_kg,
                created_at: now,
            },
        );

        // Storage guard decides races between concurrent completions
        if !self.store.insert_carbon_records(transaction_id, &records)? {
            debug!(%transaction_id, "Lost carbon insert race");
            return Ok(false);
        }
        CARBON_RECORDS_TOTAL.inc_by(records.len() as u64);

        info!(
            %transaction_id,
            category = %listing.category,
            %borrower_kg,
            %owner_kg,
            "Carbon savings recorded"
        );

        for user_id in [tx.borrower_id, tx.owner_id] {
            self.push_total(user_id).await?;
        }

        Ok(true)
    }

    /// Mirror a user's running total onto the profile (whole kg, truncated)
    async fn push_total(&self, user_id: Uuid) -> Result<()> {
        let total = self.store.carbon_total_for_user(user_id)?;
        let whole_kg = total.trunc().to_i64().unwrap_or(i64::MAX);
        if let Err(e) = self.users.update_carbon_saved(user_id, whole_kg).await {
            warn!(%user_id, error = %e, "Failed to mirror carbon total onto profile");
        }
        Ok(())
    }

    /// Records credited to a user, oldest first
    pub fn history(&self, user_id: Uuid) -> Result<Vec<CarbonRecord>> {
        Ok(self.store.carbon_by_user(user_id)?)
    }

    /// Total kg credited to a user
    pub fn total(&self, user_id: Uuid) -> Result<Decimal> {
        Ok(self.store.carbon_total_for_user(user_id)?)
    }

    /// Top `limit` users by total kg
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let ranked = self.store.carbon_leaderboard(limit)?;
        let mut entries = Vec::with_capacity(ranked.len());
        for (user_id, total) in ranked {
            let name = self
                .projector
                .user_name(user_id)
                .await
                .unwrap_or_else(|| UNKNOWN_USER.to_string());
            entries.push(LeaderboardEntry {
                user_id,
                name,
                total_carbon_saved: total,
            });
        }
        Ok(entries)
    }

    /// Community-wide figures
    pub async fn community_report(&self) -> Result<CommunityReport> {
        let total = round_money(self.store.carbon_community_total()?);
        let completed = self
            .store
            .count_transactions_with_status(TransactionStatus::Completed)?;
        let active_users = self.store.carbon_leaderboard(usize::MAX)?.len() as u64;

        let avg = if completed > 0 {
            round_money(total / Decimal::from(completed))
        } else {
            Decimal::ZERO
        };

        Ok(CommunityReport {
            total_carbon_saved_kg: total,
            total_completed_transactions: completed,
            total_active_users: active_users,
            avg_carbon_per_transaction: avg,
            top_contributors: self.leaderboard(REPORT_TOP_CONTRIBUTORS).await?,
        })
    }
}
