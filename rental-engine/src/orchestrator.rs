//! Transaction orchestrator
//!
//! Entry point for borrower and owner actions on a rental: request,
//! accept, cancel, complete. Completion cascades into carbon accounting and
//! trust recalculation.

use crate::{
    carbon::CarbonAccountant,
    collaborators::{FeeSchedule, ListingDirectory, Notifier},
    config::FeeConfig,
    projections::{Projector, TransactionView, UNKNOWN_LISTING, UNKNOWN_USER},
    state::TransactionStateMachine,
    trust::TrustEvaluator,
    Error, Result,
};
use chrono::{NaiveDate, Utc};
use rental_ledger::{
    rental_days, round_money, LedgerStore, PaymentStatus, Transaction, TransactionStatus,
};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Total and fee for a rental
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    /// Rate times billable days
    pub total_amount: Decimal,
    /// Platform fee on the total
    pub service_fee: Decimal,
}

/// Price a rental. `fee_percentage` is in percent (10 = 10%).
pub fn price_rental(
    daily_rate: Decimal,
    start: NaiveDate,
    end: NaiveDate,
    fee_percentage: Decimal,
) -> Pricing {
    let total_amount = round_money(daily_rate * Decimal::from(rental_days(start, end)));
    let service_fee = round_money(total_amount * fee_percentage / Decimal::ONE_HUNDRED);
    Pricing {
        total_amount,
        service_fee,
    }
}

/// Transaction orchestrator
pub struct TransactionOrchestrator {
    store: Arc<dyn LedgerStore>,
    state: Arc<TransactionStateMachine>,
    listings: Arc<dyn ListingDirectory>,
    fees: Arc<dyn FeeSchedule>,
    carbon: Arc<CarbonAccountant>,
    trust: Arc<TrustEvaluator>,
    projector: Projector,
    notifier: Notifier,
    fee_config: FeeConfig,
}

impl std::fmt::Debug for TransactionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionOrchestrator")
            .field("fee_config", &self.fee_config)
            .finish_non_exhaustive()
    }
}

impl TransactionOrchestrator {
    /// Create orchestrator
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        state: Arc<TransactionStateMachine>,
        listings: Arc<dyn ListingDirectory>,
        fees: Arc<dyn FeeSchedule>,
        carbon: Arc<CarbonAccountant>,
        trust: Arc<TrustEvaluator>,
        projector: Projector,
        notifier: Notifier,
        fee_config: FeeConfig,
    ) -> Self {
        Self {
            store,
            state,
            listings,
            fees,
            carbon,
            trust,
            projector,
            notifier,
            fee_config,
        }
    }

    async fn fee_percentage(&self) -> Result<Decimal> {
        let active = self
            .fees
            .active_fee_percentage()
            .await
            .map_err(|e| Error::collaborator("fee schedule", e))?;
        Ok(active.unwrap_or(self.fee_config.default_percentage))
    }

    /// Request a rental of a listing
    pub async fn create_transaction(
        &self,
        listing_id: Uuid,
        borrower_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Transaction> {
        let listing = self
            .listings
            .find_listing(listing_id)
            .await
            .map_err(|e| Error::collaborator("listing directory", e))?
            .ok_or_else(|| Error::NotFound("Listing not found".into()))?;

        if !listing.available {
            return Err(Error::InvalidArgument("Listing is not available".into()));
        }
        if listing.owner_id == borrower_id {
            return Err(Error::InvalidArgument(
                "You cannot rent your own listing".into(),
            ));
        }
        if end_date < start_date {
            return Err(Error::InvalidArgument(
                "End date must not be before start date".into(),
            ));
        }
        let daily_rate = listing
            .daily_rate()
            .ok_or_else(|| Error::InvalidArgument("Listing has no price".into()))?;
        if daily_rate < Decimal::ZERO {
            return Err(Error::InvalidArgument("Listing price is negative".into()));
        }

        let pricing = price_rental(daily_rate, start_date, end_date, self.fee_percentage().await?);
        let tx = Transaction {
            id: Uuid::now_v7(),
            listing_id,
            borrower_id,
            owner_id: listing.owner_id,
            status: TransactionStatus::Pending,
            start_date,
            end_date,
            total_amount: pricing.total_amount,
            service_fee: pricing.service_fee,
            payment_status: PaymentStatus::Pending,
            external_payment_ref: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.store.put_transaction(&tx)?;

        info!(
            transaction_id = %tx.id,
            %listing_id,
            %borrower_id,
            total = %tx.total_amount,
            fee = %tx.service_fee,
            "Transaction created"
        );

        let borrower_name = self
            .projector
            .user_name(borrower_id)
            .await
            .unwrap_or_else(|| UNKNOWN_USER.to_string());
        self.notifier
            .new_transaction(tx.owner_id, &borrower_name, &listing.title, tx.id)
            .await;
        Ok(tx)
    }

    /// Transaction view (parties only)
    pub async fn get_transaction(
        &self,
        transaction_id: Uuid,
        principal_id: Uuid,
    ) -> Result<TransactionView> {
        let tx = self.store.get_transaction(transaction_id)?;
        if !tx.is_party(principal_id) {
            return Err(Error::Forbidden(
                "You do not have access to this transaction".into(),
            ));
        }
        Ok(self.projector.transaction(&tx).await)
    }

    /// Every transaction the user is party to, newest first
    pub async fn user_transactions(&self, user_id: Uuid) -> Result<Vec<TransactionView>> {
        let mut seen = HashSet::new();
        let mut txs: Vec<Transaction> = self
            .store
            .transactions_by_borrower(user_id)?
            .into_iter()
            .chain(self.store.transactions_by_owner(user_id)?)
            .filter(|tx| seen.insert(tx.id))
            .collect();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let mut views = Vec::with_capacity(txs.len());
        for tx in &txs {
            views.push(self.projector.transaction(tx).await);
        }
        Ok(views)
    }

    /// Apply a party's status change.
    ///
    /// A COMPLETED transition also records carbon savings and recalculates
    /// both parties' trust. If that cascade fails the status change stays
    /// committed and the error is returned; [`Self::settle_completion`] can
    /// be retried.
    pub async fn update_status(
        &self,
        transaction_id: Uuid,
        next: TransactionStatus,
        actor_id: Uuid,
    ) -> Result<Transaction> {
        let tx = self
            .state
            .transition_as_actor(transaction_id, next, actor_id)?;

        let title = self
            .projector
            .listing_title(tx.listing_id)
            .await
            .unwrap_or_else(|| UNKNOWN_LISTING.to_string());
        self.notifier
            .status_change(tx.counterparty(actor_id), tx.status.as_str(), &title, tx.id)
            .await;

        if tx.status == TransactionStatus::Completed {
            if let Err(e) = self.settle_completion(transaction_id).await {
                error!(
                    %transaction_id,
                    error = %e,
                    "Completion side effects failed; retry settlement"
                );
                return Err(e);
            }
        }
        Ok(tx)
    }

    /// Run the completion cascade for a COMPLETED transaction. Safe to call
    /// any number of times.
    pub async fn settle_completion(&self, transaction_id: Uuid) -> Result<()> {
        let tx = self.store.get_transaction(transaction_id)?;

        let recorded = self.carbon.record_savings(transaction_id).await?;
        for user_id in [tx.borrower_id, tx.owner_id] {
            self.trust.recalculate(user_id).await?;
        }

        info!(%transaction_id, carbon_recorded = recorded, "Completion settled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_two_day_rental() {
        let pricing = price_rental(dec!(30), date(1), date(3), dec!(10));
        assert_eq!(pricing.total_amount, dec!(60.00));
        assert_eq!(pricing.service_fee, dec!(6.00));
    }

    #[test]
    fn test_same_day_bills_one_day() {
        let pricing = price_rental(dec!(30), date(5), date(5), dec!(10));
        assert_eq!(pricing.total_amount, dec!(30.00));
    }

    #[test]
    fn test_fee_rounds_half_up() {
        // 12.35 * 10% = 1.235 -> 1.24
        let pricing = price_rental(dec!(12.35), date(1), date(2), dec!(10));
        assert_eq!(pricing.service_fee, dec!(1.24));
    }

    #[test]
    fn test_free_listing() {
        let pricing = price_rental(Decimal::ZERO, date(1), date(4), dec!(10));
        assert_eq!(pricing.total_amount, Decimal::ZERO);
        assert_eq!(pricing.service_fee, Decimal::ZERO);
    }
}
