//! Dispute manager
//!
//! Opening a dispute moves the transaction to DISPUTED. Resolving or closing
//! it leaves the transaction DISPUTED; any follow-up is an operator matter.

use crate::{
    collaborators::Notifier,
    metrics::DISPUTES_TOTAL,
    projections::{DisputeView, Projector},
    state::{SystemEvent, TransactionStateMachine},
    Error, Result,
};
use chrono::Utc;
use parking_lot::Mutex;
use rental_ledger::{Dispute, DisputeReason, DisputeStatus, LedgerStore};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const OPEN_DISPUTE_EXISTS: &str = "An open dispute already exists for this transaction";

/// Dispute manager
pub struct DisputeManager {
    store: Arc<dyn LedgerStore>,
    state: Arc<TransactionStateMachine>,
    notifier: Notifier,
    projector: Projector,
    lock: Mutex<()>,
}

impl std::fmt::Debug for DisputeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisputeManager").finish_non_exhaustive()
    }
}

impl DisputeManager {
    /// Create manager
    pub fn new(
        store: Arc<dyn LedgerStore>,
        state: Arc<TransactionStateMachine>,
        notifier: Notifier,
        projector: Projector,
    ) -> Self {
        Self {
            store,
            state,
            notifier,
            projector,
            lock: Mutex::new(()),
        }
    }

    /// File a dispute over an ACTIVE transaction (either party).
    ///
    /// The dispute row and the DISPUTED transaction row go to the ledger in a
    /// single write, so either both land or neither does.
    pub async fn open_dispute(
        &self,
        transaction_id: Uuid,
        reporter_id: Uuid,
        reason: &str,
        details: &str,
    ) -> Result<Dispute> {
        let reason = DisputeReason::from_code(reason)
            .ok_or_else(|| Error::InvalidArgument(format!("Invalid dispute reason: {}", reason)))?;

        // Parties are immutable, checked before the locked write
        let current = self.store.get_transaction(transaction_id)?;
        if !current.is_party(reporter_id) {
            return Err(Error::Forbidden(
                "You are not a party to this transaction".into(),
            ));
        }

        let now = Utc::now();
        let dispute = Dispute {
            id: Uuid::now_v7(),
            transaction_id,
            reporter_id,
            reason,
            details: details.to_string(),
            status: DisputeStatus::Open,
            resolution: None,
            resolved_by_id: None,
            created_at: now,
            resolved_at: None,
        };

        let (tx, _) = self.state.apply_system_event(
            transaction_id,
            SystemEvent::DisputeOpened,
            |tx| {
                self.store.insert_dispute(&dispute, tx).map_err(|e| match e {
                    rental_ledger::Error::Conflict(_) => Error::Conflict(OPEN_DISPUTE_EXISTS.into()),
                    other => other.into(),
                })
            },
        )?;
        DISPUTES_TOTAL.with_label_values(&["opened"]).inc();

        info!(
            dispute_id = %dispute.id,
            %transaction_id,
            %reporter_id,
            reason = %reason,
            "Dispute opened"
        );

        self.notifier
            .dispute_filed(tx.counterparty(reporter_id), transaction_id)
            .await;
        Ok(dispute)
    }

    fn load(&self, dispute_id: Uuid) -> Result<Dispute> {
        self.store.get_dispute(dispute_id).map_err(|e| match e {
            rental_ledger::Error::NotFound { .. } => Error::NotFound("Dispute not found".into()),
            other => other.into(),
        })
    }

    /// Pick an OPEN dispute up for review
    pub fn begin_review(&self, dispute_id: Uuid) -> Result<Dispute> {
        let _guard = self.lock.lock();

        let mut dispute = self.load(dispute_id)?;
        if dispute.status != DisputeStatus::Open {
            return Err(Error::InvalidTransition(format!(
                "Dispute is already {}",
                dispute.status
            )));
        }
        dispute.status = DisputeStatus::UnderReview;
        self.store.update_dispute(&dispute)?;
        DISPUTES_TOTAL.with_label_values(&["under_review"]).inc();

        info!(%dispute_id, "Dispute under review");
        Ok(dispute)
    }

    /// Resolve or close an open dispute
    pub async fn resolve(
        &self,
        dispute_id: Uuid,
        resolver_id: Uuid,
        next: DisputeStatus,
        resolution: &str,
    ) -> Result<Dispute> {
        let dispute = {
            let _guard = self.lock.lock();

            let mut dispute = self.load(dispute_id)?;
            if !dispute.status.is_open() {
                return Err(Error::InvalidTransition(format!(
                    "Dispute is already {}",
                    dispute.status
                )));
            }
            if !matches!(next, DisputeStatus::Resolved | DisputeStatus::Closed) {
                return Err(Error::InvalidArgument(
                    "Status must be RESOLVED or CLOSED".into(),
                ));
            }

            dispute.status = next;
            dispute.resolution = Some(resolution.to_string());
            dispute.resolved_by_id = Some(resolver_id);
            dispute.resolved_at = Some(Utc::now());
            self.store.update_dispute(&dispute)?;
            dispute
        };
        DISPUTES_TOTAL
            .with_label_values(&[match next {
                DisputeStatus::Closed => "closed",
                _ => "resolved",
            }])
            .inc();

        info!(
            %dispute_id,
            %resolver_id,
            status = %next,
            "Dispute resolved"
        );

        self.notifier
            .dispute_resolved(dispute.reporter_id, resolution, dispute.transaction_id)
            .await;
        Ok(dispute)
    }

    /// Dispute by ID (parties of the disputed transaction only)
    pub async fn get(&self, dispute_id: Uuid, requester_id: Uuid) -> Result<DisputeView> {
        let dispute = self.load(dispute_id)?;
        let tx = self.store.get_transaction(dispute.transaction_id)?;
        if !tx.is_party(requester_id) {
            return Err(Error::Forbidden("Access denied".into()));
        }
        Ok(self.projector.dispute(&dispute).await)
    }

    /// Disputes over a transaction (parties only)
    pub async fn by_transaction(
        &self,
        transaction_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Vec<DisputeView>> {
        let tx = self.store.get_transaction(transaction_id)?;
        if !tx.is_party(requester_id) {
            return Err(Error::Forbidden("Access denied".into()));
        }
        self.project_all(self.store.disputes_by_transaction(transaction_id)?)
            .await
    }

    /// Disputes the user filed
    pub async fn mine(&self, reporter_id: Uuid) -> Result<Vec<DisputeView>> {
        self.project_all(self.store.disputes_by_reporter(reporter_id)?)
            .await
    }

    async fn project_all(&self, disputes: Vec<Dispute>) -> Result<Vec<DisputeView>> {
        let mut views = Vec::with_capacity(disputes.len());
        for dispute in &disputes {
            views.push(self.projector.dispute(dispute).await);
        }
        Ok(views)
    }
}
