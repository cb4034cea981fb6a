//! Transaction state machine
//!
//! The only writer of `Transaction.status` and `Transaction.payment_status`.
//! Two entry points:
//! - actor transitions, gated by the party table below
//! - system events (payment confirmed, dispute opened), which bypass the
//!   actor table but are still validated here
//!
//! | current | next      | actor       |
//! |---------|-----------|-------------|
//! | PENDING | ACTIVE    | owner only  |
//! | PENDING | CANCELLED | either party|
//! | ACTIVE  | COMPLETED | either party|
//! | ACTIVE  | DISPUTED  | either party|
//!
//! Every read-validate-write runs under one short lock so webhook deliveries
//! and user calls on the same row cannot interleave.

use crate::{metrics::TRANSITIONS_TOTAL, Error, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rental_ledger::{LedgerStore, PaymentStatus, Transaction, TransactionStatus};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// System-originated status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// Provider confirmed the payment
    PaymentConfirmed,
    /// A party opened a dispute
    DisputeOpened,
}

/// Provider verdict on a payment intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Charge succeeded
    Succeeded,
    /// Charge failed
    Failed,
}

/// Effect of applying a payment outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentUpdate {
    /// Payment state written; `activated` if the transaction moved to ACTIVE
    Applied {
        /// PENDING -> ACTIVE happened
        activated: bool,
    },
    /// Same terminal state already recorded for this intent
    Duplicate,
    /// Outcome arrived after the payment was already settled as PAID
    Stale,
}

/// Validate an actor-initiated transition
pub fn check_actor_transition(
    tx: &Transaction,
    next: TransactionStatus,
    actor_id: Uuid,
) -> Result<()> {
    if !tx.is_party(actor_id) {
        return Err(Error::Forbidden(
            "You do not have access to this transaction".into(),
        ));
    }

    let is_owner = tx.owner_id == actor_id;
    match tx.status {
        TransactionStatus::Pending => {
            if next == TransactionStatus::Active && !is_owner {
                return Err(Error::Forbidden(
                    "Only the owner can accept a transaction".into(),
                ));
            }
            if !matches!(next, TransactionStatus::Active | TransactionStatus::Cancelled) {
                return Err(Error::InvalidTransition(
                    "Pending transactions can only be accepted or cancelled".into(),
                ));
            }
        }
        TransactionStatus::Active => {
            if !matches!(next, TransactionStatus::Completed | TransactionStatus::Disputed) {
                return Err(Error::InvalidTransition(
                    "Active transactions can only be completed or disputed".into(),
                ));
            }
        }
        current => {
            return Err(Error::InvalidTransition(format!(
                "Cannot change status of a {} transaction",
                current
            )));
        }
    }
    Ok(())
}

/// Status a system event leads to; `None` leaves the status untouched
pub fn system_target(
    current: TransactionStatus,
    event: SystemEvent,
) -> Result<Option<TransactionStatus>> {
    match (event, current) {
        (SystemEvent::PaymentConfirmed, TransactionStatus::Pending) => {
            Ok(Some(TransactionStatus::Active))
        }
        (SystemEvent::PaymentConfirmed, _) => Ok(None),
        (SystemEvent::DisputeOpened, TransactionStatus::Active) => {
            Ok(Some(TransactionStatus::Disputed))
        }
        (SystemEvent::DisputeOpened, TransactionStatus::Disputed) => Ok(None),
        (SystemEvent::DisputeOpened, _) => Err(Error::InvalidTransition(
            "Disputes can only be filed for ACTIVE transactions".into(),
        )),
    }
}

/// Authoritative transaction state machine
pub struct TransactionStateMachine {
    store: Arc<dyn LedgerStore>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for TransactionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStateMachine").finish_non_exhaustive()
    }
}

impl TransactionStateMachine {
    /// Create state machine over a store
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn advance(tx: &mut Transaction, next: TransactionStatus) {
        if next == TransactionStatus::Completed && tx.completed_at.is_none() {
            tx.completed_at = Some(Utc::now());
        }
        tx.status = next;
    }

    /// Count and log a status change once it is persisted
    fn observe(from: TransactionStatus, tx: &Transaction, origin: &'static str) {
        TRANSITIONS_TOTAL
            .with_label_values(&[from.as_str(), tx.status.as_str(), origin])
            .inc();
        info!(
            transaction_id = %tx.id,
            from = %from,
            to = %tx.status,
            origin,
            "Transaction status changed"
        );
    }

    /// Apply an actor-initiated transition
    pub fn transition_as_actor(
        &self,
        transaction_id: Uuid,
        next: TransactionStatus,
        actor_id: Uuid,
    ) -> Result<Transaction> {
        let _guard = self.lock.lock();

        let mut tx = self.store.get_transaction(transaction_id)?;
        check_actor_transition(&tx, next, actor_id)?;

        let from = tx.status;
        Self::advance(&mut tx, next);
        self.store.update_transaction(&tx)?;
        Self::observe(from, &tx, "actor");
        Ok(tx)
    }

    /// Apply a system event.
    ///
    /// `commit` receives the row with the event applied while the lock is
    /// held and must persist it, together with any rows that belong to the
    /// same event, in one write. An error from it aborts the event. Returns
    /// the row and whether the status changed.
    pub fn apply_system_event<F>(
        &self,
        transaction_id: Uuid,
        event: SystemEvent,
        commit: F,
    ) -> Result<(Transaction, bool)>
    where
        F: FnOnce(&Transaction) -> Result<()>,
    {
        let _guard = self.lock.lock();

        let current = self.store.get_transaction(transaction_id)?;
        let target = system_target(current.status, event)?;

        let mut tx = current.clone();
        if let Some(next) = target {
            Self::advance(&mut tx, next);
        }
        commit(&tx)?;

        if target.is_some() {
            Self::observe(current.status, &tx, "system");
        }
        Ok((tx, target.is_some()))
    }

    /// Record that a provider intent was created for a PENDING transaction
    pub fn mark_payment_processing(
        &self,
        transaction_id: Uuid,
        intent_ref: &str,
    ) -> Result<Transaction> {
        let _guard = self.lock.lock();

        let mut tx = self.store.get_transaction(transaction_id)?;

        // A fast webhook may already have settled the payment
        if tx.payment_status == PaymentStatus::Paid {
            return Ok(tx);
        }
        if tx.status != TransactionStatus::Pending {
            return Err(Error::InvalidTransition(
                "Transaction is not in PENDING status".into(),
            ));
        }

        tx.payment_status = PaymentStatus::Processing;
        tx.external_payment_ref = Some(intent_ref.to_string());
        self.store.update_transaction(&tx)?;
        Ok(tx)
    }

    /// Record a provider verdict, activating the transaction on success
    pub fn apply_payment_outcome(
        &self,
        transaction_id: Uuid,
        outcome: PaymentOutcome,
        intent_ref: Option<&str>,
    ) -> Result<(Transaction, PaymentUpdate)> {
        let _guard = self.lock.lock();

        let mut tx = self.store.get_transaction(transaction_id)?;
        let target = match outcome {
            PaymentOutcome::Succeeded => PaymentStatus::Paid,
            PaymentOutcome::Failed => PaymentStatus::Failed,
        };

        let same_intent = match intent_ref {
            Some(r) => tx.external_payment_ref.as_deref() == Some(r),
            None => true,
        };
        if tx.payment_status == target && same_intent {
            return Ok((tx, PaymentUpdate::Duplicate));
        }
        if tx.payment_status == PaymentStatus::Paid {
            warn!(
                transaction_id = %tx.id,
                ?outcome,
                "Ignoring payment outcome for an already paid transaction"
            );
            return Ok((tx, PaymentUpdate::Stale));
        }

        tx.payment_status = target;
        if let Some(r) = intent_ref {
            tx.external_payment_ref = Some(r.to_string());
        }

        let from = tx.status;
        let mut activated = false;
        if outcome == PaymentOutcome::Succeeded {
            match system_target(tx.status, SystemEvent::PaymentConfirmed)? {
                Some(next) => {
                    Self::advance(&mut tx, next);
                    activated = true;
                }
                None if tx.status != TransactionStatus::Active => {
                    warn!(
                        transaction_id = %tx.id,
                        status = %tx.status,
                        "Payment confirmed for a transaction that is no longer PENDING"
                    );
                }
                None => {}
            }
        }

        self.store.update_transaction(&tx)?;
        if activated {
            Self::observe(from, &tx, "system");
        }
        Ok((tx, PaymentUpdate::Applied { activated }))
    }
}
