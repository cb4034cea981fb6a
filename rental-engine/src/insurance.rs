//! Insurance manager
//!
//! Prices and issues one policy per transaction, accepts claims against it
//! and moves claims through adjudication.

use crate::{
    collaborators::Notifier,
    config::InsuranceConfig,
    metrics::INSURANCE_EVENTS_TOTAL,
    projections::{ClaimView, Projector},
    Error, Result,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use rental_ledger::{
    round_money, ClaimStatus, CoverageType, InsuranceClaim, InsurancePolicy, LedgerStore,
    PolicyStatus, TransactionStatus,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Premium and payout ceiling for a transaction total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// Premium charged, never below the configured floor
    pub premium: Decimal,
    /// Payout ceiling
    pub max_coverage: Decimal,
}

/// Price coverage for a transaction total under the given terms
pub fn quote(terms: &InsuranceConfig, total_amount: Decimal, coverage: CoverageType) -> Quote {
    let tier = terms.terms(coverage);
    Quote {
        premium: round_money(total_amount * tier.premium_rate).max(terms.min_premium),
        max_coverage: round_money(total_amount * tier.coverage_multiplier),
    }
}

/// Coverage end: last second of the rental's end date, or `default_days`
/// from `now` when there is no end date
pub fn policy_expiry(
    end_date: Option<NaiveDate>,
    now: DateTime<Utc>,
    default_days: i64,
) -> DateTime<Utc> {
    end_date
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or_else(|| now + Duration::days(default_days))
}

/// Claim adjudication table
fn check_claim_transition(current: ClaimStatus, next: ClaimStatus) -> Result<()> {
    use ClaimStatus::*;
    let allowed = matches!(
        (current, next),
        (Submitted, UnderReview)
            | (Submitted, Approved)
            | (Submitted, Rejected)
            | (UnderReview, Approved)
            | (UnderReview, Rejected)
            | (Approved, Paid)
    );
    if allowed {
        Ok(())
    } else {
        Err(Error::InvalidTransition(format!(
            "Cannot move a {} claim to {}",
            current, next
        )))
    }
}

/// Insurance manager
pub struct InsuranceManager {
    store: Arc<dyn LedgerStore>,
    notifier: Notifier,
    projector: Projector,
    terms: InsuranceConfig,
    lock: Mutex<()>,
}

impl std::fmt::Debug for InsuranceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsuranceManager")
            .field("terms", &self.terms)
            .finish_non_exhaustive()
    }
}

impl InsuranceManager {
    /// Create manager
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Notifier,
        projector: Projector,
        terms: InsuranceConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            projector,
            terms,
            lock: Mutex::new(()),
        }
    }

    /// Price coverage for a transaction total
    pub fn quote(&self, total_amount: Decimal, coverage: CoverageType) -> Quote {
        quote(&self.terms, total_amount, coverage)
    }

    /// Buy coverage for a transaction (borrower only)
    pub async fn purchase(
        &self,
        transaction_id: Uuid,
        coverage: CoverageType,
        buyer_id: Uuid,
    ) -> Result<InsurancePolicy> {
        let tx = self.store.get_transaction(transaction_id)?;

        if tx.borrower_id != buyer_id {
            return Err(Error::Forbidden("Only the borrower can add insurance".into()));
        }
        if tx.total_amount <= Decimal::ZERO {
            return Err(Error::InvalidArgument(
                "Insurance is not available for free transactions".into(),
            ));
        }
        if !matches!(
            tx.status,
            TransactionStatus::Pending | TransactionStatus::Active
        ) {
            return Err(Error::InvalidTransition(
                "Insurance can only be added to PENDING or ACTIVE transactions".into(),
            ));
        }
        if self.store.policy_by_transaction(transaction_id)?.is_some() {
            return Err(Error::Conflict(
                "Insurance policy already exists for this transaction".into(),
            ));
        }

        let quote = self.quote(tx.total_amount, coverage);
        let now = Utc::now();
        let policy = InsurancePolicy {
            id: Uuid::now_v7(),
            transaction_id,
            user_id: buyer_id,
            coverage_type: coverage,
            premium_amount: quote.premium,
            max_coverage: quote.max_coverage,
            status: PolicyStatus::Active,
            created_at: now,
            expires_at: policy_expiry(Some(tx.end_date), now, self.terms.default_expiry_days),
        };

        // Storage re-checks atomically; a concurrent purchase surfaces as Conflict
        self.store.insert_policy(&policy).map_err(|e| match e {
            rental_ledger::Error::Conflict(_) => Error::Conflict(
                "Insurance policy already exists for this transaction".into(),
            ),
            other => other.into(),
        })?;
        INSURANCE_EVENTS_TOTAL
            .with_label_values(&["policy_purchased"])
            .inc();

        info!(
            policy_id = %policy.id,
            %transaction_id,
            coverage = %coverage,
            premium = %policy.premium_amount,
            "Insurance policy issued"
        );

        self.notifier
            .insurance_purchased(buyer_id, coverage, transaction_id)
            .await;
        Ok(policy)
    }

    /// File a claim against an ACTIVE policy (policy holder only)
    pub async fn file_claim(
        &self,
        policy_id: Uuid,
        claimant_id: Uuid,
        description: &str,
        amount: Decimal,
    ) -> Result<InsuranceClaim> {
        let (policy, claim) = {
            let _guard = self.lock.lock();

            let mut policy = self.load_policy(policy_id)?;
            if policy.user_id != claimant_id {
                return Err(Error::Forbidden(
                    "Only the policyholder can file a claim".into(),
                ));
            }

            let now = Utc::now();
            if policy.status == PolicyStatus::Active && now > policy.expires_at {
                policy.status = PolicyStatus::Expired;
                self.store.update_policy(&policy)?;
                return Err(Error::InvalidTransition("Policy has expired".into()));
            }
            if policy.status != PolicyStatus::Active {
                return Err(Error::InvalidTransition("Policy is not active".into()));
            }
            if amount <= Decimal::ZERO {
                return Err(Error::InvalidArgument(
                    "Claim amount must be positive".into(),
                ));
            }
            if amount > policy.max_coverage {
                return Err(Error::InvalidArgument(format!(
                    "Claim amount exceeds maximum coverage of ${}",
                    policy.max_coverage
                )));
            }

            let claim = InsuranceClaim {
                id: Uuid::now_v7(),
                policy_id,
                claimant_id,
                description: description.to_string(),
                claim_amount: amount,
                status: ClaimStatus::Submitted,
                resolution_notes: None,
                created_at: now,
                resolved_at: None,
            };
            policy.status = PolicyStatus::Claimed;
            self.store.insert_claim(&claim, &policy)?;
            (policy, claim)
        };

        INSURANCE_EVENTS_TOTAL
            .with_label_values(&["claim_filed"])
            .inc();
        info!(
            claim_id = %claim.id,
            %policy_id,
            amount = %claim.claim_amount,
            "Insurance claim filed"
        );

        self.notifier
            .insurance_claim_filed(claimant_id, policy_id, policy.transaction_id)
            .await;
        Ok(claim)
    }

    /// Move a claim through adjudication
    pub fn adjudicate_claim(
        &self,
        claim_id: Uuid,
        next: ClaimStatus,
        notes: Option<String>,
    ) -> Result<InsuranceClaim> {
        let _guard = self.lock.lock();

        let mut claim = self.store.get_claim(claim_id).map_err(|e| match e {
            rental_ledger::Error::NotFound { .. } => {
                Error::NotFound("Insurance claim not found".into())
            }
            other => other.into(),
        })?;
        check_claim_transition(claim.status, next)?;

        claim.status = next;
        if notes.is_some() {
            claim.resolution_notes = notes;
        }
        if matches!(
            next,
            ClaimStatus::Approved | ClaimStatus::Rejected | ClaimStatus::Paid
        ) {
            claim.resolved_at = Some(Utc::now());
        }
        self.store.update_claim(&claim)?;

        INSURANCE_EVENTS_TOTAL
            .with_label_values(&[match next {
                ClaimStatus::UnderReview => "claim_under_review",
                ClaimStatus::Approved => "claim_approved",
                ClaimStatus::Rejected => "claim_rejected",
                ClaimStatus::Paid => "claim_paid",
                ClaimStatus::Submitted => "claim_filed",
            }])
            .inc();
        info!(%claim_id, status = %next, "Insurance claim adjudicated");
        Ok(claim)
    }

    fn load_policy(&self, policy_id: Uuid) -> Result<InsurancePolicy> {
        self.store.get_policy(policy_id).map_err(|e| match e {
            rental_ledger::Error::NotFound { .. } => {
                Error::NotFound("Insurance policy not found".into())
            }
            other => other.into(),
        })
    }

    /// Policy of a transaction (parties only)
    pub fn policy_for_transaction(
        &self,
        transaction_id: Uuid,
        user_id: Uuid,
    ) -> Result<InsurancePolicy> {
        let tx = self.store.get_transaction(transaction_id)?;
        if !tx.is_party(user_id) {
            return Err(Error::Forbidden("Access denied".into()));
        }
        self.store
            .policy_by_transaction(transaction_id)?
            .ok_or_else(|| Error::NotFound("No insurance policy for this transaction".into()))
    }

    /// Policy by ID (holder or transaction parties)
    pub fn policy_by_id(&self, policy_id: Uuid, user_id: Uuid) -> Result<InsurancePolicy> {
        let policy = self.load_policy(policy_id)?;
        if policy.user_id != user_id {
            let is_party = match self.store.get_transaction(policy.transaction_id) {
                Ok(tx) => tx.is_party(user_id),
                Err(rental_ledger::Error::NotFound { .. }) => false,
                Err(e) => return Err(e.into()),
            };
            if !is_party {
                return Err(Error::Forbidden("Access denied".into()));
            }
        }
        Ok(policy)
    }

    /// Claims filed against a policy (holder only)
    pub async fn claims(&self, policy_id: Uuid, user_id: Uuid) -> Result<Vec<ClaimView>> {
        let policy = self.load_policy(policy_id)?;
        if policy.user_id != user_id {
            return Err(Error::Forbidden("Access denied".into()));
        }

        let claims = self.store.claims_by_policy(policy_id)?;
        let mut views = Vec::with_capacity(claims.len());
        for claim in &claims {
            views.push(self.projector.claim(claim).await);
        }
        Ok(views)
    }
}
