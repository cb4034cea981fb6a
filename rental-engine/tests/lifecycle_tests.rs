//! Lifecycle tests: pricing, transitions, completion cascade, insurance and
//! disputes against a real ledger.

mod common;

use common::{upcoming, TestEnvironment};
use rental_engine::{memory::Notification, VerificationStatus};
use rental_ledger::{ClaimStatus, CoverageType, DisputeStatus, PolicyStatus, TransactionStatus, TrustTier};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use uuid::Uuid;

#[tokio::test]
async fn test_two_day_rental_pricing() {
    let env = TestEnvironment::new();
    let tx = env.pending_transaction("Tools", dec!(30), 2).await;

    assert_eq!(tx.total_amount, dec!(60.00));
    assert_eq!(tx.service_fee, dec!(6.00));
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.payment_status, rental_ledger::PaymentStatus::Pending);

    // Owner hears about the request
    assert!(env.notifications.sent().iter().any(|n| matches!(
        n,
        Notification::NewTransaction { owner_id, transaction_id }
            if *owner_id == tx.owner_id && *transaction_id == tx.id
    )));
}

#[tokio::test]
async fn test_active_fee_schedule_wins_over_default() {
    let env = TestEnvironment::new();
    env.fees.set_active(Some(dec!(15)));

    let tx = env.pending_transaction("Tools", dec!(30), 2).await;
    assert_eq!(tx.service_fee, dec!(9.00));
}

#[tokio::test]
async fn test_create_rejections() {
    let env = TestEnvironment::new();
    let owner = env.add_user("Olive", VerificationStatus::Unverified);
    let borrower = env.add_user("Ben", VerificationStatus::Unverified);
    let listing = env.add_listing(owner, "Tools", dec!(10));
    let (start, end) = upcoming(3);

    let err = env
        .engine
        .orchestrator
        .create_transaction(listing, owner, start, end)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "You cannot rent your own listing");

    let err = env
        .engine
        .orchestrator
        .create_transaction(listing, borrower, end, start)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");

    let err = env
        .engine
        .orchestrator
        .create_transaction(Uuid::now_v7(), borrower, start, end)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_transition_table_enforced() {
    let env = TestEnvironment::new();
    let tx = env.pending_transaction("Tools", dec!(10), 1).await;
    let orchestrator = &env.engine.orchestrator;

    let err = orchestrator
        .update_status(tx.id, TransactionStatus::Active, tx.borrower_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    let err = orchestrator
        .update_status(tx.id, TransactionStatus::Completed, tx.owner_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");

    let err = orchestrator
        .update_status(tx.id, TransactionStatus::Cancelled, Uuid::now_v7())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    let cancelled = orchestrator
        .update_status(tx.id, TransactionStatus::Cancelled, tx.borrower_id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, TransactionStatus::Cancelled);

    let err = orchestrator
        .update_status(tx.id, TransactionStatus::Active, tx.owner_id)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Cannot change status of a CANCELLED transaction");

    // Counterparty of the cancelling borrower is told
    assert!(env.notifications.sent().iter().any(|n| matches!(
        n,
        Notification::StatusChange { user_id, status, .. }
            if *user_id == tx.owner_id && status == "CANCELLED"
    )));
}

#[tokio::test]
async fn test_completion_records_carbon_exactly_once() {
    let env = TestEnvironment::new();
    let tx = env.active_transaction("Electronics", dec!(25), 2).await;

    let completed = env
        .engine
        .orchestrator
        .update_status(tx.id, TransactionStatus::Completed, tx.borrower_id)
        .await
        .unwrap();
    assert_eq!(completed.status, TransactionStatus::Completed);
    assert!(completed.completed_at.is_some());

    let records = env.store.carbon_by_transaction(tx.id).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(env.engine.carbon.total(tx.borrower_id).unwrap(), dec!(35.00));
    assert_eq!(env.engine.carbon.total(tx.owner_id).unwrap(), dec!(15.00));

    // Retried settlement adds nothing
    env.engine.orchestrator.settle_completion(tx.id).await.unwrap();
    env.engine.orchestrator.settle_completion(tx.id).await.unwrap();
    assert_eq!(env.store.carbon_by_transaction(tx.id).unwrap().len(), 2);
    assert_eq!(env.engine.carbon.total(tx.borrower_id).unwrap(), dec!(35.00));

    // Completing again is a transition error
    let err = env
        .engine
        .orchestrator
        .update_status(tx.id, TransactionStatus::Completed, tx.owner_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");

    // Profile mirrors
    assert_eq!(env.users.profile(tx.borrower_id).carbon_saved, Some(35));
    assert_eq!(env.users.profile(tx.owner_id).carbon_saved, Some(15));
}

#[tokio::test]
async fn test_completion_recalculates_both_parties() {
    let env = TestEnvironment::new();
    let tx = env.active_transaction("Sports", dec!(5), 1).await;

    env.engine
        .orchestrator
        .update_status(tx.id, TransactionStatus::Completed, tx.owner_id)
        .await
        .unwrap();

    // Borrower: 1 completed, no ratings, phone verified
    let borrower = env.engine.trust.get(tx.borrower_id).unwrap().unwrap();
    assert_eq!(borrower.score, dec!(12));
    assert_eq!(borrower.tier, TrustTier::Bronze);
    assert_eq!(env.users.profile(tx.borrower_id).trust_score, Some(12));

    // Owner: 1 completed, no ratings, email verified
    let owner = env.engine.trust.get(tx.owner_id).unwrap().unwrap();
    assert_eq!(owner.score, dec!(7));
    assert_eq!(owner.completed_transactions, 1);
}

#[tokio::test]
async fn test_reference_user_reaches_gold() {
    let env = TestEnvironment::new();
    let user = env.add_user("Rita Regular", VerificationStatus::EmailVerified);
    let owner = env.add_user("Oscar", VerificationStatus::Unverified);
    let listing = env.add_listing(owner, "Books", dec!(2));

    for _ in 0..8 {
        let (start, end) = upcoming(1);
        let tx = env
            .engine
            .orchestrator
            .create_transaction(listing, user, start, end)
            .await
            .unwrap();
        env.engine
            .orchestrator
            .update_status(tx.id, TransactionStatus::Active, owner)
            .await
            .unwrap();
        env.engine
            .orchestrator
            .update_status(tx.id, TransactionStatus::Completed, user)
            .await
            .unwrap();
    }
    for rating in [5, 3, 4, 4] {
        env.reviews.add_rating(user, rating);
    }

    let score = env.engine.trust.recalculate(user).await.unwrap();
    assert_eq!(score.completed_transactions, 8);
    assert_eq!(score.average_rating, dec!(4.00));
    assert_eq!(score.score, dec!(61));
    assert_eq!(score.tier, TrustTier::Gold);
    assert_eq!(env.users.profile(user).trust_score, Some(61));
}

#[tokio::test]
async fn test_out_of_range_ratings_ignored() {
    let env = TestEnvironment::new();
    let user = env.add_user("Rae", VerificationStatus::Unverified);
    for rating in [0, 5, 9, 3] {
        env.reviews.add_rating(user, rating);
    }

    let score = env.engine.trust.recalculate(user).await.unwrap();
    assert_eq!(score.average_rating, dec!(4.00));
    assert_eq!(score.score, dec!(40));
    assert_eq!(score.tier, TrustTier::Silver);
}

#[tokio::test]
async fn test_standard_insurance_and_claims() {
    let env = TestEnvironment::new();
    let tx = env.pending_transaction("Tools", dec!(50), 2).await;
    assert_eq!(tx.total_amount, dec!(100));

    let insurance = &env.engine.insurance;
    let err = insurance
        .purchase(tx.id, CoverageType::Standard, tx.owner_id)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Only the borrower can add insurance");

    let policy = insurance
        .purchase(tx.id, CoverageType::Standard, tx.borrower_id)
        .await
        .unwrap();
    assert_eq!(policy.premium_amount, dec!(5.00));
    assert_eq!(policy.max_coverage, dec!(200.00));
    assert_eq!(policy.status, PolicyStatus::Active);

    let err = insurance
        .purchase(tx.id, CoverageType::Basic, tx.borrower_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONFLICT");

    let err = insurance
        .file_claim(policy.id, tx.borrower_id, "Cracked housing", dec!(250))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
    assert!(err.to_string().contains("maximum coverage of $200"));

    let err = insurance
        .file_claim(policy.id, tx.owner_id, "Not mine to claim", dec!(10))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    let claim = insurance
        .file_claim(policy.id, tx.borrower_id, "Cracked housing", dec!(150))
        .await
        .unwrap();
    assert_eq!(claim.status, ClaimStatus::Submitted);

    let policy = insurance.policy_by_id(policy.id, tx.owner_id).unwrap();
    assert_eq!(policy.status, PolicyStatus::Claimed);

    // One claim cycle per policy
    let err = insurance
        .file_claim(policy.id, tx.borrower_id, "Second try", dec!(20))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Policy is not active");

    let claims = insurance.claims(policy.id, tx.borrower_id).await.unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].claimant_name, "Ben Borrower");

    assert!(env.notifications.sent().iter().any(|n| matches!(
        n,
        Notification::InsuranceClaimFiled { policy_id, .. } if *policy_id == policy.id
    )));
}

#[tokio::test]
async fn test_claim_adjudication() {
    let env = TestEnvironment::new();
    let tx = env.active_transaction("Tools", dec!(40), 1).await;
    let insurance = &env.engine.insurance;

    let policy = insurance
        .purchase(tx.id, CoverageType::Premium, tx.borrower_id)
        .await
        .unwrap();
    assert_eq!(policy.premium_amount, dec!(3.20));
    let claim = insurance
        .file_claim(policy.id, tx.borrower_id, "Lost blade", dec!(30))
        .await
        .unwrap();

    let err = insurance
        .adjudicate_claim(claim.id, ClaimStatus::Paid, None)
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");

    let reviewed = insurance
        .adjudicate_claim(claim.id, ClaimStatus::UnderReview, None)
        .unwrap();
    assert!(reviewed.resolved_at.is_none());

    let approved = insurance
        .adjudicate_claim(claim.id, ClaimStatus::Approved, Some("Receipt checked".into()))
        .unwrap();
    assert!(approved.resolved_at.is_some());
    assert_eq!(approved.resolution_notes.as_deref(), Some("Receipt checked"));

    let paid = insurance
        .adjudicate_claim(claim.id, ClaimStatus::Paid, None)
        .unwrap();
    assert_eq!(paid.status, ClaimStatus::Paid);
    assert_eq!(paid.resolution_notes.as_deref(), Some("Receipt checked"));
}

#[tokio::test]
async fn test_insurance_preconditions() {
    let env = TestEnvironment::new();

    let free = env.pending_transaction("Books", Decimal::ZERO, 3).await;
    let err = env
        .engine
        .insurance
        .purchase(free.id, CoverageType::Basic, free.borrower_id)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Insurance is not available for free transactions");

    let tx = env.active_transaction("Tools", dec!(10), 1).await;
    env.engine
        .orchestrator
        .update_status(tx.id, TransactionStatus::Completed, tx.owner_id)
        .await
        .unwrap();
    let err = env
        .engine
        .insurance
        .purchase(tx.id, CoverageType::Basic, tx.borrower_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");

    // Floor applies: 2% of 10 is below the minimum premium
    let small = env.pending_transaction("Tools", dec!(10), 1).await;
    let policy = env
        .engine
        .insurance
        .purchase(small.id, CoverageType::Basic, small.borrower_id)
        .await
        .unwrap();
    assert_eq!(policy.premium_amount, dec!(1.00));
    assert_eq!(policy.max_coverage, dec!(10.00));
}

#[tokio::test]
async fn test_dispute_freezes_transaction() {
    let env = TestEnvironment::new();
    let tx = env.active_transaction("Tools", dec!(20), 2).await;
    let disputes = &env.engine.disputes;

    let dispute = disputes
        .open_dispute(tx.id, tx.borrower_id, "ITEM_DAMAGED", "Arrived broken")
        .await
        .unwrap();
    assert_eq!(dispute.status, DisputeStatus::Open);

    let frozen = env.store.get_transaction(tx.id).unwrap();
    assert_eq!(frozen.status, TransactionStatus::Disputed);

    // Open dispute blocks another
    let err = disputes
        .open_dispute(tx.id, tx.owner_id, "NO_SHOW", "Never came")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONFLICT");

    // Counterparty notified
    assert!(env.notifications.sent().iter().any(|n| matches!(
        n,
        Notification::DisputeFiled { user_id, .. } if *user_id == tx.owner_id
    )));

    // DISPUTED is frozen for actors
    let err = env
        .engine
        .orchestrator
        .update_status(tx.id, TransactionStatus::Completed, tx.owner_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_dispute_validation() {
    let env = TestEnvironment::new();
    let tx = env.active_transaction("Tools", dec!(20), 2).await;
    let disputes = &env.engine.disputes;

    let err = disputes
        .open_dispute(tx.id, tx.borrower_id, "BAD_VIBES", "")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid dispute reason: BAD_VIBES");

    let err = disputes
        .open_dispute(tx.id, Uuid::now_v7(), "OTHER", "")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    let pending = env.pending_transaction("Tools", dec!(20), 2).await;
    let err = disputes
        .open_dispute(pending.id, pending.borrower_id, "OTHER", "")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");
    assert!(env.store.disputes_by_transaction(pending.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_dispute_resolution() {
    let env = TestEnvironment::new();
    let tx = env.active_transaction("Tools", dec!(20), 2).await;
    let disputes = &env.engine.disputes;

    let dispute = disputes
        .open_dispute(tx.id, tx.owner_id, "ITEM_NOT_RETURNED", "Still waiting")
        .await
        .unwrap();
    let moderator = env.add_user("Mia Moderator", VerificationStatus::IdentityVerified);

    disputes.begin_review(dispute.id).unwrap();
    let err = disputes
        .resolve(dispute.id, moderator, DisputeStatus::UnderReview, "")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");

    let resolved = disputes
        .resolve(dispute.id, moderator, DisputeStatus::Resolved, "Item returned")
        .await
        .unwrap();
    assert_eq!(resolved.status, DisputeStatus::Resolved);
    assert_eq!(resolved.resolved_by_id, Some(moderator));
    assert!(resolved.resolved_at.is_some());

    let err = disputes
        .resolve(dispute.id, moderator, DisputeStatus::Closed, "again")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Dispute is already RESOLVED");

    // Status is not restored
    let tx_after = env.store.get_transaction(tx.id).unwrap();
    assert_eq!(tx_after.status, TransactionStatus::Disputed);

    // Reporter notified
    assert!(env.notifications.sent().iter().any(|n| matches!(
        n,
        Notification::DisputeResolved { user_id, resolution }
            if *user_id == tx.owner_id && resolution == "Item returned"
    )));

    let view = disputes.get(dispute.id, tx.borrower_id).await.unwrap();
    assert_eq!(view.resolved_by_name.as_deref(), Some("Mia Moderator"));
    assert_eq!(view.reporter_name, "Olive Owner");

    // A fresh dispute is allowed once the previous one is closed
    disputes
        .open_dispute(tx.id, tx.borrower_id, "OTHER", "Follow-up")
        .await
        .unwrap();
    assert_eq!(disputes.by_transaction(tx.id, tx.owner_id).await.unwrap().len(), 2);
    assert_eq!(disputes.mine(tx.owner_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_notification_failures_do_not_roll_back() {
    let env = TestEnvironment::new();
    env.notifications.set_failing(true);

    let tx = env.pending_transaction("Tools", dec!(10), 1).await;
    env.engine
        .orchestrator
        .update_status(tx.id, TransactionStatus::Active, tx.owner_id)
        .await
        .unwrap();

    let stored = env.store.get_transaction(tx.id).unwrap();
    assert_eq!(stored.status, TransactionStatus::Active);
    assert!(!env.notifications.sent().is_empty());
}

#[tokio::test]
async fn test_transaction_views() {
    let env = TestEnvironment::new();
    let first = env.pending_transaction("Tools", dec!(10), 1).await;
    let owner = first.owner_id;
    let borrower = env.add_user("Second Borrower", VerificationStatus::Unverified);
    let (start, end) = upcoming(2);
    let second = env
        .engine
        .orchestrator
        .create_transaction(first.listing_id, borrower, start, end)
        .await
        .unwrap();

    let view = env
        .engine
        .orchestrator
        .get_transaction(first.id, first.borrower_id)
        .await
        .unwrap();
    assert_eq!(view.listing_title, "Tools listing");
    assert_eq!(view.borrower_name, "Ben Borrower");
    assert_eq!(view.owner_name, "Olive Owner");

    let err = env
        .engine
        .orchestrator
        .get_transaction(first.id, borrower)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    // Newest first
    let mine = env.engine.orchestrator.user_transactions(owner).await.unwrap();
    let ids: Vec<Uuid> = mine.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

#[tokio::test]
async fn test_community_report() {
    let env = TestEnvironment::new();
    let tx = env.active_transaction("Electronics", dec!(10), 1).await;
    env.engine
        .orchestrator
        .update_status(tx.id, TransactionStatus::Completed, tx.borrower_id)
        .await
        .unwrap();

    let report = env.engine.carbon.community_report().await.unwrap();
    assert_eq!(report.total_carbon_saved_kg, dec!(50.00));
    assert_eq!(report.total_completed_transactions, 1);
    assert_eq!(report.total_active_users, 2);
    assert_eq!(report.avg_carbon_per_transaction, dec!(50.00));
    assert_eq!(report.top_contributors.len(), 2);
    assert_eq!(report.top_contributors[0].user_id, tx.borrower_id);
    assert_eq!(report.top_contributors[0].name, "Ben Borrower");

    let board = env.engine.carbon.leaderboard(1).await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].total_carbon_saved, dec!(35.00));
}

#[tokio::test]
async fn test_failed_dispute_write_leaves_no_trace() {
    let env = TestEnvironment::new();
    let tx = env.active_transaction("Tools", dec!(20), 2).await;
    let disputes = &env.engine.disputes;

    env.faults.fail_dispute_inserts.store(true, Ordering::SeqCst);
    assert!(disputes
        .open_dispute(tx.id, tx.borrower_id, "ITEM_DAMAGED", "Arrived broken")
        .await
        .is_err_and(|e| e.code() == "INTERNAL"));
    assert_eq!(
        env.store.get_transaction(tx.id).unwrap().status,
        TransactionStatus::Active
    );
    assert!(env.store.disputes_by_transaction(tx.id).unwrap().is_empty());

    // Retry goes through once the ledger recovers
    env.faults.fail_dispute_inserts.store(false, Ordering::SeqCst);
    disputes
        .open_dispute(tx.id, tx.borrower_id, "ITEM_DAMAGED", "Arrived broken")
        .await
        .unwrap();
    assert_eq!(
        env.store.get_transaction(tx.id).unwrap().status,
        TransactionStatus::Disputed
    );
    assert_eq!(env.store.disputes_by_transaction(tx.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_dispute_does_not_depend_on_separate_status_write() {
    let env = TestEnvironment::new();
    let tx = env.active_transaction("Tools", dec!(20), 2).await;

    env.faults
        .fail_transaction_updates
        .store(true, Ordering::SeqCst);
    env.engine
        .disputes
        .open_dispute(tx.id, tx.owner_id, "ITEM_NOT_RETURNED", "Still waiting")
        .await
        .unwrap();

    let stored = env.store.get_transaction(tx.id).unwrap();
    assert_eq!(stored.status, TransactionStatus::Disputed);
    let open = env.store.disputes_by_transaction(tx.id).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].status, DisputeStatus::Open);
}

#[tokio::test]
async fn test_failed_claim_write_keeps_policy_active() {
    let env = TestEnvironment::new();
    let tx = env.active_transaction("Tools", dec!(40), 1).await;
    let insurance = &env.engine.insurance;

    let policy = insurance
        .purchase(tx.id, CoverageType::Standard, tx.borrower_id)
        .await
        .unwrap();

    env.faults.fail_claim_inserts.store(true, Ordering::SeqCst);
    assert!(insurance
        .file_claim(policy.id, tx.borrower_id, "Bent frame", dec!(25))
        .await
        .is_err_and(|e| e.code() == "INTERNAL"));
    assert_eq!(
        env.store.get_policy(policy.id).unwrap().status,
        PolicyStatus::Active
    );
    assert!(env.store.claims_by_policy(policy.id).unwrap().is_empty());

    env.faults.fail_claim_inserts.store(false, Ordering::SeqCst);
    let claim = insurance
        .file_claim(policy.id, tx.borrower_id, "Bent frame", dec!(25))
        .await
        .unwrap();
    assert_eq!(claim.status, ClaimStatus::Submitted);
    assert_eq!(
        env.store.get_policy(policy.id).unwrap().status,
        PolicyStatus::Claimed
    );
}

#[tokio::test]
async fn test_claim_lookup_errors() {
    let env = TestEnvironment::new();
    let insurance = &env.engine.insurance;

    let err = insurance
        .adjudicate_claim(Uuid::now_v7(), ClaimStatus::UnderReview, None)
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert_eq!(err.to_string(), "Insurance claim not found");

    // Storage faults surface as internal errors, not as a missing claim
    env.faults.fail_claim_reads.store(true, Ordering::SeqCst);
    let err = insurance
        .adjudicate_claim(Uuid::now_v7(), ClaimStatus::UnderReview, None)
        .unwrap_err();
    assert_eq!(err.code(), "INTERNAL");
}
