//! Trust evaluator
//!
//! `score = min(max, completed * points + avg_rating * weight + bonus)`,
//! recomputed from scratch on every call. Concurrent recomputations for the
//! same user write the same value, last write wins.

use crate::{
    collaborators::{ReviewSource, UserDirectory, VerificationStatus},
    config::TrustConfig,
    Error, Result,
};
use chrono::Utc;
use rental_ledger::{round_money, LedgerStore, TrustScore, TrustTier};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Pure scoring rules
#[derive(Debug, Clone)]
pub struct TrustPolicy {
    config: TrustConfig,
}

impl TrustPolicy {
    /// Create policy
    pub fn new(config: TrustConfig) -> Self {
        Self { config }
    }

    /// Bonus for the first matching verification level
    pub fn verification_bonus(&self, status: Option<VerificationStatus>) -> Decimal {
        match status {
            Some(VerificationStatus::IdentityVerified) => self.config.identity_bonus,
            Some(VerificationStatus::PhoneVerified) => self.config.phone_bonus,
            Some(VerificationStatus::EmailVerified) => self.config.email_bonus,
            Some(VerificationStatus::Unverified) | None => Decimal::ZERO,
        }
    }

    /// Mean rating, 2 dp; zero with no ratings
    pub fn average_rating(&self, ratings: &[u8]) -> Decimal {
        if ratings.is_empty() {
            return Decimal::ZERO;
        }
        let sum: Decimal = ratings.iter().map(|r| Decimal::from(*r)).sum();
        round_money(sum / Decimal::from(ratings.len()))
    }

    /// Capped score
    pub fn score(&self, completed: u32, average_rating: Decimal, bonus: Decimal) -> Decimal {
        let raw = Decimal::from(completed) * self.config.points_per_transaction
            + average_rating * self.config.rating_weight
            + bonus;
        raw.min(self.config.max_score)
    }

    /// Tier for a score, bucketed on its integer part
    pub fn tier(&self, score: Decimal) -> TrustTier {
        let whole = score.trunc().to_i64().unwrap_or(0);
        if whole >= self.config.platinum_threshold {
            TrustTier::Platinum
        } else if whole >= self.config.gold_threshold {
            TrustTier::Gold
        } else if whole >= self.config.silver_threshold {
            TrustTier::Silver
        } else {
            TrustTier::Bronze
        }
    }
}

/// Trust evaluator
pub struct TrustEvaluator {
    store: Arc<dyn LedgerStore>,
    users: Arc<dyn UserDirectory>,
    reviews: Arc<dyn ReviewSource>,
    policy: TrustPolicy,
}

impl std::fmt::Debug for TrustEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustEvaluator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TrustEvaluator {
    /// Create evaluator
    pub fn new(
        store: Arc<dyn LedgerStore>,
        users: Arc<dyn UserDirectory>,
        reviews: Arc<dyn ReviewSource>,
        config: TrustConfig,
    ) -> Self {
        Self {
            store,
            users,
            reviews,
            policy: TrustPolicy::new(config),
        }
    }

    /// Scoring rules in use
    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Recompute and persist a user's trust score
    pub async fn recalculate(&self, user_id: Uuid) -> Result<TrustScore> {
        let completed = self.store.count_completed_for_user(user_id)?;

        let mut ratings = self
            .reviews
            .ratings_received(user_id)
            .await
            .map_err(|e| Error::collaborator("review source", e))?;
        let received = ratings.len();
        ratings.retain(|r| (1..=5).contains(r));
        if ratings.len() != received {
            warn!(
                %user_id,
                dropped = received - ratings.len(),
                "Ignoring ratings outside 1-5"
            );
        }
        let average_rating = self.policy.average_rating(&ratings);

        let verification = self
            .users
            .find_user(user_id)
            .await
            .map_err(|e| Error::collaborator("user directory", e))?
            .map(|u| u.verification_status);
        let bonus = self.policy.verification_bonus(verification);

        let score = self.policy.score(completed, average_rating, bonus);
        let trust_score = TrustScore {
            user_id,
            score,
            tier: self.policy.tier(score),
            completed_transactions: completed,
            average_rating,
            updated_at: Utc::now(),
        };

        self.store.upsert_trust_score(&trust_score)?;

        let whole = score.trunc().to_i64().unwrap_or(0);
        if let Err(e) = self.users.update_trust_score(user_id, whole).await {
            warn!(%user_id, error = %e, "Failed to mirror trust score onto profile");
        }

        info!(
            %user_id,
            score = %trust_score.score,
            tier = %trust_score.tier,
            completed,
            "Trust score recalculated"
        );
        Ok(trust_score)
    }

    /// Stored trust score, if one was ever computed
    pub fn get(&self, user_id: Uuid) -> Result<Option<TrustScore>> {
        Ok(self.store.get_trust_score(user_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn policy() -> TrustPolicy {
        TrustPolicy::new(TrustConfig::default())
    }

    #[test]
    fn test_reference_user() {
        // 8 completed, 4.0 average, email verified
        let p = policy();
        let bonus = p.verification_bonus(Some(VerificationStatus::EmailVerified));
        let score = p.score(8, dec!(4.00), bonus);
        assert_eq!(score, dec!(61.00));
        assert_eq!(p.tier(score), TrustTier::Gold);
    }

    #[test]
    fn test_score_capped() {
        let p = policy();
        assert_eq!(p.score(60, dec!(5), dec!(15)), dec!(100));
        assert_eq!(p.tier(dec!(100)), TrustTier::Platinum);
    }

    #[test]
    fn test_tier_boundaries_inclusive() {
        let p = policy();
        assert_eq!(p.tier(dec!(25.99)), TrustTier::Bronze);
        assert_eq!(p.tier(dec!(26)), TrustTier::Silver);
        assert_eq!(p.tier(dec!(50.5)), TrustTier::Silver);
        assert_eq!(p.tier(dec!(51)), TrustTier::Gold);
        assert_eq!(p.tier(dec!(75.99)), TrustTier::Gold);
        assert_eq!(p.tier(dec!(76)), TrustTier::Platinum);
    }

    #[test]
    fn test_verification_bonus_not_cumulative() {
        let p = policy();
        assert_eq!(
            p.verification_bonus(Some(VerificationStatus::IdentityVerified)),
            dec!(15)
        );
        assert_eq!(
            p.verification_bonus(Some(VerificationStatus::PhoneVerified)),
            dec!(10)
        );
        assert_eq!(p.verification_bonus(None), Decimal::ZERO);
    }

    #[test]
    fn test_average_rating() {
        let p = policy();
        assert_eq!(p.average_rating(&[]), Decimal::ZERO);
        assert_eq!(p.average_rating(&[5, 4, 4]), dec!(4.33));
        assert_eq!(p.average_rating(&[5, 4]), dec!(4.50));
        assert_eq!(p.average_rating(&[1, 1, 2]), dec!(1.33));
        assert_eq!(p.average_rating(&[2, 2, 1]), dec!(1.67));
    }
}
