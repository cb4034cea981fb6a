//! Core types for the rental ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money, half-up rounding to cents)
//! - Write-through persistence (no cached mutable state)

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Round a money amount half-up to 2 decimal places
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a money amount to integer minor units (cents), rounding half-up
pub fn to_minor_units(value: Decimal) -> Option<i64> {
    (value * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
        }
    }

    /// Lowercase code as payment providers expect it
    pub fn provider_code(&self) -> String {
        self.code().to_ascii_lowercase()
    }

    /// Parse from string (case-insensitive)
    pub fn from_code(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Transaction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Requested by the borrower, awaiting acceptance or payment
    Pending,
    /// Accepted or paid, rental in progress
    Active,
    /// Rental finished (terminal)
    Completed,
    /// Withdrawn before activation (terminal)
    Cancelled,
    /// Frozen by an open dispute
    Disputed,
}

impl TransactionStatus {
    /// Wire code
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Active => "ACTIVE",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Cancelled => "CANCELLED",
            TransactionStatus::Disputed => "DISPUTED",
        }
    }

    /// Parse wire code
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TransactionStatus::Pending),
            "ACTIVE" => Some(TransactionStatus::Active),
            "COMPLETED" => Some(TransactionStatus::Completed),
            "CANCELLED" => Some(TransactionStatus::Cancelled),
            "DISPUTED" => Some(TransactionStatus::Disputed),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment sub-state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// No intent yet
    Pending,
    /// Intent created, waiting for the provider
    Processing,
    /// Provider confirmed the charge (terminal)
    Paid,
    /// Provider reported failure (terminal for that intent)
    Failed,
}

impl PaymentStatus {
    /// Wire code
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
        }
    }

    /// Check if the provider has delivered a final outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Failed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rental transaction (aggregate root)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID (UUIDv7)
    pub id: Uuid,

    /// Rented listing
    pub listing_id: Uuid,

    /// Requesting party
    pub borrower_id: Uuid,

    /// Listing owner
    pub owner_id: Uuid,

    /// Lifecycle status
    pub status: TransactionStatus,

    /// First rental day
    pub start_date: NaiveDate,

    /// Last rental day
    pub end_date: NaiveDate,

    /// Price per day times rental days
    pub total_amount: Decimal,

    /// Platform fee
    pub service_fee: Decimal,

    /// Payment sub-state
    pub payment_status: PaymentStatus,

    /// Provider payment intent reference
    pub external_payment_ref: Option<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Set on the first transition into COMPLETED
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Check if the user is the borrower or the owner
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.borrower_id == user_id || self.owner_id == user_id
    }

    /// The other party of the transaction
    pub fn counterparty(&self, user_id: Uuid) -> Uuid {
        if self.owner_id == user_id {
            self.borrower_id
        } else {
            self.owner_id
        }
    }

    /// Billable rental days, never less than one
    pub fn rental_days(&self) -> i64 {
        rental_days(self.start_date, self.end_date)
    }
}

/// Billable days between two dates, never less than one
pub fn rental_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days().max(1)
}

/// Estimated CO2 avoided by one party of a completed rental
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbonRecord {
    /// Record ID
    pub id: Uuid,
    /// Completed transaction
    pub transaction_id: Uuid,
    /// Credited user
    pub user_id: Uuid,
    /// Share credited to this user (kg)
    pub carbon_saved_kg: Decimal,
    /// Base estimate for manufacturing a new product (kg)
    pub estimated_new_product_carbon: Decimal,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Reputation bucket derived from the numeric trust score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustTier {
    /// Below silver
    Bronze,
    /// Silver
    Silver,
    /// Gold
    Gold,
    /// Top tier
    Platinum,
}

impl TrustTier {
    /// Wire code
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::Bronze => "BRONZE",
            TrustTier::Silver => "SILVER",
            TrustTier::Gold => "GOLD",
            TrustTier::Platinum => "PLATINUM",
        }
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user reputation snapshot (upserted, fully recomputed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustScore {
    /// User
    pub user_id: Uuid,
    /// Score 0-100
    pub score: Decimal,
    /// Tier for the score
    pub tier: TrustTier,
    /// Completed transactions as borrower or owner
    pub completed_transactions: u32,
    /// Mean rating received, 2 dp
    pub average_rating: Decimal,
    /// Last recomputation
    pub updated_at: DateTime<Utc>,
}

/// Insurance coverage tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageType {
    /// 2% premium, 1x coverage
    Basic,
    /// 5% premium, 2x coverage
    Standard,
    /// 8% premium, 3x coverage
    Premium,
}

impl CoverageType {
    /// Wire code
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageType::Basic => "BASIC",
            CoverageType::Standard => "STANDARD",
            CoverageType::Premium => "PREMIUM",
        }
    }

    /// Parse wire code
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "BASIC" => Some(CoverageType::Basic),
            "STANDARD" => Some(CoverageType::Standard),
            "PREMIUM" => Some(CoverageType::Premium),
            _ => None,
        }
    }
}

impl fmt::Display for CoverageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insurance policy status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyStatus {
    /// Claims may be filed
    Active,
    /// Past its expiry
    Expired,
    /// A claim cycle has started
    Claimed,
}

/// Insurance policy bought by the borrower for one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    /// Policy ID
    pub id: Uuid,
    /// Insured transaction
    pub transaction_id: Uuid,
    /// Policy holder (the borrower)
    pub user_id: Uuid,
    /// Coverage tier
    pub coverage_type: CoverageType,
    /// Premium charged
    pub premium_amount: Decimal,
    /// Payout ceiling
    pub max_coverage: Decimal,
    /// Status
    pub status: PolicyStatus,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Coverage end
    pub expires_at: DateTime<Utc>,
}

/// Insurance claim status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    /// Filed by the policy holder
    Submitted,
    /// Picked up by an adjuster
    UnderReview,
    /// Accepted, awaiting payout
    Approved,
    /// Declined
    Rejected,
    /// Paid out
    Paid,
}

impl ClaimStatus {
    /// Wire code
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Submitted => "SUBMITTED",
            ClaimStatus::UnderReview => "UNDER_REVIEW",
            ClaimStatus::Approved => "APPROVED",
            ClaimStatus::Rejected => "REJECTED",
            ClaimStatus::Paid => "PAID",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claim against an insurance policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceClaim {
    /// Claim ID
    pub id: Uuid,
    /// Policy claimed against
    pub policy_id: Uuid,
    /// Filing user (the policy holder)
    pub claimant_id: Uuid,
    /// Free-text description
    pub description: String,
    /// Requested payout, at most the policy's max coverage
    pub claim_amount: Decimal,
    /// Status
    pub status: ClaimStatus,
    /// Adjuster notes
    pub resolution_notes: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Set when the claim reaches a decision
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Reason code for a dispute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeReason {
    /// Borrower kept the item
    ItemNotReturned,
    /// Item came back damaged
    ItemDamaged,
    /// Party did not show up for the handover
    NoShow,
    /// Payment problem
    PaymentIssue,
    /// Listing did not match the item
    Misrepresentation,
    /// Anything else
    Other,
}

impl DisputeReason {
    /// Wire code
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeReason::ItemNotReturned => "ITEM_NOT_RETURNED",
            DisputeReason::ItemDamaged => "ITEM_DAMAGED",
            DisputeReason::NoShow => "NO_SHOW",
            DisputeReason::PaymentIssue => "PAYMENT_ISSUE",
            DisputeReason::Misrepresentation => "MISREPRESENTATION",
            DisputeReason::Other => "OTHER",
        }
    }

    /// Parse wire code
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "ITEM_NOT_RETURNED" => Some(DisputeReason::ItemNotReturned),
            "ITEM_DAMAGED" => Some(DisputeReason::ItemDamaged),
            "NO_SHOW" => Some(DisputeReason::NoShow),
            "PAYMENT_ISSUE" => Some(DisputeReason::PaymentIssue),
            "MISREPRESENTATION" => Some(DisputeReason::Misrepresentation),
            "OTHER" => Some(DisputeReason::Other),
            _ => None,
        }
    }
}

impl fmt::Display for DisputeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispute status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    /// Filed, not yet picked up
    Open,
    /// Being reviewed by moderation
    UnderReview,
    /// Settled with a resolution (terminal)
    Resolved,
    /// Closed without action (terminal)
    Closed,
}

impl DisputeStatus {
    /// Wire code
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "OPEN",
            DisputeStatus::UnderReview => "UNDER_REVIEW",
            DisputeStatus::Resolved => "RESOLVED",
            DisputeStatus::Closed => "CLOSED",
        }
    }

    /// Parse wire code
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(DisputeStatus::Open),
            "UNDER_REVIEW" => Some(DisputeStatus::UnderReview),
            "RESOLVED" => Some(DisputeStatus::Resolved),
            "CLOSED" => Some(DisputeStatus::Closed),
            _ => None,
        }
    }

    /// OPEN or UNDER_REVIEW
    pub fn is_open(&self) -> bool {
        matches!(self, DisputeStatus::Open | DisputeStatus::UnderReview)
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispute over a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    /// Dispute ID
    pub id: Uuid,
    /// Disputed transaction
    pub transaction_id: Uuid,
    /// Filing party
    pub reporter_id: Uuid,
    /// Reason code
    pub reason: DisputeReason,
    /// Free-text details
    pub details: String,
    /// Status
    pub status: DisputeStatus,
    /// Resolution text
    pub resolution: Option<String>,
    /// Moderator who resolved it
    pub resolved_by_id: Option<Uuid>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Set on RESOLVED/CLOSED
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
        assert_eq!(round_money(dec!(35)), dec!(35.00));
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(dec!(60.00)), Some(6000));
        assert_eq!(to_minor_units(dec!(12.345)), Some(1235));
    }

    #[test]
    fn test_rental_days_minimum_one() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(rental_days(day, day), 1);
        assert_eq!(
            rental_days(day, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()),
            2
        );
    }

    #[test]
    fn test_currency_from_code() {
        assert_eq!(Currency::from_code("usd"), Some(Currency::USD));
        assert_eq!(Currency::from_code("EUR"), Some(Currency::EUR));
        assert_eq!(Currency::from_code("XYZ"), None);
        assert_eq!(Currency::USD.provider_code(), "usd");
    }

    #[test]
    fn test_dispute_reason_codes() {
        for code in [
            "ITEM_NOT_RETURNED",
            "ITEM_DAMAGED",
            "NO_SHOW",
            "PAYMENT_ISSUE",
            "MISREPRESENTATION",
            "OTHER",
        ] {
            let reason = DisputeReason::from_code(code).unwrap();
            assert_eq!(reason.as_str(), code);
        }
        assert_eq!(DisputeReason::from_code("BORED"), None);
    }

    #[test]
    fn test_dispute_status_open() {
        assert!(DisputeStatus::Open.is_open());
        assert!(DisputeStatus::UnderReview.is_open());
        assert!(!DisputeStatus::Resolved.is_open());
        assert!(!DisputeStatus::Closed.is_open());
    }
}
