//! Configuration for the rental engine
//!
//! Lookup tables (carbon per category, coverage terms, trust weights) live
//! here and are handed to components at construction. Nothing mutates them at
//! runtime.

use payment_adapters::{webhook::DEFAULT_TOLERANCE_SECONDS, HttpProviderConfig};
use rental_ledger::{CoverageType, Currency};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Rental engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Ledger storage
    pub ledger: rental_ledger::Config,

    /// Payment provider and webhook settings
    pub payment: PaymentConfig,

    /// Service fee settings
    pub fees: FeeConfig,

    /// Carbon accounting table
    pub carbon: CarbonConfig,

    /// Insurance pricing
    pub insurance: InsuranceConfig,

    /// Trust scoring weights and tiers
    pub trust: TrustConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "rental-engine".to_string(),
            ledger: rental_ledger::Config::default(),
            payment: PaymentConfig::default(),
            fees: FeeConfig::default(),
            carbon: CarbonConfig::default(),
            insurance: InsuranceConfig::default(),
            trust: TrustConfig::default(),
        }
    }
}

/// Payment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// ISO 4217 code every intent is created in
    pub currency: String,

    /// Provider API connection
    pub provider: HttpProviderConfig,

    /// Shared webhook signing secret
    pub webhook_secret: String,

    /// Accepted age of a webhook signature (seconds)
    pub webhook_tolerance_seconds: i64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            provider: HttpProviderConfig::default(),
            webhook_secret: String::new(),
            webhook_tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
        }
    }
}

impl PaymentConfig {
    /// Parsed currency
    pub fn currency(&self) -> crate::Result<Currency> {
        Currency::from_code(&self.currency)
            .ok_or_else(|| crate::Error::Config(format!("unsupported currency {}", self.currency)))
    }
}

/// Service fee configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Percentage used when the fee schedule has no active row
    pub default_percentage: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            default_percentage: Decimal::TEN,
        }
    }
}

/// Carbon accounting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarbonConfig {
    /// CO2 kg avoided by renting instead of buying, per listing category
    pub category_kg: BTreeMap<String, Decimal>,

    /// Fallback for categories missing from the table
    pub default_kg: Decimal,

    /// Share credited to the borrower
    pub borrower_share: Decimal,

    /// Share credited to the owner
    pub owner_share: Decimal,
}

impl Default for CarbonConfig {
    fn default() -> Self {
        let category_kg = [
            ("Electronics", 50),
            ("Tools", 20),
            ("Sports", 15),
            ("Furniture", 100),
            ("Books", 5),
            ("Clothing", 10),
            ("Other", 10),
        ]
        .into_iter()
        .map(|(category, kg)| (category.to_string(), Decimal::from(kg)))
        .collect();

        Self {
            category_kg,
            default_kg: Decimal::TEN,
            borrower_share: Decimal::new(70, 2),
            owner_share: Decimal::new(30, 2),
        }
    }
}

impl CarbonConfig {
    /// Base estimate for a category
    pub fn base_kg(&self, category: &str) -> Decimal {
        self.category_kg
            .get(category)
            .copied()
            .unwrap_or(self.default_kg)
    }
}

/// Premium rate and payout multiplier of one coverage tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageTerms {
    /// Fraction of the transaction total charged as premium
    pub premium_rate: Decimal,
    /// Multiple of the transaction total paid out at most
    pub coverage_multiplier: Decimal,
}

/// Insurance pricing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsuranceConfig {
    /// BASIC terms
    pub basic: CoverageTerms,
    /// STANDARD terms
    pub standard: CoverageTerms,
    /// PREMIUM terms
    pub premium: CoverageTerms,
    /// Premium floor
    pub min_premium: Decimal,
    /// Policy lifetime when the rental has no end date
    pub default_expiry_days: i64,
}

impl Default for InsuranceConfig {
    fn default() -> Self {
        Self {
            basic: CoverageTerms {
                premium_rate: Decimal::new(2, 2),
                coverage_multiplier: Decimal::ONE,
            },
            standard: CoverageTerms {
                premium_rate: Decimal::new(5, 2),
                coverage_multiplier: Decimal::TWO,
            },
            premium: CoverageTerms {
                premium_rate: Decimal::new(8, 2),
                coverage_multiplier: Decimal::from(3),
            },
            min_premium: Decimal::ONE,
            default_expiry_days: 30,
        }
    }
}

impl InsuranceConfig {
    /// Terms for a coverage tier
    pub fn terms(&self, coverage: CoverageType) -> CoverageTerms {
        match coverage {
            CoverageType::Basic => self.basic,
            CoverageType::Standard => self.standard,
            CoverageType::Premium => self.premium,
        }
    }
}

/// Trust scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Points per completed transaction
    pub points_per_transaction: Decimal,
    /// Multiplier applied to the average rating
    pub rating_weight: Decimal,
    /// Score ceiling
    pub max_score: Decimal,
    /// Bonus for IDENTITY_VERIFIED users
    pub identity_bonus: Decimal,
    /// Bonus for PHONE_VERIFIED users
    pub phone_bonus: Decimal,
    /// Bonus for EMAIL_VERIFIED users
    pub email_bonus: Decimal,
    /// Lowest SILVER score
    pub silver_threshold: i64,
    /// Lowest GOLD score
    pub gold_threshold: i64,
    /// Lowest PLATINUM score
    pub platinum_threshold: i64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            points_per_transaction: Decimal::TWO,
            rating_weight: Decimal::TEN,
            max_score: Decimal::ONE_HUNDRED,
            identity_bonus: Decimal::from(15),
            phone_bonus: Decimal::TEN,
            email_bonus: Decimal::from(5),
            silver_threshold: 26,
            gold_threshold: 51,
            platinum_threshold: 76,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("RENTAL_DATA_DIR") {
            config.ledger.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(currency) = std::env::var("PAYMENT_CURRENCY") {
            config.payment.currency = currency;
        }
        if let Ok(base_url) = std::env::var("PAYMENT_API_BASE_URL") {
            config.payment.provider.api_base_url = base_url;
        }
        if let Ok(secret_key) = std::env::var("PAYMENT_SECRET_KEY") {
            config.payment.provider.secret_key = secret_key;
        }
        if let Ok(secret) = std::env::var("PAYMENT_WEBHOOK_SECRET") {
            config.payment.webhook_secret = secret;
        }
        if let Ok(fee) = std::env::var("SERVICE_FEE_PERCENTAGE") {
            config.fees.default_percentage = fee
                .parse()
                .map_err(|e| crate::Error::Config(format!("SERVICE_FEE_PERCENTAGE: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        self.payment.currency()?;

        if self.fees.default_percentage < Decimal::ZERO
            || self.fees.default_percentage > Decimal::ONE_HUNDRED
        {
            return Err(crate::Error::Config(
                "default fee percentage must be within 0..=100".into(),
            ));
        }
        if self.carbon.borrower_share + self.carbon.owner_share != Decimal::ONE {
            return Err(crate::Error::Config(
                "carbon shares must add up to 1".into(),
            ));
        }
        let t = &self.trust;
        if !(0 < t.silver_threshold
            && t.silver_threshold < t.gold_threshold
            && t.gold_threshold < t.platinum_threshold)
        {
            return Err(crate::Error::Config(
                "trust tier thresholds must be strictly increasing".into(),
            ));
        }
        Ok(())
    }
}
