//! Bank configuration.
//!
//! The cap, the withdrawal ceiling and the staleness window are fixed when a
//! bank is constructed and never change afterwards. All dollar amounts are in
//! canonical precision.

use serde::{Deserialize, Serialize};

use crate::core::amount::UsdValue;
use crate::error::{Error, Result};
use crate::utils::constants::*;

/// Environment variable overriding the bank cap
pub const ENV_BANK_CAP_USD: &str = "CUSTODY_BANK_CAP_USD";
/// Environment variable overriding the withdrawal threshold
pub const ENV_WITHDRAWAL_THRESHOLD_USD: &str = "CUSTODY_WITHDRAWAL_THRESHOLD_USD";
/// Environment variable overriding the staleness window
pub const ENV_MAX_PRICE_AGE_SECS: &str = "CUSTODY_MAX_PRICE_AGE_SECS";

// ═══════════════════════════════════════════════════════════════════════════════
// BANK CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable bank parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankConfig {
    /// Maximum aggregate USD value the bank will hold
    pub bank_cap_usd: UsdValue,

    /// Maximum USD value of a single withdrawal
    pub withdrawal_threshold_usd: UsdValue,

    /// Maximum accepted age of a price reading in seconds
    #[serde(default = "default_max_price_age")]
    pub max_price_age_secs: u64,
}

fn default_max_price_age() -> u64 {
    MAX_PRICE_STALENESS_SECS
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            bank_cap_usd: UsdValue::from_raw(DEFAULT_BANK_CAP_USD),
            withdrawal_threshold_usd: UsdValue::from_raw(DEFAULT_WITHDRAWAL_THRESHOLD_USD),
            max_price_age_secs: MAX_PRICE_STALENESS_SECS,
        }
    }
}

impl BankConfig {
    /// Create a new configuration with the default staleness window
    pub fn new(bank_cap_usd: UsdValue, withdrawal_threshold_usd: UsdValue) -> Self {
        Self {
            bank_cap_usd,
            withdrawal_threshold_usd,
            ..Default::default()
        }
    }

    /// Set the bank cap
    pub fn with_bank_cap(mut self, cap: UsdValue) -> Self {
        self.bank_cap_usd = cap;
        self
    }

    /// Set the per-transaction withdrawal threshold
    pub fn with_withdrawal_threshold(mut self, threshold: UsdValue) -> Self {
        self.withdrawal_threshold_usd = threshold;
        self
    }

    /// Set the staleness window
    pub fn with_max_price_age(mut self, secs: u64) -> Self {
        self.max_price_age_secs = secs;
        self
    }

    /// Overlay `CUSTODY_*` values from `lookup` on top of this configuration,
    /// then validate the result.
    ///
    /// Values are raw canonical integers (`1000000` = $1). Keys the lookup
    /// does not know keep their current value.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(cap) = lookup(ENV_BANK_CAP_USD) {
            self.bank_cap_usd = UsdValue::from_raw(parse_var(ENV_BANK_CAP_USD, &cap)?);
        }

        if let Some(threshold) = lookup(ENV_WITHDRAWAL_THRESHOLD_USD) {
            self.withdrawal_threshold_usd =
                UsdValue::from_raw(parse_var(ENV_WITHDRAWAL_THRESHOLD_USD, &threshold)?);
        }

        if let Some(age) = lookup(ENV_MAX_PRICE_AGE_SECS) {
            self.max_price_age_secs = parse_var(ENV_MAX_PRICE_AGE_SECS, &age)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.bank_cap_usd.is_zero() {
            return Err(Error::InvalidConfig("bank cap must be greater than 0".into()));
        }

        if self.withdrawal_threshold_usd.is_zero() {
            return Err(Error::InvalidConfig(
                "withdrawal threshold must be greater than 0".into(),
            ));
        }

        if self.withdrawal_threshold_usd > self.bank_cap_usd {
            return Err(Error::InvalidConfig(format!(
                "withdrawal threshold {} exceeds bank cap {}",
                self.withdrawal_threshold_usd, self.bank_cap_usd
            )));
        }

        if self.max_price_age_secs == 0 {
            return Err(Error::InvalidConfig(
                "price staleness window must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Summary for logging
    pub fn summary(&self) -> String {
        format!(
            "cap: {}, withdrawal threshold: {}, max price age: {}s",
            self.bank_cap_usd, self.withdrawal_threshold_usd, self.max_price_age_secs
        )
    }
}

fn parse_var(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{}={}: {}", key, value, e)))
}
