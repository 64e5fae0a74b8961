//! Limit enforcement.
//!
//! Owns the running USD aggregate and checks candidate deposits against the
//! bank cap and candidate withdrawals against the per-transaction threshold.
//!
//! The aggregate is a cost basis: it grows by the value computed when a
//! deposit is accepted and shrinks by the value computed when a withdrawal is
//! accepted. It does not track price movements in between.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::amount::UsdValue;
use crate::error::{Error, Result};

/// Cap, threshold and running aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitEnforcer {
    bank_cap: UsdValue,
    withdrawal_threshold: UsdValue,
    total: UsdValue,
}

impl LimitEnforcer {
    /// Create an enforcer with an empty aggregate
    pub fn new(bank_cap: UsdValue, withdrawal_threshold: UsdValue) -> Self {
        Self {
            bank_cap,
            withdrawal_threshold,
            total: UsdValue::ZERO,
        }
    }

    /// Current aggregate
    pub fn total(&self) -> UsdValue {
        self.total
    }

    /// Room left under the cap
    pub fn available_capacity(&self) -> UsdValue {
        self.bank_cap.saturating_sub(self.total)
    }

    /// Fail unless `total + value <= cap`
    pub fn check_deposit_cap(&self, value: UsdValue) -> Result<()> {
        let exceeded = match self.total.checked_add(value) {
            Some(next) => next > self.bank_cap,
            None => true,
        };
        if exceeded {
            return Err(Error::DepositExceedsBankCap {
                total: self.total.raw(),
                value: value.raw(),
                cap: self.bank_cap.raw(),
            });
        }
        Ok(())
    }

    /// Fail if a single withdrawal is worth more than the threshold
    pub fn check_withdrawal_threshold(&self, value: UsdValue) -> Result<()> {
        if value > self.withdrawal_threshold {
            return Err(Error::WithdrawalExceedsThreshold {
                value: value.raw(),
                threshold: self.withdrawal_threshold.raw(),
            });
        }
        Ok(())
    }

    /// Add an accepted deposit to the aggregate
    pub fn apply_deposit(&mut self, value: UsdValue) -> Result<()> {
        self.total = self
            .total
            .checked_add(value)
            .ok_or_else(|| Error::overflow("total deposits"))?;
        Ok(())
    }

    /// Remove an accepted deposit from the aggregate
    pub fn revert_deposit(&mut self, value: UsdValue) {
        self.total = self.total.saturating_sub(value);
    }

    /// Subtract an accepted withdrawal from the aggregate.
    ///
    /// A withdrawal valued above the aggregate (the asset gained value since
    /// it was deposited) floors the aggregate at zero. Returns the amount
    /// actually subtracted.
    pub fn apply_withdrawal(&mut self, value: UsdValue) -> UsdValue {
        let applied = if value > self.total {
            warn!(
                value = %value,
                total = %self.total,
                "Withdrawal valued above aggregate, flooring at zero"
            );
            self.total
        } else {
            value
        };
        self.total = self.total.saturating_sub(applied);
        applied
    }

    /// Restore what [`apply_withdrawal`](Self::apply_withdrawal) subtracted
    pub fn revert_withdrawal(&mut self, applied: UsdValue) -> Result<()> {
        self.apply_deposit(applied)
    }

    /// Rebuild an enforcer with a known aggregate
    pub fn with_total(mut self, total: UsdValue) -> Self {
        self.total = total;
        self
    }
}
