//! Canonical-precision amount types.
//!
//! Balances and dollar values share the same six-digit precision but mean
//! different things, so each gets its own newtype:
//! - [`CanonicalAmount`]: an asset quantity normalized to canonical precision
//! - [`UsdValue`]: a dollar valuation in canonical precision

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::utils::constants::{CANONICAL_DECIMALS, CANONICAL_UNIT};

/// Render a canonical-precision integer as a fixed six-digit decimal
fn to_decimal(raw: u64) -> Decimal {
    Decimal::from_i128_with_scale(raw as i128, CANONICAL_DECIMALS as u32)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CANONICAL AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Asset quantity in canonical precision (6 fractional digits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalAmount(u64);

impl CanonicalAmount {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from a raw canonical integer
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Create from whole units (for convenience)
    pub fn from_units(units: u64) -> Self {
        Self(units * CANONICAL_UNIT)
    }

    /// Get raw canonical value
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Get value in whole units (truncated)
    pub fn units(&self) -> u64 {
        self.0 / CANONICAL_UNIT
    }

    /// Exact decimal representation
    pub fn to_decimal(&self) -> Decimal {
        to_decimal(self.0)
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Saturating subtraction
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl std::fmt::Display for CanonicalAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl From<u64> for CanonicalAmount {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<CanonicalAmount> for u64 {
    fn from(amount: CanonicalAmount) -> Self {
        amount.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// USD VALUE
// ═══════════════════════════════════════════════════════════════════════════════

/// Dollar value in canonical precision (1_000_000 = $1.00)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsdValue(u64);

impl UsdValue {
    /// Zero value
    pub const ZERO: Self = Self(0);

    /// Create from a raw canonical integer
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Create from whole dollars (for convenience)
    pub fn from_dollars(dollars: u64) -> Self {
        Self(dollars * CANONICAL_UNIT)
    }

    /// Get raw canonical value
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Get value in whole dollars (truncated)
    pub fn dollars(&self) -> u64 {
        self.0 / CANONICAL_UNIT
    }

    /// Exact decimal representation
    pub fn to_decimal(&self) -> Decimal {
        to_decimal(self.0)
    }

    /// Get formatted string representation (`$50000.000000`)
    pub fn to_string_formatted(&self) -> String {
        format!("${}", self.to_decimal())
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Saturating subtraction
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl std::fmt::Display for UsdValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_formatted())
    }
}

impl From<u64> for UsdValue {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<UsdValue> for u64 {
    fn from(value: UsdValue) -> Self {
        value.0
    }
}
