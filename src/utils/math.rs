//! Checked arithmetic and precision normalization.
//!
//! Multiplication and scaling with overflow protection, and the conversions
//! between an asset's native precision and the canonical six-digit
//! accounting precision.

use crate::error::{Error, Result};
use crate::utils::constants::{CANONICAL_DECIMALS, MAX_NATIVE_DECIMALS, MAX_POW10_EXPONENT};

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// 10^exp as a u128
pub fn pow10(exp: u32) -> Result<u128> {
    if exp > MAX_POW10_EXPONENT {
        return Err(Error::overflow(format!("10^{}", exp)));
    }
    10u128
        .checked_pow(exp)
        .ok_or_else(|| Error::overflow(format!("10^{}", exp)))
}

/// Safe multiplication then division (multiply first for precision).
/// Computes (a * b) / c with a u128 intermediate, truncating toward zero.
pub fn safe_mul_div(a: u64, b: u64, c: u128) -> Result<u64> {
    if c == 0 {
        return Err(Error::Internal("division by zero".into()));
    }
    let product = (a as u128)
        .checked_mul(b as u128)
        .ok_or_else(|| Error::overflow(format!("{} * {}", a, b)))?;
    let result = product / c;
    u64::try_from(result).map_err(|_| Error::overflow(format!("({} * {}) / {}", a, b, c)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// NORMALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that a native precision is supported
pub fn check_decimals(native_decimals: u8) -> Result<()> {
    if native_decimals > MAX_NATIVE_DECIMALS {
        return Err(Error::InvalidDecimals {
            decimals: native_decimals,
            max: MAX_NATIVE_DECIMALS,
        });
    }
    Ok(())
}

/// Convert a native-unit amount to canonical precision.
///
/// Assets with more than six decimals are truncated (dust below one canonical
/// unit is dropped); assets with fewer are scaled up exactly. The result must
/// fit a canonical `u64`.
pub fn normalize(amount: u128, native_decimals: u8) -> Result<u64> {
    check_decimals(native_decimals)?;

    let scaled = if native_decimals == CANONICAL_DECIMALS {
        amount
    } else if native_decimals > CANONICAL_DECIMALS {
        let divisor = pow10((native_decimals - CANONICAL_DECIMALS) as u32)?;
        amount / divisor
    } else {
        let factor = pow10((CANONICAL_DECIMALS - native_decimals) as u32)?;
        amount
            .checked_mul(factor)
            .ok_or_else(|| Error::overflow(format!("normalize {} * {}", amount, factor)))?
    };

    u64::try_from(scaled)
        .map_err(|_| Error::overflow(format!("normalize {} ({} decimals)", amount, native_decimals)))
}

/// Native units dropped by [`normalize`] for the given amount
pub fn normalization_dust(amount: u128, native_decimals: u8) -> Result<u128> {
    check_decimals(native_decimals)?;
    if native_decimals <= CANONICAL_DECIMALS {
        return Ok(0);
    }
    let divisor = pow10((native_decimals - CANONICAL_DECIMALS) as u32)?;
    Ok(amount % divisor)
}
