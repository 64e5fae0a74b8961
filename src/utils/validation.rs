//! Input validation utilities for the custody ledger.
//!
//! This module provides validation functions to ensure inputs meet
//! ledger requirements before any state is touched.

use crate::error::{Error, Result};
use crate::utils::crypto::{Address, AssetId};

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that a native amount is non-zero
pub fn validate_non_zero(amount: u128) -> Result<()> {
    if amount == 0 {
        return Err(Error::AmountMustBeGreaterThanZero);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that a price source binding is set
pub fn validate_price_source(asset: &AssetId, price_source: &Address) -> Result<()> {
    if price_source.is_zero() {
        return Err(Error::InvalidPriceFeed(format!(
            "no price source for asset {}",
            asset
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that a price answer is strictly positive
pub fn validate_price_answer(answer: i64) -> Result<u64> {
    if answer <= 0 {
        return Err(Error::InvalidPrice(answer));
    }
    Ok(answer as u64)
}

/// Validate that the round carrying a price is complete
pub fn validate_round_complete(round_id: u64, answered_in_round: u64, updated_at: u64) -> Result<()> {
    if answered_in_round < round_id {
        return Err(Error::stale(format!(
            "round {} answered in earlier round {}",
            round_id, answered_in_round
        )));
    }
    if updated_at == 0 {
        return Err(Error::stale(format!("round {} was never updated", round_id)));
    }
    Ok(())
}

/// Validate price timestamp is not stale.
///
/// Timestamps ahead of `current_time` count as age zero.
pub fn validate_price_freshness(updated_at: u64, current_time: u64, max_age: u64) -> Result<()> {
    let age = current_time.saturating_sub(updated_at);
    if age > max_age {
        return Err(Error::stale(format!(
            "last update {}s ago, max allowed {}s",
            age, max_age
        )));
    }
    Ok(())
}
