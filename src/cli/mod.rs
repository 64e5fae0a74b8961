//! Custody ledger command line support.
//!
//! Simulation files, the driver that runs them and output formatting for the
//! `custody-ledger` binary.

pub mod config;
pub mod output;
pub mod simulation;

pub use config::*;
pub use output::*;
pub use simulation::*;

use crate::core::amount::{CanonicalAmount, UsdValue};
use crate::oracle::adapter::value_usd;
use crate::utils::math::{normalization_dust, normalize};

// ═══════════════════════════════════════════════════════════════════════════════
// CLI RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// CLI Error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Ledger rejected the request
    #[error("Ledger error: {0}")]
    Ledger(#[from] crate::error::Error),
    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// CLI Result type
pub type CliResult<T> = std::result::Result<T, CliError>;

// ═══════════════════════════════════════════════════════════════════════════════
// CONVERSIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Normalization of a native amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Normalization {
    /// Input in native units
    pub amount: u128,
    /// Native precision
    pub decimals: u8,
    /// Canonical amount
    pub normalized: CanonicalAmount,
    /// Native units lost to truncation
    pub dust: u128,
}

/// Normalize `amount` from `decimals` to canonical precision
pub fn normalize_amount(amount: u128, decimals: u8) -> CliResult<Normalization> {
    Ok(Normalization {
        amount,
        decimals,
        normalized: CanonicalAmount::from_raw(normalize(amount, decimals)?),
        dust: normalization_dust(amount, decimals)?,
    })
}

/// Value a canonical amount at `price` with `decimals` fractional digits
pub fn value_amount(normalized: u64, price: i64, decimals: u8) -> CliResult<UsdValue> {
    let price = u64::try_from(price)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| CliError::InvalidArgument(format!("price must be positive, got {}", price)))?;
    Ok(value_usd(CanonicalAmount::from_raw(normalized), price, decimals)?)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
