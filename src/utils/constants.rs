//! Ledger constants and magic numbers.
//!
//! All ledger-wide constants are defined here for easy auditing and modification.

// ═══════════════════════════════════════════════════════════════════════════════
// PRECISION CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Fractional digits used for every internal balance and USD value
pub const CANONICAL_DECIMALS: u8 = 6;

/// One whole unit in canonical precision (1.000000)
pub const CANONICAL_UNIT: u64 = 1_000_000;

/// Largest native precision an asset may declare
pub const MAX_NATIVE_DECIMALS: u8 = 18;

/// Native precision of the platform's intrinsic asset
pub const NATIVE_ASSET_DECIMALS: u8 = 18;

/// Largest power of ten representable in a u128 (10^38)
pub const MAX_POW10_EXPONENT: u32 = 38;

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum price staleness in seconds (1 hour)
pub const MAX_PRICE_STALENESS_SECS: u64 = 3600;

// ═══════════════════════════════════════════════════════════════════════════════
// LIMIT DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default bank cap - $1,000,000 in canonical precision
pub const DEFAULT_BANK_CAP_USD: u64 = 1_000_000 * CANONICAL_UNIT;

/// Default per-transaction withdrawal threshold - $10,000 in canonical precision
pub const DEFAULT_WITHDRAWAL_THRESHOLD_USD: u64 = 10_000 * CANONICAL_UNIT;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIER CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of an address in bytes
pub const ADDRESS_LENGTH: usize = 20;
