//! Utility modules for the custody ledger.
//!
//! This module contains shared utilities used across the ledger:
//! - Hashes, addresses and asset identifiers
//! - Checked arithmetic and precision normalization
//! - Validation helpers
//! - Clocks
//! - Constants

pub mod constants;
pub mod crypto;
pub mod math;
pub mod time;
pub mod validation;

pub use constants::*;
pub use crypto::*;
pub use math::*;
pub use time::*;
pub use validation::*;
