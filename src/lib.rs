//! # Custody Ledger
//!
//! A multi-asset custodial ledger. Users deposit the native asset or
//! registered tokens, balances are kept per (owner, asset) in a canonical
//! 6-decimal precision, and every movement is valued in USD through price
//! feeds so the bank can enforce a global deposit cap and a per-transaction
//! withdrawal ceiling.
//!
//! ## Architecture
//!
//! - **Core**: Amount types, configuration, asset registry, ledger, limits,
//!   capabilities and custody transfer
//! - **Oracle**: Price source interface, staleness validation and valuation
//! - **Protocol**: The custody bank, its operations, events, guard and snapshots
//! - **CLI**: Scripted simulations for the `custody-ledger` binary
//!
//! ## Example
//!
//! ```rust,ignore
//! use custody_ledger::prelude::*;
//!
//! let bank = CustodyBank::new(BankConfig::default(), eth_usd_feed, collaborators)?;
//!
//! // Value is attached to the call by the caller's custody layer
//! let receipt = bank.deposit_native(&alice, 1_000_000_000_000_000_000)?;
//! assert_eq!(receipt.normalized_amount, CanonicalAmount::from_units(1));
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod cli;
pub mod core;
pub mod error;
pub mod oracle;
pub mod protocol;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        access::{AccessControl, Capability, RoleRegistry},
        amount::{CanonicalAmount, UsdValue},
        config::BankConfig,
        custody::{AssetTransfer, InMemoryCustody},
        registry::AssetDescriptor,
    };
    pub use crate::error::{Error, Result};
    pub use crate::oracle::price_feed::{PriceReading, PriceSource, RoundData, StaticPriceSource};
    pub use crate::protocol::{
        events::{EventRecord, LedgerEvent},
        operations::{DepositResult, LedgerOperation, OperationResult, WithdrawResult},
        snapshot::BankSnapshot,
        state_machine::{Collaborators, CustodyBank},
    };
    pub use crate::utils::{
        crypto::{Address, AssetId, Hash},
        time::{Clock, ManualClock, SystemClock},
    };
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "custody-ledger";
