//! Core modules for the custody ledger.
//!
//! This module contains the fundamental building blocks:
//! - Canonical amount and dollar value types
//! - Bank configuration
//! - Asset registry with soft delete
//! - Balance ledger
//! - Cap and threshold enforcement
//! - Capability checks and custody movement interfaces

pub mod access;
pub mod amount;
pub mod config;
pub mod custody;
pub mod ledger;
pub mod limits;
pub mod registry;

pub use access::*;
pub use amount::*;
pub use config::*;
pub use custody::*;
pub use ledger::*;
pub use limits::*;
pub use registry::*;
