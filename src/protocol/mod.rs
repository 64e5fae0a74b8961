//! Protocol module - custody bank and orchestration.
//!
//! This module provides the bank that sequences deposits, withdrawals and
//! administrative actions atomically, together with its events, operations,
//! reentrancy guard and snapshots.

pub mod events;
pub mod guard;
pub mod operations;
pub mod snapshot;
pub mod state_machine;

pub use events::*;
pub use guard::*;
pub use operations::*;
pub use snapshot::*;
pub use state_machine::*;
