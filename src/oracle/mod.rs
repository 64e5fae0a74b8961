//! Oracle module for price feeds.
//!
//! This module provides price access for valuation:
//! - Round data and the external price source interface
//! - Answer, round and staleness validation
//! - Conversion of canonical amounts into dollar values

pub mod adapter;
pub mod price_feed;

pub use adapter::*;
pub use price_feed::*;
