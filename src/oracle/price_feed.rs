//! Price feed interface.
//!
//! This module provides:
//! - Round data as reported by an external feed
//! - Validated price readings
//! - The [`PriceSource`] interface and an in-memory implementation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::utils::crypto::Address;

// ═══════════════════════════════════════════════════════════════════════════════
// ROUND DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// Latest round reported by a feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoundData {
    /// Round identifier
    pub round_id: u64,
    /// Reported price, scaled by the feed's decimals
    pub answer: i64,
    /// Unix timestamp the round started
    pub started_at: u64,
    /// Unix timestamp of the last update (0 = never)
    pub updated_at: u64,
    /// Round in which the answer was computed
    pub answered_in_round: u64,
}

impl RoundData {
    /// A complete round answered in itself
    pub fn new(round_id: u64, answer: i64, updated_at: u64) -> Self {
        Self {
            round_id,
            answer,
            started_at: updated_at,
            updated_at,
            answered_in_round: round_id,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE READING
// ═══════════════════════════════════════════════════════════════════════════════

/// A price that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    /// Price, strictly positive
    pub price: u64,
    /// Fractional digits of `price`
    pub decimals: u8,
    /// Unix timestamp of the underlying update
    pub updated_at: u64,
    /// Round the price came from
    pub round_id: u64,
}

impl PriceReading {
    /// Get age of price in seconds
    pub fn age(&self, current_time: u64) -> u64 {
        current_time.saturating_sub(self.updated_at)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// External price source, addressed by feed id
pub trait PriceSource: Send + Sync {
    /// Latest round of a feed
    fn latest_round_data(&self, feed: &Address) -> Result<RoundData>;

    /// Fractional digits of a feed's answers
    fn decimals(&self, feed: &Address) -> Result<u8>;
}

#[derive(Debug, Clone, Copy)]
struct FeedState {
    decimals: u8,
    round: RoundData,
}

/// In-memory feeds with settable rounds
#[derive(Debug, Default)]
pub struct StaticPriceSource {
    feeds: RwLock<HashMap<Address, FeedState>>,
}

impl StaticPriceSource {
    /// Create with no feeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new complete round; round ids increase per feed
    pub fn set_price(&self, feed: Address, decimals: u8, answer: i64, updated_at: u64) -> Result<()> {
        let mut feeds = self.feeds.write().map_err(|_| Error::Lock)?;
        let next_round = feeds.get(&feed).map(|f| f.round.round_id + 1).unwrap_or(1);
        feeds.insert(
            feed,
            FeedState {
                decimals,
                round: RoundData::new(next_round, answer, updated_at),
            },
        );
        Ok(())
    }

    /// Replace the latest round verbatim
    pub fn set_round(&self, feed: Address, decimals: u8, round: RoundData) -> Result<()> {
        let mut feeds = self.feeds.write().map_err(|_| Error::Lock)?;
        feeds.insert(feed, FeedState { decimals, round });
        Ok(())
    }

    fn feed(&self, feed: &Address) -> Result<FeedState> {
        let feeds = self.feeds.read().map_err(|_| Error::Lock)?;
        feeds
            .get(feed)
            .copied()
            .ok_or_else(|| Error::InvalidPriceFeed(format!("no data for feed {}", feed)))
    }
}

impl PriceSource for StaticPriceSource {
    fn latest_round_data(&self, feed: &Address) -> Result<RoundData> {
        Ok(self.feed(feed)?.round)
    }

    fn decimals(&self, feed: &Address) -> Result<u8> {
        Ok(self.feed(feed)?.decimals)
    }
}
