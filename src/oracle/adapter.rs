//! Oracle adapter and valuation.
//!
//! Reads the feed bound to an asset, validates the answer and its freshness,
//! and turns canonical amounts into canonical dollar values. Nothing is
//! cached; every call goes back to the source.

use std::sync::Arc;

use crate::core::amount::{CanonicalAmount, UsdValue};
use crate::core::registry::AssetDescriptor;
use crate::error::{Error, Result};
use crate::oracle::price_feed::{PriceReading, PriceSource};
use crate::utils::constants::MAX_POW10_EXPONENT;
use crate::utils::math::{pow10, safe_mul_div};
use crate::utils::time::Clock;
use crate::utils::validation::*;

/// Value a canonical amount at `price` with `decimals` fractional digits.
///
/// `normalized * price / 10^decimals`, multiplied first and truncated.
pub fn value_usd(normalized: CanonicalAmount, price: u64, decimals: u8) -> Result<UsdValue> {
    if decimals as u32 > MAX_POW10_EXPONENT {
        return Err(Error::InvalidPriceFeed(format!(
            "feed precision {} is out of range",
            decimals
        )));
    }
    let scale = pow10(decimals as u32)?;
    safe_mul_div(normalized.raw(), price, scale).map(UsdValue::from_raw)
}

/// Validated price access over a [`PriceSource`]
pub struct OracleAdapter {
    source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    max_age_secs: u64,
}

impl OracleAdapter {
    /// Create an adapter with a staleness window
    pub fn new(source: Arc<dyn PriceSource>, clock: Arc<dyn Clock>, max_age_secs: u64) -> Self {
        Self {
            source,
            clock,
            max_age_secs,
        }
    }

    /// Current time according to the adapter's clock
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Staleness window in seconds
    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }

    /// Read and validate the price of an asset
    pub fn price_usd(&self, asset: &AssetDescriptor) -> Result<PriceReading> {
        validate_price_source(&asset.id, &asset.price_source)?;

        let round = self.source.latest_round_data(&asset.price_source)?;
        let price = validate_price_answer(round.answer)?;
        validate_round_complete(round.round_id, round.answered_in_round, round.updated_at)?;
        validate_price_freshness(round.updated_at, self.clock.now(), self.max_age_secs)?;

        let decimals = self.source.decimals(&asset.price_source)?;

        Ok(PriceReading {
            price,
            decimals,
            updated_at: round.updated_at,
            round_id: round.round_id,
        })
    }

    /// Value `normalized` units of an asset at its current price
    pub fn value_of(&self, asset: &AssetDescriptor, normalized: CanonicalAmount) -> Result<UsdValue> {
        let reading = self.price_usd(asset)?;
        value_usd(normalized, reading.price, reading.decimals)
    }
}

impl std::fmt::Debug for OracleAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleAdapter")
            .field("max_age_secs", &self.max_age_secs)
            .finish_non_exhaustive()
    }
}
