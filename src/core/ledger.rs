//! Balance ledger.
//!
//! Per-(owner, asset) balances in canonical precision, plus the running sum
//! of balances per asset. Entries are created on first credit and never
//! removed; a zero balance simply reads as zero.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::amount::CanonicalAmount;
use crate::error::{Error, Result};
use crate::utils::crypto::{Address, AssetId};

/// A single ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Balance owner
    pub owner: Address,
    /// Asset held
    pub asset: AssetId,
    /// Canonical balance
    pub balance: CanonicalAmount,
}

/// Balance store
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    balances: BTreeMap<(Address, AssetId), CanonicalAmount>,
    custody: BTreeMap<AssetId, CanonicalAmount>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `owner` in `asset`, zero if never credited
    pub fn balance_of(&self, owner: &Address, asset: &AssetId) -> CanonicalAmount {
        self.balances
            .get(&(*owner, *asset))
            .copied()
            .unwrap_or(CanonicalAmount::ZERO)
    }

    /// Sum of all balances held in `asset`
    pub fn custody_of(&self, asset: &AssetId) -> CanonicalAmount {
        self.custody
            .get(asset)
            .copied()
            .unwrap_or(CanonicalAmount::ZERO)
    }

    /// Add to a balance, returning the new balance.
    ///
    /// No limits are checked here. Nothing is written unless both the entry
    /// and the per-asset total can absorb the amount.
    pub fn credit(
        &mut self,
        owner: &Address,
        asset: &AssetId,
        amount: CanonicalAmount,
    ) -> Result<CanonicalAmount> {
        let new_balance = self
            .balance_of(owner, asset)
            .checked_add(amount)
            .ok_or_else(|| Error::overflow(format!("credit {} to {}", amount.raw(), owner)))?;
        let new_custody = self
            .custody_of(asset)
            .checked_add(amount)
            .ok_or_else(|| Error::overflow(format!("custody total of {}", asset)))?;

        self.balances.insert((*owner, *asset), new_balance);
        self.custody.insert(*asset, new_custody);
        Ok(new_balance)
    }

    /// Subtract from a balance, returning what remains
    pub fn debit(
        &mut self,
        owner: &Address,
        asset: &AssetId,
        amount: CanonicalAmount,
    ) -> Result<CanonicalAmount> {
        let available = self.balance_of(owner, asset);
        let remaining = available
            .checked_sub(amount)
            .ok_or(Error::InsufficientBalance {
                required: amount.raw(),
                available: available.raw(),
            })?;
        let custody = self.custody_of(asset).checked_sub(amount).ok_or_else(|| {
            Error::InvariantViolation(format!("custody total of {} below a single balance", asset))
        })?;

        self.balances.insert((*owner, *asset), remaining);
        self.custody.insert(*asset, custody);
        Ok(remaining)
    }

    /// Non-zero balances of an owner, ordered by asset id
    pub fn positions(&self, owner: &Address) -> Vec<(AssetId, CanonicalAmount)> {
        self.balances
            .iter()
            .filter(|((o, _), balance)| o == owner && !balance.is_zero())
            .map(|((_, asset), balance)| (*asset, *balance))
            .collect()
    }

    /// All rows in (owner, asset) order
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.balances
            .iter()
            .map(|((owner, asset), balance)| LedgerEntry {
                owner: *owner,
                asset: *asset,
                balance: *balance,
            })
            .collect()
    }

    /// Assets with a non-zero custody total
    pub fn held_assets(&self) -> Vec<(AssetId, CanonicalAmount)> {
        self.custody
            .iter()
            .filter(|(_, total)| !total.is_zero())
            .map(|(asset, total)| (*asset, *total))
            .collect()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// Check if no balance was ever credited
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Check that every per-asset total equals the sum of its rows
    pub fn verify_invariant(&self) -> Result<()> {
        let mut sums: BTreeMap<AssetId, u128> = BTreeMap::new();
        for ((_, asset), balance) in &self.balances {
            *sums.entry(*asset).or_default() += balance.raw() as u128;
        }

        for (asset, total) in &self.custody {
            let summed = sums.remove(asset).unwrap_or(0);
            if summed != total.raw() as u128 {
                return Err(Error::InvariantViolation(format!(
                    "custody total of {} is {} but balances sum to {}",
                    asset,
                    total.raw(),
                    summed
                )));
            }
        }

        if let Some((asset, summed)) = sums.into_iter().find(|(_, s)| *s != 0) {
            return Err(Error::InvariantViolation(format!(
                "balances in {} sum to {} without a custody total",
                asset, summed
            )));
        }

        Ok(())
    }

    /// Rebuild a ledger from its rows
    pub fn from_entries(entries: &[LedgerEntry]) -> Result<Self> {
        let mut ledger = Self::new();
        for entry in entries {
            if ledger.balances.contains_key(&(entry.owner, entry.asset)) {
                return Err(Error::Deserialization(format!(
                    "duplicate ledger entry for {} in {}",
                    entry.owner, entry.asset
                )));
            }
            ledger.credit(&entry.owner, &entry.asset, entry.balance)?;
        }
        Ok(ledger)
    }
}
