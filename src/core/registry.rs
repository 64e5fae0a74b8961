//! Asset registry.
//!
//! Tracks every asset the bank has ever listed, whether it is currently
//! accepted, its native precision, the price feed it is valued against and
//! how often it has been deposited and withdrawn.
//!
//! Assets are never physically removed. Deactivation keeps the descriptor,
//! its counters and its position in the enumeration order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::crypto::{Address, AssetId};
use crate::utils::math::check_decimals;
use crate::utils::validation::validate_price_source;

// ═══════════════════════════════════════════════════════════════════════════════
// ASSET DESCRIPTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Registry record for a single asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Asset identifier
    pub id: AssetId,
    /// Whether deposits and withdrawals are accepted
    pub active: bool,
    /// Fractional digits of the asset's native unit
    pub native_decimals: u8,
    /// Price feed the asset is valued against
    pub price_source: Address,
    /// Number of accepted deposits
    pub deposit_count: u64,
    /// Number of accepted withdrawals
    pub withdrawal_count: u64,
}

impl AssetDescriptor {
    /// Create a fresh, active descriptor
    pub fn new(id: AssetId, price_source: Address, native_decimals: u8) -> Self {
        Self {
            id,
            active: true,
            native_decimals,
            price_source,
            deposit_count: 0,
            withdrawal_count: 0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ASSET REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Enumerable registry with soft delete
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    /// Registration order
    order: Vec<AssetId>,
    /// Descriptors by id
    assets: HashMap<AssetId, AssetDescriptor>,
}

impl AssetRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset or update an existing registration.
    ///
    /// Re-registering an id overwrites its precision and feed, re-activates
    /// it, and keeps its counters and enumeration position.
    pub fn register(&mut self, id: AssetId, price_source: Address, native_decimals: u8) -> Result<()> {
        validate_price_source(&id, &price_source)?;
        check_decimals(native_decimals)?;

        match self.assets.get_mut(&id) {
            Some(existing) => {
                existing.active = true;
                existing.native_decimals = native_decimals;
                existing.price_source = price_source;
            }
            None => {
                self.order.push(id);
                self.assets
                    .insert(id, AssetDescriptor::new(id, price_source, native_decimals));
            }
        }

        Ok(())
    }

    /// Soft-delete an asset
    pub fn deactivate(&mut self, id: &AssetId) -> Result<()> {
        if id.is_native() {
            return Err(Error::TokenNotSupported(
                "native asset cannot be removed".into(),
            ));
        }

        let descriptor = self
            .assets
            .get_mut(id)
            .ok_or_else(|| Error::TokenNotSupported(format!("unknown asset {}", id)))?;
        descriptor.active = false;
        Ok(())
    }

    /// Whether an asset is registered and active
    pub fn is_active(&self, id: &AssetId) -> bool {
        self.assets.get(id).map(|a| a.active).unwrap_or(false)
    }

    /// Get an active asset, failing with `TokenNotSupported` otherwise
    pub fn require_active(&self, id: &AssetId) -> Result<&AssetDescriptor> {
        match self.assets.get(id) {
            Some(descriptor) if descriptor.active => Ok(descriptor),
            Some(_) => Err(Error::TokenNotSupported(format!("asset {} is inactive", id))),
            None => Err(Error::TokenNotSupported(format!("unknown asset {}", id))),
        }
    }

    /// Get a descriptor regardless of status
    pub fn get(&self, id: &AssetId) -> Option<&AssetDescriptor> {
        self.assets.get(id)
    }

    /// All descriptors in registration order
    pub fn list(&self) -> Vec<AssetDescriptor> {
        self.order
            .iter()
            .filter_map(|id| self.assets.get(id).cloned())
            .collect()
    }

    /// Number of registered assets, including inactive ones
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COUNTERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Count an accepted deposit
    pub fn record_deposit(&mut self, id: &AssetId) {
        if let Some(descriptor) = self.assets.get_mut(id) {
            descriptor.deposit_count = descriptor.deposit_count.saturating_add(1);
        }
    }

    /// Count an accepted withdrawal
    pub fn record_withdrawal(&mut self, id: &AssetId) {
        if let Some(descriptor) = self.assets.get_mut(id) {
            descriptor.withdrawal_count = descriptor.withdrawal_count.saturating_add(1);
        }
    }

    /// Undo [`record_withdrawal`](Self::record_withdrawal)
    pub fn unrecord_withdrawal(&mut self, id: &AssetId) {
        if let Some(descriptor) = self.assets.get_mut(id) {
            descriptor.withdrawal_count = descriptor.withdrawal_count.saturating_sub(1);
        }
    }

    /// Rebuild a registry from descriptors in enumeration order
    pub fn from_descriptors(descriptors: Vec<AssetDescriptor>) -> Result<Self> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            if registry.assets.contains_key(&descriptor.id) {
                return Err(Error::Deserialization(format!(
                    "duplicate registry entry {}",
                    descriptor.id
                )));
            }
            check_decimals(descriptor.native_decimals)?;
            registry.order.push(descriptor.id);
            registry.assets.insert(descriptor.id, descriptor);
        }
        Ok(registry)
    }
}
