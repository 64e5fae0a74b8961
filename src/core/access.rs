//! Capability checks for administrative actions.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::utils::crypto::Address;

/// Administrative capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// May register and deactivate assets
    AssetManager,
    /// May pause and unpause the bank
    Pauser,
}

impl Capability {
    /// All capabilities
    pub const ALL: [Capability; 2] = [Capability::AssetManager, Capability::Pauser];

    /// Get capability name
    pub fn name(&self) -> &'static str {
        match self {
            Capability::AssetManager => "asset_manager",
            Capability::Pauser => "pauser",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Answers whether a principal holds a capability
pub trait AccessControl: Send + Sync {
    /// Check a capability
    fn has_capability(&self, principal: &Address, capability: Capability) -> bool;
}

/// In-memory capability grants
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    grants: HashMap<Address, HashSet<Capability>>,
}

impl RoleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every capability granted to `admin`
    pub fn with_admin(admin: Address) -> Self {
        let mut roles = Self::new();
        for capability in Capability::ALL {
            roles.grant(admin, capability);
        }
        roles
    }

    /// Grant a capability
    pub fn grant(&mut self, principal: Address, capability: Capability) {
        self.grants.entry(principal).or_default().insert(capability);
    }

    /// Revoke a capability
    pub fn revoke(&mut self, principal: &Address, capability: Capability) {
        if let Some(held) = self.grants.get_mut(principal) {
            held.remove(&capability);
        }
    }
}

impl AccessControl for RoleRegistry {
    fn has_capability(&self, principal: &Address, capability: Capability) -> bool {
        self.grants
            .get(principal)
            .map(|held| held.contains(&capability))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_and_revoke() {
        let ops = Address::derive("ops");
        let mut roles = RoleRegistry::new();

        assert!(!roles.has_capability(&ops, Capability::Pauser));

        roles.grant(ops, Capability::Pauser);
        assert!(roles.has_capability(&ops, Capability::Pauser));
        assert!(!roles.has_capability(&ops, Capability::AssetManager));

        roles.revoke(&ops, Capability::Pauser);
        assert!(!roles.has_capability(&ops, Capability::Pauser));
    }

    #[test]
    fn test_with_admin() {
        let admin = Address::derive("admin");
        let roles = RoleRegistry::with_admin(admin);

        for capability in Capability::ALL {
            assert!(roles.has_capability(&admin, capability));
        }
        assert!(!roles.has_capability(&Address::derive("eve"), Capability::AssetManager));
    }

    #[test]
    fn test_capability_serde() {
        let json = serde_json::to_string(&Capability::AssetManager).unwrap();
        assert_eq!(json, "\"asset_manager\"");
    }
}
