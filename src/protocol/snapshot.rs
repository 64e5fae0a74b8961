//! Point-in-time view of a bank.

use serde::{Deserialize, Serialize};

use crate::core::amount::{CanonicalAmount, UsdValue};
use crate::core::config::BankConfig;
use crate::core::ledger::LedgerEntry;
use crate::core::registry::AssetDescriptor;
use crate::error::{Error, Result};
use crate::protocol::events::{chain_digest, EventRecord};
use crate::utils::crypto::{Address, AssetId, Hash};

/// Serializable copy of all bank state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankSnapshot {
    /// Bank parameters
    pub config: BankConfig,
    /// Pause flag
    pub paused: bool,
    /// Cost-basis aggregate
    pub total_deposits_usd: UsdValue,
    /// Registry in enumeration order
    pub assets: Vec<AssetDescriptor>,
    /// Ledger rows in (owner, asset) order
    pub balances: Vec<LedgerEntry>,
    /// Sequence number of the last event, 0 if none
    pub last_event_sequence: u64,
    /// Full event log
    pub events: Vec<EventRecord>,
    /// Clock time the snapshot was taken
    pub taken_at: u64,
}

impl BankSnapshot {
    /// Serialize snapshot to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize snapshot from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Hash of the bank state, independent of when the snapshot was taken
    pub fn state_hash(&self) -> Hash {
        let state = (
            &self.config,
            self.paused,
            self.total_deposits_usd,
            &self.assets,
            &self.balances,
            self.last_event_sequence,
            self.event_digest(),
        );
        let bytes = bincode::serialize(&state).unwrap_or_default();
        Hash::sha256(&bytes)
    }

    /// Hash chain over the event log
    pub fn event_digest(&self) -> Hash {
        chain_digest(&self.events)
    }

    /// Balance recorded for `owner` in `asset`
    pub fn balance_of(&self, owner: &Address, asset: &AssetId) -> CanonicalAmount {
        self.balances
            .iter()
            .find(|e| &e.owner == owner && &e.asset == asset)
            .map(|e| e.balance)
            .unwrap_or(CanonicalAmount::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> BankSnapshot {
        BankSnapshot {
            config: BankConfig::default(),
            paused: false,
            total_deposits_usd: UsdValue::from_dollars(50_000),
            assets: vec![AssetDescriptor::new(
                AssetId::NATIVE,
                Address::derive("ETH/USD"),
                18,
            )],
            balances: vec![LedgerEntry {
                owner: Address::derive("alice"),
                asset: AssetId::NATIVE,
                balance: CanonicalAmount::from_units(1),
            }],
            last_event_sequence: 0,
            events: Vec::new(),
            taken_at: 1_000,
        }
    }

    #[test]
    fn test_bytes_round_trip() {
        let snap = snapshot();
        let restored = BankSnapshot::from_bytes(&snap.to_bytes().unwrap()).unwrap();
        assert_eq!(snap, restored);
    }

    #[test]
    fn test_state_hash_ignores_time() {
        let a = snapshot();
        let mut b = snapshot();
        b.taken_at = 2_000;
        assert_eq!(a.state_hash(), b.state_hash());

        b.paused = true;
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_state_hash_covers_event_history() {
        use crate::protocol::events::{LedgerEvent, PauseEvent};

        let a = snapshot();
        let mut b = snapshot();
        b.events.push(EventRecord {
            sequence: 1,
            timestamp: 1_000,
            event: LedgerEvent::Paused(PauseEvent {
                by: Address::derive("ops"),
            }),
        });
        b.last_event_sequence = 1;
        assert!(a.event_digest().is_zero());
        assert!(!b.event_digest().is_zero());
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_balance_lookup() {
        let snap = snapshot();
        assert_eq!(
            snap.balance_of(&Address::derive("alice"), &AssetId::NATIVE),
            CanonicalAmount::from_units(1)
        );
        assert_eq!(
            snap.balance_of(&Address::derive("bob"), &AssetId::NATIVE),
            CanonicalAmount::ZERO
        );
    }

    #[test]
    fn test_from_garbage() {
        assert!(matches!(
            BankSnapshot::from_bytes(&[1, 2, 3]),
            Err(Error::Deserialization(_))
        ));
    }
}
