//! Ledger events for state change notifications.
//!
//! Every accepted deposit, withdrawal and administrative action appends one
//! event to the bank's log. Rejected operations append nothing.

use serde::{Deserialize, Serialize};

use crate::core::amount::CanonicalAmount;
use crate::error::{Error, Result};
use crate::utils::crypto::{Address, AssetId, Hash};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All ledger event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// Value was deposited
    Deposit(BalanceChangedEvent),
    /// Value was withdrawn and paid out
    Withdrawal(BalanceChangedEvent),
    /// An asset was registered or re-registered
    AssetAdded(AssetAddedEvent),
    /// An asset was deactivated
    AssetRemoved(AssetRemovedEvent),
    /// The bank was paused
    Paused(PauseEvent),
    /// The bank was unpaused
    Unpaused(PauseEvent),
}

impl LedgerEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Deposit(_) => "Deposit",
            Self::Withdrawal(_) => "Withdrawal",
            Self::AssetAdded(_) => "AssetAdded",
            Self::AssetRemoved(_) => "AssetRemoved",
            Self::Paused(_) => "Paused",
            Self::Unpaused(_) => "Unpaused",
        }
    }

    /// Owner or caller the event concerns
    pub fn actor(&self) -> &Address {
        match self {
            Self::Deposit(e) | Self::Withdrawal(e) => &e.owner,
            Self::AssetAdded(e) => &e.by,
            Self::AssetRemoved(e) => &e.by,
            Self::Paused(e) | Self::Unpaused(e) => &e.by,
        }
    }
}

/// Deposit or withdrawal details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChangedEvent {
    /// Balance owner
    pub owner: Address,
    /// Asset moved
    pub asset: AssetId,
    /// Amount in the asset's native units
    pub raw_amount: u128,
    /// Amount in canonical precision
    pub normalized_amount: CanonicalAmount,
    /// Owner's balance after the operation
    pub balance: CanonicalAmount,
}

/// Asset registration details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAddedEvent {
    /// Asset registered
    pub asset: AssetId,
    /// Bound price feed
    pub price_source: Address,
    /// Native precision
    pub decimals: u8,
    /// Caller
    pub by: Address,
}

/// Asset deactivation details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRemovedEvent {
    /// Asset deactivated
    pub asset: AssetId,
    /// Caller
    pub by: Address,
}

/// Pause state change details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseEvent {
    /// Caller
    pub by: Address,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// An event with its position and time of emission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonically increasing sequence number, starting at 1
    pub sequence: u64,
    /// Unix timestamp of emission
    pub timestamp: u64,
    /// The event
    pub event: LedgerEvent,
}

impl EventRecord {
    /// Compute record hash
    pub fn hash(&self) -> Hash {
        let data = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&data)
    }
}

/// Append-only event log.
///
/// Records are never dropped, so [`chain_digest`] over them commits to the
/// whole history since the bank was created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
    next_sequence: u64,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Append an event, returning its sequence number
    pub fn push(&mut self, event: LedgerEvent, timestamp: u64) -> u64 {
        let sequence = self.next_sequence.max(1);
        self.next_sequence = sequence + 1;
        self.records.push(EventRecord {
            sequence,
            timestamp,
            event,
        });

        sequence
    }

    /// Get all records
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Most recent record
    pub fn last(&self) -> Option<&EventRecord> {
        self.records.last()
    }

    /// Get the number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rebuild a log from records numbered 1, 2, 3 and so on
    pub fn from_records(records: Vec<EventRecord>) -> Result<Self> {
        for (expected, record) in (1u64..).zip(&records) {
            if record.sequence != expected {
                return Err(Error::Deserialization(format!(
                    "event sequence {} found where {} was expected",
                    record.sequence, expected
                )));
            }
        }
        let next_sequence = records.len() as u64 + 1;
        Ok(Self {
            records,
            next_sequence,
        })
    }
}

/// Hash chain over `records`: each link is sha256(previous ‖ record hash)
pub fn chain_digest(records: &[EventRecord]) -> Hash {
    records.iter().fold(Hash::zero(), |acc, record| {
        let mut data = acc.as_bytes().to_vec();
        data.extend_from_slice(record.hash().as_bytes());
        Hash::sha256(&data)
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
