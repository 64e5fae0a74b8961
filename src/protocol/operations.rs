//! Ledger operations as data.
//!
//! Operations represent discrete actions that can be submitted to a bank
//! through [`CustodyBank::execute`](crate::protocol::CustodyBank::execute),
//! for instance from a JSON script.

use serde::{Deserialize, Serialize};

use crate::core::amount::{CanonicalAmount, UsdValue};
use crate::utils::crypto::{Address, AssetId};

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// All possible ledger operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOperation {
    /// Deposit native value attached to the call
    DepositNative {
        /// Depositor
        owner: Address,
        /// Amount in native units
        amount: u128,
    },
    /// Deposit a registered asset
    DepositAsset {
        /// Depositor
        owner: Address,
        /// Asset deposited
        asset: AssetId,
        /// Amount in native units
        amount: u128,
    },
    /// Withdraw native value
    WithdrawNative {
        /// Withdrawer
        owner: Address,
        /// Amount in native units
        amount: u128,
    },
    /// Withdraw a registered asset
    WithdrawAsset {
        /// Withdrawer
        owner: Address,
        /// Asset withdrawn
        asset: AssetId,
        /// Amount in native units
        amount: u128,
    },
    /// Register or re-register an asset
    AddAsset {
        /// Caller, must hold the asset manager capability
        caller: Address,
        /// Asset to register
        asset: AssetId,
        /// Price feed to bind
        price_source: Address,
        /// Native precision
        decimals: u8,
    },
    /// Deactivate an asset
    RemoveAsset {
        /// Caller, must hold the asset manager capability
        caller: Address,
        /// Asset to deactivate
        asset: AssetId,
    },
    /// Pause deposits and withdrawals
    Pause {
        /// Caller, must hold the pauser capability
        caller: Address,
    },
    /// Resume deposits and withdrawals
    Unpause {
        /// Caller, must hold the pauser capability
        caller: Address,
    },
}

impl LedgerOperation {
    /// Get the operation type name
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::DepositNative { .. } => "deposit_native",
            Self::DepositAsset { .. } => "deposit_asset",
            Self::WithdrawNative { .. } => "withdraw_native",
            Self::WithdrawAsset { .. } => "withdraw_asset",
            Self::AddAsset { .. } => "add_asset",
            Self::RemoveAsset { .. } => "remove_asset",
            Self::Pause { .. } => "pause",
            Self::Unpause { .. } => "unpause",
        }
    }

    /// Address submitting the operation
    pub fn actor(&self) -> &Address {
        match self {
            Self::DepositNative { owner, .. }
            | Self::DepositAsset { owner, .. }
            | Self::WithdrawNative { owner, .. }
            | Self::WithdrawAsset { owner, .. } => owner,
            Self::AddAsset { caller, .. }
            | Self::RemoveAsset { caller, .. }
            | Self::Pause { caller }
            | Self::Unpause { caller } => caller,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of an accepted deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositResult {
    /// Asset deposited
    pub asset: AssetId,
    /// Amount in canonical precision
    pub normalized_amount: CanonicalAmount,
    /// Value credited to the aggregate
    pub value_usd: UsdValue,
    /// Owner's balance afterwards
    pub balance: CanonicalAmount,
}

/// Outcome of an accepted withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawResult {
    /// Asset withdrawn
    pub asset: AssetId,
    /// Amount in canonical precision
    pub normalized_amount: CanonicalAmount,
    /// Value of the withdrawal at current prices
    pub value_usd: UsdValue,
    /// Owner's balance afterwards
    pub remaining_balance: CanonicalAmount,
}

/// Result of executing a [`LedgerOperation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    /// Deposit accepted
    Deposit(DepositResult),
    /// Withdrawal accepted and paid out
    Withdrawal(WithdrawResult),
    /// Asset registered
    AssetAdded(AssetId),
    /// Asset deactivated
    AssetRemoved(AssetId),
    /// Bank paused
    Paused,
    /// Bank unpaused
    Unpaused,
}
