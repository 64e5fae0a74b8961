//! Custody movement.
//!
//! The bank never moves value itself. It asks an [`AssetTransfer`]
//! implementation to pull an asset from an owner into custody and to push it
//! back out on withdrawal.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::error::{Error, Result};
use crate::utils::crypto::{Address, AssetId};

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFER INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// External transfer service
pub trait AssetTransfer: Send + Sync {
    /// Move `amount` native units of `asset` from `owner` into custody
    fn pull(&self, owner: &Address, asset: &AssetId, amount: u128) -> Result<()>;

    /// Move `amount` native units of `asset` out of custody to `owner`
    fn push(&self, owner: &Address, asset: &AssetId, amount: u128) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY CUSTODY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct CustodyState {
    wallets: HashMap<(Address, AssetId), u128>,
    held: HashMap<AssetId, u128>,
    fail_pulls: bool,
    fail_pushes: bool,
    pulls: u64,
    pushes: u64,
}

/// Wallets and a custody account kept in memory, with failure injection.
///
/// Native value arrives together with the call that deposits it, so it is
/// moved with [`attach_native`](Self::attach_native) by whoever makes that
/// call rather than through [`AssetTransfer::pull`].
#[derive(Debug, Default)]
pub struct InMemoryCustody {
    state: Mutex<CustodyState>,
}

impl InMemoryCustody {
    /// Create an empty custody service
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CustodyState>> {
        self.state.lock().map_err(|_| Error::Lock)
    }

    /// Give `owner` spendable units outside the bank
    pub fn fund(&self, owner: Address, asset: AssetId, amount: u128) -> Result<()> {
        let mut state = self.lock()?;
        let wallet = state.wallets.entry((owner, asset)).or_default();
        *wallet = wallet
            .checked_add(amount)
            .ok_or_else(|| Error::overflow("wallet funding"))?;
        Ok(())
    }

    /// Spendable units of `owner` outside the bank
    pub fn wallet_balance(&self, owner: &Address, asset: &AssetId) -> Result<u128> {
        Ok(self.lock()?.wallets.get(&(*owner, *asset)).copied().unwrap_or(0))
    }

    /// Units of `asset` held in custody
    pub fn held(&self, asset: &AssetId) -> Result<u128> {
        Ok(self.lock()?.held.get(asset).copied().unwrap_or(0))
    }

    /// Move native value sent along with a deposit call into custody
    pub fn attach_native(&self, owner: &Address, amount: u128) -> Result<()> {
        let mut state = self.lock()?;
        move_units(&mut state, owner, &AssetId::NATIVE, amount, Direction::In)
    }

    /// Return native value attached to a call that was rejected
    pub fn refund_native(&self, owner: &Address, amount: u128) -> Result<()> {
        let mut state = self.lock()?;
        move_units(&mut state, owner, &AssetId::NATIVE, amount, Direction::Out)
    }

    /// Make every subsequent pull fail
    pub fn set_fail_pulls(&self, fail: bool) -> Result<()> {
        self.lock()?.fail_pulls = fail;
        Ok(())
    }

    /// Make every subsequent push fail
    pub fn set_fail_pushes(&self, fail: bool) -> Result<()> {
        self.lock()?.fail_pushes = fail;
        Ok(())
    }

    /// Number of successful (pulls, pushes)
    pub fn transfer_counts(&self) -> Result<(u64, u64)> {
        let state = self.lock()?;
        Ok((state.pulls, state.pushes))
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    In,
    Out,
}

fn move_units(
    state: &mut CustodyState,
    owner: &Address,
    asset: &AssetId,
    amount: u128,
    direction: Direction,
) -> Result<()> {
    let wallet = state.wallets.get(&(*owner, *asset)).copied().unwrap_or(0);
    let held = state.held.get(asset).copied().unwrap_or(0);

    let (wallet, held) = match direction {
        Direction::In => {
            let wallet = wallet.checked_sub(amount).ok_or_else(|| {
                Error::TransferFailed(format!(
                    "{} holds {} of {}, cannot send {}",
                    owner, wallet, asset, amount
                ))
            })?;
            let held = held
                .checked_add(amount)
                .ok_or_else(|| Error::TransferFailed("custody balance overflow".into()))?;
            (wallet, held)
        }
        Direction::Out => {
            let held = held.checked_sub(amount).ok_or_else(|| {
                Error::TransferFailed(format!(
                    "custody holds {} of {}, cannot pay {}",
                    held, asset, amount
                ))
            })?;
            let wallet = wallet
                .checked_add(amount)
                .ok_or_else(|| Error::TransferFailed("wallet balance overflow".into()))?;
            (wallet, held)
        }
    };

    state.wallets.insert((*owner, *asset), wallet);
    state.held.insert(*asset, held);
    Ok(())
}

impl AssetTransfer for InMemoryCustody {
    fn pull(&self, owner: &Address, asset: &AssetId, amount: u128) -> Result<()> {
        let mut state = self.lock()?;
        if state.fail_pulls {
            return Err(Error::TransferFailed("pull rejected by custody".into()));
        }
        move_units(&mut state, owner, asset, amount, Direction::In)?;
        state.pulls += 1;
        debug!(owner = %owner.short(), asset = %asset.short(), amount, "Pulled into custody");
        Ok(())
    }

    fn push(&self, owner: &Address, asset: &AssetId, amount: u128) -> Result<()> {
        let mut state = self.lock()?;
        if state.fail_pushes {
            return Err(Error::TransferFailed("push rejected by custody".into()));
        }
        move_units(&mut state, owner, asset, amount, Direction::Out)?;
        state.pushes += 1;
        debug!(owner = %owner.short(), asset = %asset.short(), amount, "Pushed out of custody");
        Ok(())
    }
}
