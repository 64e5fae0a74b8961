//! Custody bank - core orchestration engine.
//!
//! The bank is the central coordinator for deposits, withdrawals and
//! administration. It composes the registry, ledger, limit enforcer and
//! oracle adapter, and sequences every value movement so that a failed
//! operation leaves no trace.
//!
//! ## Ordering
//!
//! - Deposits validate, normalize, value and check the cap into a plan, then
//!   pull custody, then commit the plan. A commit that fails after a pull
//!   pushes the pulled amount back.
//! - Withdrawals validate and apply every state change before paying out.
//!   A failed payout restores the exact prior state.
//!
//! An amount that normalizes to zero is rejected in both directions. A
//! withdrawal must also be a whole number of canonical units, so the raw
//! amount paid out is always exactly what was debited. Deposits may carry
//! sub-canonical dust; it stays in custody and is never credited.
//!
//! State lives behind one mutex that is never held across a transfer call,
//! and a [`ReentrancyGuard`] rejects nested deposits and withdrawals.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::core::access::{AccessControl, Capability};
use crate::core::amount::{CanonicalAmount, UsdValue};
use crate::core::config::BankConfig;
use crate::core::custody::AssetTransfer;
use crate::core::ledger::Ledger;
use crate::core::limits::LimitEnforcer;
use crate::core::registry::{AssetDescriptor, AssetRegistry};
use crate::error::{Error, Result};
use crate::oracle::adapter::OracleAdapter;
use crate::oracle::price_feed::{PriceReading, PriceSource};
use crate::protocol::events::*;
use crate::protocol::guard::ReentrancyGuard;
use crate::protocol::operations::*;
use crate::protocol::snapshot::BankSnapshot;
use crate::utils::constants::NATIVE_ASSET_DECIMALS;
use crate::utils::crypto::{Address, AssetId};
use crate::utils::math::{normalization_dust, normalize};
use crate::utils::time::Clock;
use crate::utils::validation::validate_non_zero;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLABORATORS
// ═══════════════════════════════════════════════════════════════════════════════

/// External services a bank depends on
#[derive(Clone)]
pub struct Collaborators {
    /// Price feeds
    pub prices: Arc<dyn PriceSource>,
    /// Custody movement
    pub transfer: Arc<dyn AssetTransfer>,
    /// Capability checks
    pub access: Arc<dyn AccessControl>,
    /// Time source for staleness checks and event timestamps
    pub clock: Arc<dyn Clock>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BANK STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct BankState {
    registry: AssetRegistry,
    ledger: Ledger,
    limits: LimitEnforcer,
    paused: bool,
    events: EventLog,
}

/// Values fixed before custody is acquired
#[derive(Debug, Clone, Copy)]
struct DepositPlan {
    normalized: CanonicalAmount,
    value: UsdValue,
}

/// What a withdrawal changed, for exact rollback
#[derive(Debug, Clone, Copy)]
struct WithdrawalUndo {
    normalized: CanonicalAmount,
    applied: UsdValue,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CUSTODY BANK
// ═══════════════════════════════════════════════════════════════════════════════

/// Multi-asset custodial ledger
pub struct CustodyBank {
    config: BankConfig,
    state: Mutex<BankState>,
    guard: ReentrancyGuard,
    oracle: OracleAdapter,
    transfer: Arc<dyn AssetTransfer>,
    access: Arc<dyn AccessControl>,
}

impl CustodyBank {
    /// Create a bank with the native asset registered against `native_price_source`
    pub fn new(
        config: BankConfig,
        native_price_source: Address,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;

        let mut registry = AssetRegistry::new();
        registry.register(AssetId::NATIVE, native_price_source, NATIVE_ASSET_DECIMALS)?;

        info!("Custody bank created ({})", config.summary());

        Ok(Self::assemble(
            config,
            BankState {
                registry,
                ledger: Ledger::new(),
                limits: LimitEnforcer::new(config.bank_cap_usd, config.withdrawal_threshold_usd),
                paused: false,
                events: EventLog::new(),
            },
            collaborators,
        ))
    }

    /// Rebuild a bank from a snapshot taken by [`snapshot`](Self::snapshot).
    ///
    /// The snapshot is checked for internal consistency; the collaborators
    /// must already hold the custody it describes.
    pub fn restore(snapshot: BankSnapshot, collaborators: Collaborators) -> Result<Self> {
        let config = snapshot.config;
        config.validate()?;

        let registry = AssetRegistry::from_descriptors(snapshot.assets)?;
        match registry.get(&AssetId::NATIVE) {
            Some(native) if native.native_decimals == NATIVE_ASSET_DECIMALS => {}
            _ => {
                return Err(Error::Deserialization(
                    "snapshot has no native asset with 18 decimals".into(),
                ))
            }
        }

        let ledger = Ledger::from_entries(&snapshot.balances)?;
        if let Some((asset, _)) = ledger
            .held_assets()
            .into_iter()
            .find(|(asset, _)| registry.get(asset).is_none())
        {
            return Err(Error::Deserialization(format!(
                "balances held in unregistered asset {}",
                asset
            )));
        }

        if snapshot.total_deposits_usd > config.bank_cap_usd {
            return Err(Error::Deserialization(format!(
                "aggregate {} above cap {}",
                snapshot.total_deposits_usd, config.bank_cap_usd
            )));
        }
        let limits = LimitEnforcer::new(config.bank_cap_usd, config.withdrawal_threshold_usd)
            .with_total(snapshot.total_deposits_usd);

        let events = EventLog::from_records(snapshot.events)?;
        let last_sequence = events.last().map(|r| r.sequence).unwrap_or(0);
        if last_sequence != snapshot.last_event_sequence {
            return Err(Error::Deserialization(format!(
                "event log ends at {} but the snapshot records {}",
                last_sequence, snapshot.last_event_sequence
            )));
        }

        info!(
            "Custody bank restored ({}, {} assets, {} balances, {} events)",
            config.summary(),
            registry.len(),
            ledger.entries().len(),
            events.len()
        );

        Ok(Self::assemble(
            config,
            BankState {
                registry,
                ledger,
                limits,
                paused: snapshot.paused,
                events,
            },
            collaborators,
        ))
    }

    fn assemble(config: BankConfig, state: BankState, collaborators: Collaborators) -> Self {
        Self {
            config,
            state: Mutex::new(state),
            guard: ReentrancyGuard::new(),
            oracle: OracleAdapter::new(
                collaborators.prices,
                collaborators.clock,
                config.max_price_age_secs,
            ),
            transfer: collaborators.transfer,
            access: collaborators.access,
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, BankState>> {
        self.state.lock().map_err(|_| Error::Lock)
    }

    fn require(&self, caller: &Address, capability: Capability) -> Result<()> {
        if !self.access.has_capability(caller, capability) {
            return Err(Error::Unauthorized(format!(
                "{} lacks the {} capability",
                caller, capability
            )));
        }
        Ok(())
    }

    fn observe<T>(&self, operation: &str, actor: &Address, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_critical() {
                error!(operation, actor = %actor.short(), code = e.code(), "{}", e);
            } else {
                warn!(operation, actor = %actor.short(), code = e.code(), "Rejected: {}", e);
            }
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OPERATION EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Execute an operation submitted as data
    pub fn execute(&self, op: LedgerOperation) -> Result<OperationResult> {
        debug!("Executing {} from {}", op.operation_type(), op.actor().short());

        match op {
            LedgerOperation::DepositNative { owner, amount } => {
                self.deposit_native(&owner, amount).map(OperationResult::Deposit)
            }
            LedgerOperation::DepositAsset {
                owner,
                asset,
                amount,
            } => self
                .deposit_asset(&owner, &asset, amount)
                .map(OperationResult::Deposit),
            LedgerOperation::WithdrawNative { owner, amount } => self
                .withdraw_native(&owner, amount)
                .map(OperationResult::Withdrawal),
            LedgerOperation::WithdrawAsset {
                owner,
                asset,
                amount,
            } => self
                .withdraw_asset(&owner, &asset, amount)
                .map(OperationResult::Withdrawal),
            LedgerOperation::AddAsset {
                caller,
                asset,
                price_source,
                decimals,
            } => self
                .add_asset(&caller, asset, price_source, decimals)
                .map(|_| OperationResult::AssetAdded(asset)),
            LedgerOperation::RemoveAsset { caller, asset } => self
                .remove_asset(&caller, &asset)
                .map(|_| OperationResult::AssetRemoved(asset)),
            LedgerOperation::Pause { caller } => self.pause(&caller).map(|_| OperationResult::Paused),
            LedgerOperation::Unpause { caller } => {
                self.unpause(&caller).map(|_| OperationResult::Unpaused)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEPOSITS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit native value attached to the call.
    ///
    /// The value is already in custody when this is called, so no pull is
    /// made. On error the caller is responsible for returning it.
    pub fn deposit_native(&self, owner: &Address, amount: u128) -> Result<DepositResult> {
        let result = self.deposit(owner, &AssetId::NATIVE, amount);
        self.observe("deposit_native", owner, result)
    }

    /// Deposit a registered asset, pulling it from the owner
    pub fn deposit_asset(&self, owner: &Address, asset: &AssetId, amount: u128) -> Result<DepositResult> {
        let result = if asset.is_native() {
            Err(Error::TokenNotSupported(
                "native value must be deposited with deposit_native".into(),
            ))
        } else {
            self.deposit(owner, asset, amount)
        };
        self.observe("deposit_asset", owner, result)
    }

    fn deposit(&self, owner: &Address, asset: &AssetId, amount: u128) -> Result<DepositResult> {
        let _token = self.guard.enter()?;

        let plan = self.plan_deposit(asset, amount)?;

        if !asset.is_native() {
            self.transfer.pull(owner, asset, amount).map_err(into_transfer_error)?;
        }

        match self.commit_deposit(owner, asset, amount, plan) {
            Ok(result) => Ok(result),
            Err(e) => {
                if !asset.is_native() {
                    warn!(
                        "Deposit commit failed after pull, returning {} of {} to {}",
                        amount,
                        asset.short(),
                        owner.short()
                    );
                    if let Err(refund) = self.transfer.push(owner, asset, amount) {
                        return Err(Error::InvariantViolation(format!(
                            "deposit of {} {} by {} failed ({}) and the refund failed ({})",
                            amount, asset, owner, e, refund
                        )));
                    }
                }
                Err(e)
            }
        }
    }

    fn plan_deposit(&self, asset: &AssetId, amount: u128) -> Result<DepositPlan> {
        validate_non_zero(amount)?;

        let state = self.state()?;
        let descriptor = state.registry.require_active(asset)?;
        if state.paused {
            return Err(Error::ContractPaused);
        }

        let (normalized, dust) = self.normalize_for(descriptor, amount)?;
        if dust > 0 {
            debug!(
                "Keeping {} native units of {} below canonical precision",
                dust,
                descriptor.id.short()
            );
        }
        let value = self.oracle.value_of(descriptor, normalized)?;
        state.limits.check_deposit_cap(value)?;

        Ok(DepositPlan { normalized, value })
    }

    fn commit_deposit(
        &self,
        owner: &Address,
        asset: &AssetId,
        amount: u128,
        plan: DepositPlan,
    ) -> Result<DepositResult> {
        let mut state = self.state()?;

        state.limits.check_deposit_cap(plan.value)?;
        state.limits.apply_deposit(plan.value)?;
        let balance = match state.ledger.credit(owner, asset, plan.normalized) {
            Ok(balance) => balance,
            Err(e) => {
                state.limits.revert_deposit(plan.value);
                return Err(e);
            }
        };
        state.registry.record_deposit(asset);

        state.events.push(
            LedgerEvent::Deposit(BalanceChangedEvent {
                owner: *owner,
                asset: *asset,
                raw_amount: amount,
                normalized_amount: plan.normalized,
                balance,
            }),
            self.oracle.now(),
        );

        info!(
            "Deposit: {} {} by {} valued {} (balance {}, total {})",
            plan.normalized,
            asset.short(),
            owner.short(),
            plan.value,
            balance,
            state.limits.total()
        );

        Ok(DepositResult {
            asset: *asset,
            normalized_amount: plan.normalized,
            value_usd: plan.value,
            balance,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // WITHDRAWALS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Withdraw native value
    pub fn withdraw_native(&self, owner: &Address, amount: u128) -> Result<WithdrawResult> {
        let result = self.withdraw(owner, &AssetId::NATIVE, amount);
        self.observe("withdraw_native", owner, result)
    }

    /// Withdraw a registered asset
    pub fn withdraw_asset(&self, owner: &Address, asset: &AssetId, amount: u128) -> Result<WithdrawResult> {
        let result = if asset.is_native() {
            Err(Error::TokenNotSupported(
                "native value must be withdrawn with withdraw_native".into(),
            ))
        } else {
            self.withdraw(owner, asset, amount)
        };
        self.observe("withdraw_asset", owner, result)
    }

    fn withdraw(&self, owner: &Address, asset: &AssetId, amount: u128) -> Result<WithdrawResult> {
        let _token = self.guard.enter()?;

        let (result, undo) = self.apply_withdrawal(owner, asset, amount)?;

        if let Err(e) = self.transfer.push(owner, asset, amount) {
            warn!(
                "Payout of {} {} to {} failed, rolling back: {}",
                amount,
                asset.short(),
                owner.short(),
                e
            );
            self.rollback_withdrawal(owner, asset, undo)?;
            return Err(into_transfer_error(e));
        }

        // The payout has happened; from here on the withdrawal succeeds
        match self.state() {
            Ok(mut state) => {
                state.events.push(
                    LedgerEvent::Withdrawal(BalanceChangedEvent {
                        owner: *owner,
                        asset: *asset,
                        raw_amount: amount,
                        normalized_amount: result.normalized_amount,
                        balance: result.remaining_balance,
                    }),
                    self.oracle.now(),
                );

                info!(
                    "Withdrawal: {} {} by {} valued {} (remaining {}, total {})",
                    result.normalized_amount,
                    asset.short(),
                    owner.short(),
                    result.value_usd,
                    result.remaining_balance,
                    state.limits.total()
                );
            }
            Err(e) => {
                error!(
                    "Withdrawal of {} {} to {} paid out but was not recorded: {}",
                    amount,
                    asset.short(),
                    owner.short(),
                    e
                );
            }
        }

        Ok(result)
    }

    fn apply_withdrawal(
        &self,
        owner: &Address,
        asset: &AssetId,
        amount: u128,
    ) -> Result<(WithdrawResult, WithdrawalUndo)> {
        validate_non_zero(amount)?;

        let mut state = self.state()?;
        let descriptor = state.registry.require_active(asset)?;
        if state.paused {
            return Err(Error::ContractPaused);
        }

        let (normalized, dust) = self.normalize_for(descriptor, amount)?;
        if dust > 0 {
            return Err(Error::SubCanonicalAmount { amount, dust });
        }

        let available = state.ledger.balance_of(owner, asset);
        if available < normalized {
            return Err(Error::InsufficientBalance {
                required: normalized.raw(),
                available: available.raw(),
            });
        }

        let value = self.oracle.value_of(descriptor, normalized)?;
        state.limits.check_withdrawal_threshold(value)?;

        let remaining = state.ledger.debit(owner, asset, normalized)?;
        let applied = state.limits.apply_withdrawal(value);
        state.registry.record_withdrawal(asset);

        Ok((
            WithdrawResult {
                asset: *asset,
                normalized_amount: normalized,
                value_usd: value,
                remaining_balance: remaining,
            },
            WithdrawalUndo {
                normalized,
                applied,
            },
        ))
    }

    fn rollback_withdrawal(&self, owner: &Address, asset: &AssetId, undo: WithdrawalUndo) -> Result<()> {
        let mut state = self.state()?;
        state.ledger.credit(owner, asset, undo.normalized)?;
        state.limits.revert_withdrawal(undo.applied)?;
        state.registry.unrecord_withdrawal(asset);
        Ok(())
    }

    /// Canonical amount and leftover native units; zero canonical is rejected
    fn normalize_for(&self, descriptor: &AssetDescriptor, amount: u128) -> Result<(CanonicalAmount, u128)> {
        let normalized = CanonicalAmount::from_raw(normalize(amount, descriptor.native_decimals)?);
        if normalized == CanonicalAmount::ZERO {
            return Err(Error::AmountMustBeGreaterThanZero);
        }
        let dust = normalization_dust(amount, descriptor.native_decimals)?;
        Ok((normalized, dust))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ADMINISTRATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register or re-register an asset
    pub fn add_asset(
        &self,
        caller: &Address,
        asset: AssetId,
        price_source: Address,
        decimals: u8,
    ) -> Result<()> {
        let result = self.require(caller, Capability::AssetManager).and_then(|_| {
            // The native asset may be re-pointed to another feed, never re-scaled
            if asset.is_native() && decimals != NATIVE_ASSET_DECIMALS {
                return Err(Error::InvalidDecimals {
                    decimals,
                    max: NATIVE_ASSET_DECIMALS,
                });
            }
            let mut state = self.state()?;
            state.registry.register(asset, price_source, decimals)?;
            state.events.push(
                LedgerEvent::AssetAdded(AssetAddedEvent {
                    asset,
                    price_source,
                    decimals,
                    by: *caller,
                }),
                self.oracle.now(),
            );
            info!(
                "Asset {} registered with feed {} ({} decimals)",
                asset.short(),
                price_source.short(),
                decimals
            );
            Ok(())
        });
        self.observe("add_asset", caller, result)
    }

    /// Deactivate an asset; balances stay in the ledger
    pub fn remove_asset(&self, caller: &Address, asset: &AssetId) -> Result<()> {
        let result = self.require(caller, Capability::AssetManager).and_then(|_| {
            let mut state = self.state()?;
            state.registry.deactivate(asset)?;
            state.events.push(
                LedgerEvent::AssetRemoved(AssetRemovedEvent {
                    asset: *asset,
                    by: *caller,
                }),
                self.oracle.now(),
            );
            info!("Asset {} deactivated", asset.short());
            Ok(())
        });
        self.observe("remove_asset", caller, result)
    }

    /// Stop accepting deposits and withdrawals
    pub fn pause(&self, caller: &Address) -> Result<()> {
        let result = self.require(caller, Capability::Pauser).and_then(|_| {
            let mut state = self.state()?;
            if state.paused {
                return Err(Error::AlreadyPaused);
            }
            state.paused = true;
            state
                .events
                .push(LedgerEvent::Paused(PauseEvent { by: *caller }), self.oracle.now());
            info!("Bank paused by {}", caller.short());
            Ok(())
        });
        self.observe("pause", caller, result)
    }

    /// Resume deposits and withdrawals
    pub fn unpause(&self, caller: &Address) -> Result<()> {
        let result = self.require(caller, Capability::Pauser).and_then(|_| {
            let mut state = self.state()?;
            if !state.paused {
                return Err(Error::NotPaused);
            }
            state.paused = false;
            state
                .events
                .push(LedgerEvent::Unpaused(PauseEvent { by: *caller }), self.oracle.now());
            info!("Bank unpaused by {}", caller.short());
            Ok(())
        });
        self.observe("unpause", caller, result)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Bank parameters
    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    /// Canonical balance of `owner` in `asset`
    pub fn balance_of(&self, owner: &Address, asset: &AssetId) -> Result<CanonicalAmount> {
        Ok(self.state()?.ledger.balance_of(owner, asset))
    }

    /// Value of an owner's balances in active assets at current prices
    pub fn total_value_usd(&self, owner: &Address) -> Result<UsdValue> {
        let state = self.state()?;
        let mut total = UsdValue::ZERO;
        for (asset, balance) in state.ledger.positions(owner) {
            let descriptor = match state.registry.get(&asset) {
                Some(d) if d.active => d,
                _ => continue,
            };
            let value = self.oracle.value_of(descriptor, balance)?;
            total = total
                .checked_add(value)
                .ok_or_else(|| Error::overflow("owner valuation"))?;
        }
        Ok(total)
    }

    /// Cost-basis aggregate of accepted deposits less accepted withdrawals
    pub fn total_deposits_usd(&self) -> Result<UsdValue> {
        Ok(self.state()?.limits.total())
    }

    /// Room left under the bank cap
    pub fn available_capacity_usd(&self) -> Result<UsdValue> {
        Ok(self.state()?.limits.available_capacity())
    }

    /// Value of everything in custody at current prices
    pub fn mark_to_market_usd(&self) -> Result<UsdValue> {
        let state = self.state()?;
        let mut total = UsdValue::ZERO;
        for (asset, held) in state.ledger.held_assets() {
            let descriptor = state.registry.get(&asset).ok_or_else(|| {
                Error::InvariantViolation(format!("balances held in unregistered asset {}", asset))
            })?;
            let value = self.oracle.value_of(descriptor, held)?;
            total = total
                .checked_add(value)
                .ok_or_else(|| Error::overflow("custody valuation"))?;
        }
        Ok(total)
    }

    /// Registry record for an asset
    pub fn asset_info(&self, asset: &AssetId) -> Result<Option<AssetDescriptor>> {
        Ok(self.state()?.registry.get(asset).cloned())
    }

    /// All registered assets in registration order
    pub fn list_assets(&self) -> Result<Vec<AssetDescriptor>> {
        Ok(self.state()?.registry.list())
    }

    /// Whether the bank is paused
    pub fn is_paused(&self) -> Result<bool> {
        Ok(self.state()?.paused)
    }

    /// Validated price reading for an asset
    pub fn price_usd(&self, asset: &AssetId) -> Result<PriceReading> {
        let state = self.state()?;
        let descriptor = state.registry.get(asset).ok_or_else(|| {
            Error::InvalidPriceFeed(format!("no price source bound to {}", asset))
        })?;
        self.oracle.price_usd(descriptor)
    }

    /// Copy of the event log
    pub fn events(&self) -> Result<Vec<EventRecord>> {
        Ok(self.state()?.events.records().to_vec())
    }

    /// Whether a deposit or withdrawal is in flight
    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    /// Check internal consistency of the ledger
    pub fn verify_invariants(&self) -> Result<()> {
        let state = self.state()?;
        state.ledger.verify_invariant()?;
        if state.limits.total() > self.config.bank_cap_usd {
            return Err(Error::InvariantViolation(format!(
                "aggregate {} above cap {}",
                state.limits.total(),
                self.config.bank_cap_usd
            )));
        }
        Ok(())
    }

    /// Serializable copy of all state
    pub fn snapshot(&self) -> Result<BankSnapshot> {
        let state = self.state()?;
        Ok(BankSnapshot {
            config: self.config,
            paused: state.paused,
            total_deposits_usd: state.limits.total(),
            assets: state.registry.list(),
            balances: state.ledger.entries(),
            last_event_sequence: state.events.last().map(|r| r.sequence).unwrap_or(0),
            events: state.events.records().to_vec(),
            taken_at: self.oracle.now(),
        })
    }
}

impl std::fmt::Debug for CustodyBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodyBank")
            .field("config", &self.config)
            .field("busy", &self.guard.is_busy())
            .finish_non_exhaustive()
    }
}

/// Transfer collaborators may fail with anything; surface it as a transfer failure
fn into_transfer_error(e: Error) -> Error {
    match e {
        Error::TransferFailed(_) | Error::ReentrantCall => e,
        other => Error::TransferFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::access::RoleRegistry;
    use crate::core::custody::InMemoryCustody;
    use crate::oracle::price_feed::StaticPriceSource;
    use crate::utils::time::ManualClock;
    use std::sync::{OnceLock, Weak};

    const NOW: u64 = 1_700_000_000;
    const ONE_ETH: u128 = 1_000_000_000_000_000_000;

    struct Harness {
        bank: CustodyBank,
        prices: Arc<StaticPriceSource>,
        custody: Arc<InMemoryCustody>,
        clock: Arc<ManualClock>,
        admin: Address,
        wbtc: AssetId,
        usdc: AssetId,
    }

    fn eth_feed() -> Address {
        Address::derive("ETH/USD")
    }

    fn btc_feed() -> Address {
        Address::derive("BTC/USD")
    }

    fn usdc_feed() -> Address {
        Address::derive("USDC/USD")
    }

    fn alice() -> Address {
        Address::derive("alice")
    }

    fn harness_with(config: BankConfig) -> Harness {
        let admin = Address::derive("admin");
        let prices = Arc::new(StaticPriceSource::new());
        let custody = Arc::new(InMemoryCustody::new());
        let clock = Arc::new(ManualClock::new(NOW));

        prices.set_price(eth_feed(), 8, 200_000_000_000, NOW).unwrap(); // $2,000
        prices.set_price(btc_feed(), 8, 5_000_000_000_000, NOW).unwrap(); // $50,000
        prices.set_price(usdc_feed(), 8, 100_000_000, NOW).unwrap(); // $1

        let bank = CustodyBank::new(
            config,
            eth_feed(),
            Collaborators {
                prices: prices.clone(),
                transfer: custody.clone(),
                access: Arc::new(RoleRegistry::with_admin(admin)),
                clock: clock.clone(),
            },
        )
        .unwrap();

        let wbtc = AssetId::derive("WBTC");
        let usdc = AssetId::derive("USDC");
        bank.add_asset(&admin, wbtc, btc_feed(), 8).unwrap();
        bank.add_asset(&admin, usdc, usdc_feed(), 6).unwrap();

        Harness {
            bank,
            prices,
            custody,
            clock,
            admin,
            wbtc,
            usdc,
        }
    }

    fn harness() -> Harness {
        harness_with(BankConfig::default())
    }

    fn deposit_eth(h: &Harness, owner: &Address, amount: u128) -> Result<DepositResult> {
        h.custody.fund(*owner, AssetId::NATIVE, amount).unwrap();
        h.custody.attach_native(owner, amount).unwrap();
        h.bank.deposit_native(owner, amount)
    }

    #[test]
    fn test_native_registered_at_construction() {
        let h = harness();
        let native = h.bank.asset_info(&AssetId::NATIVE).unwrap().unwrap();
        assert!(native.active);
        assert_eq!(native.native_decimals, 18);
        assert_eq!(h.bank.list_assets().unwrap().len(), 3);
        assert_eq!(h.bank.list_assets().unwrap()[0].id, AssetId::NATIVE);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BankConfig::default().with_max_price_age(0);
        let result = CustodyBank::new(
            config,
            eth_feed(),
            Collaborators {
                prices: Arc::new(StaticPriceSource::new()),
                transfer: Arc::new(InMemoryCustody::new()),
                access: Arc::new(RoleRegistry::new()),
                clock: Arc::new(ManualClock::new(NOW)),
            },
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_deposit_native_eighteen_decimals() {
        let h = harness();
        let result = deposit_eth(&h, &alice(), ONE_ETH).unwrap();

        assert_eq!(result.normalized_amount.raw(), 1_000_000);
        assert_eq!(result.value_usd.raw(), 2_000_000_000);
        assert_eq!(h.bank.balance_of(&alice(), &AssetId::NATIVE).unwrap().raw(), 1_000_000);
        assert_eq!(h.bank.total_deposits_usd().unwrap().raw(), 2_000_000_000);
        assert_eq!(h.bank.asset_info(&AssetId::NATIVE).unwrap().unwrap().deposit_count, 1);
    }

    #[test]
    fn test_deposit_asset_eight_decimals() {
        let h = harness();
        h.custody.fund(alice(), h.wbtc, 100_000_000).unwrap();

        let result = h.bank.deposit_asset(&alice(), &h.wbtc, 100_000_000).unwrap();

        assert_eq!(result.normalized_amount.raw(), 1_000_000);
        assert_eq!(result.value_usd.raw(), 50_000_000_000);
        assert_eq!(h.custody.held(&h.wbtc).unwrap(), 100_000_000);
        assert_eq!(h.custody.wallet_balance(&alice(), &h.wbtc).unwrap(), 0);

        let events = h.bank.events().unwrap();
        let last = events.last().unwrap();
        match &last.event {
            LedgerEvent::Deposit(e) => {
                assert_eq!(e.raw_amount, 100_000_000);
                assert_eq!(e.balance.raw(), 1_000_000);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(last.timestamp, NOW);
    }

    #[test]
    fn test_deposit_precondition_order() {
        let h = harness();
        h.bank.pause(&h.admin).unwrap();
        let ghost = AssetId::derive("ghost");

        // Zero amount is reported before anything else
        assert_eq!(
            h.bank.deposit_asset(&alice(), &ghost, 0).unwrap_err(),
            Error::AmountMustBeGreaterThanZero
        );
        // Unsupported asset before pause
        assert!(matches!(
            h.bank.deposit_asset(&alice(), &ghost, 1).unwrap_err(),
            Error::TokenNotSupported(_)
        ));
        assert_eq!(
            h.bank.deposit_asset(&alice(), &h.usdc, 1).unwrap_err(),
            Error::ContractPaused
        );
    }

    #[test]
    fn test_deposit_asset_rejects_native_id() {
        let h = harness();
        assert!(matches!(
            h.bank.deposit_asset(&alice(), &AssetId::NATIVE, 1),
            Err(Error::TokenNotSupported(_))
        ));
        assert!(matches!(
            h.bank.withdraw_asset(&alice(), &AssetId::NATIVE, 1),
            Err(Error::TokenNotSupported(_))
        ));
    }

    #[test]
    fn test_bank_cap_rejection_leaves_state() {
        let h = harness();
        h.custody.fund(alice(), h.usdc, 1_000_000_000_000).unwrap();

        h.bank.deposit_asset(&alice(), &h.usdc, 999_999_000_000).unwrap();
        assert_eq!(h.bank.total_deposits_usd().unwrap().raw(), 999_999_000_000);

        let before = h.bank.snapshot().unwrap().state_hash();
        let err = h.bank.deposit_asset(&alice(), &h.usdc, 2_000_000).unwrap_err();
        assert_eq!(
            err,
            Error::DepositExceedsBankCap {
                total: 999_999_000_000,
                value: 2_000_000,
                cap: 1_000_000_000_000,
            }
        );
        assert_eq!(h.bank.snapshot().unwrap().state_hash(), before);
        // Nothing was pulled for the rejected deposit
        assert_eq!(h.custody.held(&h.usdc).unwrap(), 999_999_000_000);

        h.bank.deposit_asset(&alice(), &h.usdc, 1_000_000).unwrap();
        assert_eq!(h.bank.available_capacity_usd().unwrap(), UsdValue::ZERO);
    }

    #[test]
    fn test_pull_failure_aborts_deposit() {
        let h = harness();
        h.custody.fund(alice(), h.usdc, 10_000_000).unwrap();
        h.custody.set_fail_pulls(true).unwrap();

        let before = h.bank.snapshot().unwrap().state_hash();
        assert!(matches!(
            h.bank.deposit_asset(&alice(), &h.usdc, 10_000_000),
            Err(Error::TransferFailed(_))
        ));
        assert_eq!(h.bank.snapshot().unwrap().state_hash(), before);
        assert!(!h.bank.is_busy());
    }

    #[test]
    fn test_withdrawal_threshold_boundary() {
        let h = harness();
        h.custody.fund(alice(), h.usdc, 30_000_000_000).unwrap();
        h.bank.deposit_asset(&alice(), &h.usdc, 30_000_000_000).unwrap();

        // Exactly $10,000 is allowed
        let result = h.bank.withdraw_asset(&alice(), &h.usdc, 10_000_000_000).unwrap();
        assert_eq!(result.value_usd.raw(), 10_000_000_000);
        assert_eq!(result.remaining_balance.raw(), 20_000_000_000);

        // One canonical unit more is not, regardless of balance
        assert!(matches!(
            h.bank.withdraw_asset(&alice(), &h.usdc, 10_000_000_001),
            Err(Error::WithdrawalExceedsThreshold {
                value: 10_000_000_001,
                threshold: 10_000_000_000
            })
        ));
        assert_eq!(h.bank.balance_of(&alice(), &h.usdc).unwrap().raw(), 20_000_000_000);
    }

    #[test]
    fn test_withdraw_insufficient_balance() {
        let h = harness();
        assert_eq!(
            h.bank.withdraw_asset(&alice(), &h.usdc, 5).unwrap_err(),
            Error::InsufficientBalance {
                required: 5,
                available: 0
            }
        );
    }

    #[test]
    fn test_withdraw_native_pays_out() {
        let h = harness();
        deposit_eth(&h, &alice(), 2 * ONE_ETH).unwrap();

        let result = h.bank.withdraw_native(&alice(), ONE_ETH).unwrap();
        assert_eq!(result.remaining_balance.raw(), 1_000_000);
        assert_eq!(h.custody.wallet_balance(&alice(), &AssetId::NATIVE).unwrap(), ONE_ETH);
        assert_eq!(h.bank.total_deposits_usd().unwrap().raw(), 2_000_000_000);

        let withdrawals = h.bank.events().unwrap();
        assert_eq!(
            withdrawals
                .iter()
                .filter(|r| r.event.event_type() == "Withdrawal")
                .count(),
            1
        );
    }

    #[test]
    fn test_failed_payout_rolls_back() {
        let h = harness();
        h.custody.fund(alice(), h.usdc, 500_000_000).unwrap();
        h.bank.deposit_asset(&alice(), &h.usdc, 500_000_000).unwrap();

        let before = h.bank.snapshot().unwrap();
        h.custody.set_fail_pushes(true).unwrap();

        assert!(matches!(
            h.bank.withdraw_asset(&alice(), &h.usdc, 100_000_000),
            Err(Error::TransferFailed(_))
        ));

        let after = h.bank.snapshot().unwrap();
        assert_eq!(after.state_hash(), before.state_hash());
        assert_eq!(after.assets, before.assets);
        assert!(h.bank.events().unwrap().iter().all(|r| r.event.event_type() != "Withdrawal"));
        assert!(!h.bank.is_busy());
    }

    #[test]
    fn test_rollback_after_aggregate_floor() {
        let h = harness();
        h.custody.fund(alice(), h.wbtc, 10_000_000).unwrap();
        h.bank.deposit_asset(&alice(), &h.wbtc, 10_000_000).unwrap(); // 0.1 BTC = $5,000

        // BTC doubles; the withdrawal is now worth more than the aggregate
        h.prices.set_price(btc_feed(), 8, 10_000_000_000_000, NOW).unwrap();
        let before = h.bank.snapshot().unwrap().state_hash();

        h.custody.set_fail_pushes(true).unwrap();
        assert!(h.bank.withdraw_asset(&alice(), &h.wbtc, 10_000_000).is_err());
        assert_eq!(h.bank.snapshot().unwrap().state_hash(), before);
        assert_eq!(h.bank.total_deposits_usd().unwrap().raw(), 5_000_000_000);

        h.custody.set_fail_pushes(false).unwrap();
        let result = h.bank.withdraw_asset(&alice(), &h.wbtc, 10_000_000).unwrap();
        assert_eq!(result.value_usd.raw(), 10_000_000_000);
        assert_eq!(h.bank.total_deposits_usd().unwrap(), UsdValue::ZERO);
    }

    #[test]
    fn test_stale_price_blocks_operations() {
        let h = harness();
        h.custody.fund(alice(), h.usdc, 1_000_000).unwrap();

        h.clock.advance(3601);
        assert!(matches!(
            h.bank.deposit_asset(&alice(), &h.usdc, 1_000_000),
            Err(Error::StalePrice { .. })
        ));
        assert!(matches!(h.bank.price_usd(&h.usdc), Err(Error::StalePrice { .. })));
        assert_eq!(h.custody.wallet_balance(&alice(), &h.usdc).unwrap(), 1_000_000);
    }

    #[test]
    fn test_pause_cycle() {
        let h = harness();
        h.custody.fund(alice(), h.usdc, 2_000_000).unwrap();

        h.bank.pause(&h.admin).unwrap();
        assert!(h.bank.is_paused().unwrap());
        assert_eq!(h.bank.pause(&h.admin).unwrap_err(), Error::AlreadyPaused);
        assert_eq!(
            h.bank.deposit_asset(&alice(), &h.usdc, 1_000_000).unwrap_err(),
            Error::ContractPaused
        );

        h.bank.unpause(&h.admin).unwrap();
        assert_eq!(h.bank.unpause(&h.admin).unwrap_err(), Error::NotPaused);
        assert!(h.bank.deposit_asset(&alice(), &h.usdc, 1_000_000).is_ok());
    }

    #[test]
    fn test_admin_actions_require_capability() {
        let h = harness();
        let eve = Address::derive("eve");

        assert!(matches!(h.bank.pause(&eve), Err(Error::Unauthorized(_))));
        assert!(matches!(
            h.bank.add_asset(&eve, AssetId::derive("X"), Address::derive("X/USD"), 6),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            h.bank.remove_asset(&eve, &h.usdc),
            Err(Error::Unauthorized(_))
        ));
        assert!(h.bank.asset_info(&AssetId::derive("X")).unwrap().is_none());
    }

    #[test]
    fn test_remove_asset_blocks_new_activity() {
        let h = harness();
        h.custody.fund(alice(), h.usdc, 3_000_000).unwrap();
        h.bank.deposit_asset(&alice(), &h.usdc, 3_000_000).unwrap();

        h.bank.remove_asset(&h.admin, &h.usdc).unwrap();
        assert!(matches!(
            h.bank.withdraw_asset(&alice(), &h.usdc, 1_000_000),
            Err(Error::TokenNotSupported(_))
        ));
        assert!(matches!(
            h.bank.remove_asset(&h.admin, &AssetId::NATIVE),
            Err(Error::TokenNotSupported(_))
        ));

        // Inactive assets drop out of the owner valuation but stay in custody
        assert_eq!(h.bank.total_value_usd(&alice()).unwrap(), UsdValue::ZERO);
        assert_eq!(h.bank.mark_to_market_usd().unwrap().raw(), 3_000_000);

        // Re-listing restores access with counters intact
        h.bank.add_asset(&h.admin, h.usdc, usdc_feed(), 6).unwrap();
        assert_eq!(h.bank.asset_info(&h.usdc).unwrap().unwrap().deposit_count, 1);
        assert!(h.bank.withdraw_asset(&alice(), &h.usdc, 1_000_000).is_ok());
    }

    #[test]
    fn test_native_feed_can_move_but_not_rescale() {
        let h = harness();
        let new_feed = Address::derive("ETH/USD-2");
        h.prices.set_price(new_feed, 8, 300_000_000_000, NOW).unwrap();

        assert!(matches!(
            h.bank.add_asset(&h.admin, AssetId::NATIVE, new_feed, 8),
            Err(Error::InvalidDecimals { .. })
        ));

        h.bank.add_asset(&h.admin, AssetId::NATIVE, new_feed, 18).unwrap();
        assert_eq!(h.bank.price_usd(&AssetId::NATIVE).unwrap().price, 300_000_000_000);
    }

    #[test]
    fn test_valuation_views() {
        let h = harness();
        h.custody.fund(alice(), h.wbtc, 100_000_000).unwrap();
        h.bank.deposit_asset(&alice(), &h.wbtc, 100_000_000).unwrap();
        deposit_eth(&h, &alice(), ONE_ETH).unwrap();

        assert_eq!(h.bank.total_value_usd(&alice()).unwrap().raw(), 52_000_000_000);

        // The aggregate keeps the deposit-time value, mark-to-market follows price
        h.prices.set_price(btc_feed(), 8, 6_000_000_000_000, NOW).unwrap();
        assert_eq!(h.bank.total_deposits_usd().unwrap().raw(), 52_000_000_000);
        assert_eq!(h.bank.mark_to_market_usd().unwrap().raw(), 62_000_000_000);

        let reading = h.bank.price_usd(&h.wbtc).unwrap();
        assert_eq!(reading.price, 6_000_000_000_000);
        assert!(matches!(
            h.bank.price_usd(&AssetId::derive("ghost")),
            Err(Error::InvalidPriceFeed(_))
        ));
        assert!(h.bank.verify_invariants().is_ok());
    }

    #[test]
    fn test_execute_dispatch() {
        let h = harness();
        h.custody.fund(alice(), h.usdc, 1_000_000).unwrap();

        let result = h
            .bank
            .execute(LedgerOperation::DepositAsset {
                owner: alice(),
                asset: h.usdc,
                amount: 1_000_000,
            })
            .unwrap();
        assert!(matches!(result, OperationResult::Deposit(d) if d.balance.raw() == 1_000_000));

        assert_eq!(
            h.bank
                .execute(LedgerOperation::Pause { caller: h.admin })
                .unwrap(),
            OperationResult::Paused
        );
        assert_eq!(h.bank.events().unwrap().last().unwrap().event.event_type(), "Paused");
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SNAPSHOT RESTORE
    // ═══════════════════════════════════════════════════════════════════════════

    fn collaborators_of(h: &Harness) -> Collaborators {
        Collaborators {
            prices: h.prices.clone(),
            transfer: h.custody.clone(),
            access: Arc::new(RoleRegistry::with_admin(h.admin)),
            clock: h.clock.clone(),
        }
    }

    #[test]
    fn test_restore_resumes_where_snapshot_left_off() {
        let h = harness();
        h.custody.fund(alice(), h.wbtc, 100_000_000).unwrap();
        h.bank.deposit_asset(&alice(), &h.wbtc, 100_000_000).unwrap();
        deposit_eth(&h, &alice(), ONE_ETH).unwrap();
        h.bank.withdraw_asset(&alice(), &h.wbtc, 10_000_000).unwrap();
        h.bank.remove_asset(&h.admin, &h.usdc).unwrap();

        let snap = h.bank.snapshot().unwrap();
        let bytes = snap.to_bytes().unwrap();
        let restored =
            CustodyBank::restore(BankSnapshot::from_bytes(&bytes).unwrap(), collaborators_of(&h))
                .unwrap();

        let again = restored.snapshot().unwrap();
        assert_eq!(again.state_hash(), snap.state_hash());
        assert_eq!(restored.events().unwrap(), h.bank.events().unwrap());
        assert_eq!(restored.total_deposits_usd().unwrap(), h.bank.total_deposits_usd().unwrap());
        assert!(!restored.asset_info(&h.usdc).unwrap().unwrap().active);
        assert!(restored.verify_invariants().is_ok());

        // New activity continues the sequence and the counters
        restored.withdraw_asset(&alice(), &h.wbtc, 10_000_000).unwrap();
        let last = restored.events().unwrap().last().cloned().unwrap();
        assert_eq!(last.sequence, snap.last_event_sequence + 1);
        assert_eq!(restored.asset_info(&h.wbtc).unwrap().unwrap().withdrawal_count, 2);
    }

    #[test]
    fn test_restore_rejects_inconsistent_snapshots() {
        let h = harness();
        deposit_eth(&h, &alice(), ONE_ETH).unwrap();
        let snap = h.bank.snapshot().unwrap();

        let mut no_native = snap.clone();
        no_native.assets.retain(|a| !a.id.is_native());
        assert!(matches!(
            CustodyBank::restore(no_native, collaborators_of(&h)),
            Err(Error::Deserialization(_))
        ));

        let mut duplicated = snap.clone();
        duplicated.assets.push(duplicated.assets[1].clone());
        assert!(matches!(
            CustodyBank::restore(duplicated, collaborators_of(&h)),
            Err(Error::Deserialization(_))
        ));

        let mut orphaned = snap.clone();
        orphaned.balances[0].asset = AssetId::derive("ghost");
        assert!(matches!(
            CustodyBank::restore(orphaned, collaborators_of(&h)),
            Err(Error::Deserialization(_))
        ));

        let mut over_cap = snap.clone();
        over_cap.total_deposits_usd = UsdValue::from_raw(over_cap.config.bank_cap_usd.raw() + 1);
        assert!(matches!(
            CustodyBank::restore(over_cap, collaborators_of(&h)),
            Err(Error::Deserialization(_))
        ));

        let mut truncated = snap.clone();
        truncated.events.pop();
        assert!(matches!(
            CustodyBank::restore(truncated, collaborators_of(&h)),
            Err(Error::Deserialization(_))
        ));

        assert!(CustodyBank::restore(snap, collaborators_of(&h)).is_ok());
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SUB-CANONICAL AMOUNTS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_sub_canonical_withdrawals_cannot_drain_custody() {
        let h = harness();
        deposit_eth(&h, &alice(), ONE_ETH).unwrap();
        let mallory = Address::derive("mallory");
        let before = h.bank.snapshot().unwrap().state_hash();

        // Just under one canonical unit of ETH
        for _ in 0..1000 {
            assert_eq!(
                h.bank.withdraw_native(&mallory, 999_999_999_999).unwrap_err(),
                Error::AmountMustBeGreaterThanZero
            );
        }

        assert_eq!(h.custody.held(&AssetId::NATIVE).unwrap(), ONE_ETH);
        assert_eq!(h.custody.wallet_balance(&mallory, &AssetId::NATIVE).unwrap(), 0);
        assert_eq!(h.bank.snapshot().unwrap().state_hash(), before);
        assert!(h.bank.verify_invariants().is_ok());
    }

    #[test]
    fn test_withdrawal_with_dust_rejected() {
        let h = harness();
        deposit_eth(&h, &alice(), ONE_ETH).unwrap();

        // One canonical unit plus one wei would pay out more than it debits
        let err = h
            .bank
            .withdraw_native(&alice(), 1_000_000_000_001)
            .unwrap_err();
        assert_eq!(
            err,
            Error::SubCanonicalAmount {
                amount: 1_000_000_000_001,
                dust: 1
            }
        );
        assert_eq!(h.bank.balance_of(&alice(), &AssetId::NATIVE).unwrap().raw(), 1_000_000);
        assert_eq!(h.custody.held(&AssetId::NATIVE).unwrap(), ONE_ETH);

        // The whole-unit amount goes through and the payout equals the debit
        let result = h.bank.withdraw_native(&alice(), 1_000_000_000_000).unwrap();
        assert_eq!(result.normalized_amount.raw(), 1);
        assert_eq!(
            h.custody.wallet_balance(&alice(), &AssetId::NATIVE).unwrap(),
            1_000_000_000_000
        );
        assert_eq!(h.custody.held(&AssetId::NATIVE).unwrap(), ONE_ETH - 1_000_000_000_000);
    }

    #[test]
    fn test_dust_only_deposit_rejected() {
        let h = harness();
        h.custody.fund(alice(), AssetId::NATIVE, 5).unwrap();
        h.custody.attach_native(&alice(), 5).unwrap();
        let before = h.bank.snapshot().unwrap().state_hash();

        assert_eq!(
            h.bank.deposit_native(&alice(), 5).unwrap_err(),
            Error::AmountMustBeGreaterThanZero
        );
        assert_eq!(h.bank.snapshot().unwrap().state_hash(), before);
        assert_eq!(h.bank.asset_info(&AssetId::NATIVE).unwrap().unwrap().deposit_count, 0);

        // Same for a pulled asset: nothing leaves the wallet
        h.custody.fund(alice(), h.wbtc, 99).unwrap();
        assert_eq!(
            h.bank.deposit_asset(&alice(), &h.wbtc, 99).unwrap_err(),
            Error::AmountMustBeGreaterThanZero
        );
        assert_eq!(h.custody.wallet_balance(&alice(), &h.wbtc).unwrap(), 99);
    }

    #[test]
    fn test_deposit_dust_stays_in_custody() {
        let h = harness();
        h.custody.fund(alice(), h.wbtc, 150).unwrap();

        let result = h.bank.deposit_asset(&alice(), &h.wbtc, 150).unwrap();
        assert_eq!(result.normalized_amount.raw(), 1);
        assert_eq!(h.custody.held(&h.wbtc).unwrap(), 150);

        // Only the credited unit can come back out
        h.bank.withdraw_asset(&alice(), &h.wbtc, 100).unwrap();
        assert_eq!(h.custody.held(&h.wbtc).unwrap(), 50);
        assert_eq!(h.bank.balance_of(&alice(), &h.wbtc).unwrap(), CanonicalAmount::ZERO);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEPOSIT COMPENSATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Alice holds the largest creditable USDC balance, priced low enough to
    /// stay under the cap, with one more unit left in her wallet
    fn saturated_usdc(h: &Harness) {
        h.prices.set_price(usdc_feed(), 8, 1, NOW).unwrap();
        h.custody.fund(alice(), h.usdc, u64::MAX as u128 + 1).unwrap();
        h.bank.deposit_asset(&alice(), &h.usdc, u64::MAX as u128).unwrap();
    }

    #[test]
    fn test_commit_failure_refunds_pull() {
        let h = harness();
        saturated_usdc(&h);
        let before = h.bank.snapshot().unwrap().state_hash();

        // Passes planning, is pulled, then overflows the balance at commit
        assert!(matches!(
            h.bank.deposit_asset(&alice(), &h.usdc, 1),
            Err(Error::Overflow { .. })
        ));

        assert_eq!(h.custody.wallet_balance(&alice(), &h.usdc).unwrap(), 1);
        assert_eq!(h.custody.held(&h.usdc).unwrap(), u64::MAX as u128);
        assert_eq!(h.bank.snapshot().unwrap().state_hash(), before);
        assert_eq!(h.bank.asset_info(&h.usdc).unwrap().unwrap().deposit_count, 1);
        assert!(!h.bank.is_busy());
    }

    #[test]
    fn test_failed_refund_is_invariant_violation() {
        let h = harness();
        saturated_usdc(&h);
        h.custody.set_fail_pushes(true).unwrap();

        let err = h.bank.deposit_asset(&alice(), &h.usdc, 1).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        assert!(err.is_critical());
        // The unit is stuck in custody without a ledger entry
        assert_eq!(h.custody.wallet_balance(&alice(), &h.usdc).unwrap(), 0);
        assert_eq!(h.custody.held(&h.usdc).unwrap(), u64::MAX as u128 + 1);
        assert!(!h.bank.is_busy());
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COMPLETED PAYOUTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Custody that poisons the bank's state lock right after paying out
    struct PoisoningTransfer {
        inner: InMemoryCustody,
        bank: OnceLock<Weak<CustodyBank>>,
    }

    impl AssetTransfer for PoisoningTransfer {
        fn pull(&self, owner: &Address, asset: &AssetId, amount: u128) -> Result<()> {
            self.inner.pull(owner, asset, amount)
        }

        fn push(&self, owner: &Address, asset: &AssetId, amount: u128) -> Result<()> {
            self.inner.push(owner, asset, amount)?;
            if let Some(bank) = self.bank.get().and_then(Weak::upgrade) {
                let poisoned = std::thread::spawn(move || {
                    let _state = bank.state.lock();
                    panic!("state lock poisoned");
                })
                .join();
                assert!(poisoned.is_err());
            }
            Ok(())
        }
    }

    #[test]
    fn test_paid_out_withdrawal_reports_success_when_state_unavailable() {
        let admin = Address::derive("admin");
        let prices = Arc::new(StaticPriceSource::new());
        prices.set_price(eth_feed(), 8, 200_000_000_000, NOW).unwrap();
        let transfer = Arc::new(PoisoningTransfer {
            inner: InMemoryCustody::new(),
            bank: OnceLock::new(),
        });

        let bank = Arc::new(
            CustodyBank::new(
                BankConfig::default(),
                eth_feed(),
                Collaborators {
                    prices,
                    transfer: transfer.clone(),
                    access: Arc::new(RoleRegistry::with_admin(admin)),
                    clock: Arc::new(ManualClock::new(NOW)),
                },
            )
            .unwrap(),
        );
        transfer.bank.set(Arc::downgrade(&bank)).ok();

        transfer.inner.fund(alice(), AssetId::NATIVE, ONE_ETH).unwrap();
        transfer.inner.attach_native(&alice(), ONE_ETH).unwrap();
        bank.deposit_native(&alice(), ONE_ETH).unwrap();

        let result = bank.withdraw_native(&alice(), ONE_ETH).unwrap();
        assert_eq!(result.normalized_amount.raw(), 1_000_000);
        assert_eq!(result.remaining_balance, CanonicalAmount::ZERO);
        assert_eq!(
            transfer.inner.wallet_balance(&alice(), &AssetId::NATIVE).unwrap(),
            ONE_ETH
        );
        assert!(!bank.is_busy());

        // Later calls see the poisoned lock
        assert_eq!(bank.balance_of(&alice(), &AssetId::NATIVE), Err(Error::Lock));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REENTRANCY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Transfer service that calls back into the bank before completing
    #[derive(Default)]
    struct CallbackTransfer {
        bank: OnceLock<Weak<CustodyBank>>,
        nested: Mutex<Vec<Result<DepositResult>>>,
        observed_balances: Mutex<Vec<CanonicalAmount>>,
    }

    impl CallbackTransfer {
        fn call_back(&self, owner: &Address, asset: &AssetId) {
            if let Some(bank) = self.bank.get().and_then(Weak::upgrade) {
                let nested = bank.deposit_native(owner, 1);
                self.nested.lock().unwrap().push(nested);
                let balance = bank.balance_of(owner, asset).unwrap();
                self.observed_balances.lock().unwrap().push(balance);
            }
        }
    }

    impl AssetTransfer for CallbackTransfer {
        fn pull(&self, owner: &Address, asset: &AssetId, _amount: u128) -> Result<()> {
            self.call_back(owner, asset);
            Ok(())
        }

        fn push(&self, owner: &Address, asset: &AssetId, _amount: u128) -> Result<()> {
            self.call_back(owner, asset);
            Ok(())
        }
    }

    fn reentrant_bank() -> (Arc<CustodyBank>, Arc<CallbackTransfer>, AssetId) {
        let admin = Address::derive("admin");
        let prices = Arc::new(StaticPriceSource::new());
        prices.set_price(eth_feed(), 8, 200_000_000_000, NOW).unwrap();
        prices.set_price(usdc_feed(), 8, 100_000_000, NOW).unwrap();
        let transfer = Arc::new(CallbackTransfer::default());

        let bank = Arc::new(
            CustodyBank::new(
                BankConfig::default(),
                eth_feed(),
                Collaborators {
                    prices,
                    transfer: transfer.clone(),
                    access: Arc::new(RoleRegistry::with_admin(admin)),
                    clock: Arc::new(ManualClock::new(NOW)),
                },
            )
            .unwrap(),
        );
        transfer.bank.set(Arc::downgrade(&bank)).ok();

        let usdc = AssetId::derive("USDC");
        bank.add_asset(&admin, usdc, usdc_feed(), 6).unwrap();
        (bank, transfer, usdc)
    }

    #[test]
    fn test_reentrant_deposit_rejected_during_pull() {
        let (bank, transfer, usdc) = reentrant_bank();

        bank.deposit_asset(&alice(), &usdc, 5_000_000).unwrap();

        let nested = transfer.nested.lock().unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0], Err(Error::ReentrantCall));
        // The pull happens before the commit
        assert_eq!(transfer.observed_balances.lock().unwrap()[0], CanonicalAmount::ZERO);
        assert_eq!(bank.balance_of(&alice(), &usdc).unwrap().raw(), 5_000_000);
        assert!(!bank.is_busy());
    }

    #[test]
    fn test_reentrant_call_during_payout_sees_effects() {
        let (bank, transfer, usdc) = reentrant_bank();
        bank.deposit_asset(&alice(), &usdc, 5_000_000).unwrap();

        bank.withdraw_asset(&alice(), &usdc, 2_000_000).unwrap();

        let nested = transfer.nested.lock().unwrap();
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[1], Err(Error::ReentrantCall));
        // Effects are applied before the payout
        assert_eq!(transfer.observed_balances.lock().unwrap()[1].raw(), 3_000_000);
        drop(nested);

        // Guard is released; a fresh call goes through
        assert!(!bank.is_busy());
        assert!(bank.withdraw_asset(&alice(), &usdc, 1_000_000).is_ok());
    }
}
