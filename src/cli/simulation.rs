//! Scripted runs against in-memory collaborators.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::cli::config::{resolve_address, resolve_asset, SimulationConfig, Step};
use crate::core::access::{Capability, RoleRegistry};
use crate::core::custody::InMemoryCustody;
use crate::error::{Error, Result};
use crate::oracle::price_feed::StaticPriceSource;
use crate::protocol::operations::{LedgerOperation, OperationResult};
use crate::protocol::snapshot::BankSnapshot;
use crate::protocol::state_machine::{Collaborators, CustodyBank};
use crate::utils::crypto::Address;
use crate::utils::time::{Clock, ManualClock};

/// What a step produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// A ledger operation was accepted
    Ledger(OperationResult),
    /// A feed answer changed
    PriceSet {
        /// Feed
        feed: Address,
        /// New answer
        price: i64,
    },
    /// The clock moved
    TimeAdvanced {
        /// New time
        now: u64,
    },
    /// A custody failure switch changed
    FailureInjected {
        /// Which side
        side: String,
        /// New state
        fail: bool,
    },
}

/// Report line for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Position in the script
    pub index: usize,
    /// Step name
    pub step: String,
    /// Outcome when accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepOutcome>,
    /// Error code when rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    /// Error message when rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    /// Whether the step was accepted
    pub fn is_ok(&self) -> bool {
        self.outcome.is_some()
    }
}

/// A bank wired to in-memory feeds, custody and clock
pub struct Simulation {
    bank: CustodyBank,
    prices: Arc<StaticPriceSource>,
    custody: Arc<InMemoryCustody>,
    clock: Arc<ManualClock>,
    feed_decimals: HashMap<Address, u8>,
}

impl Simulation {
    /// Build the environment described by `config`, register its assets and
    /// fund its wallets
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(config.start_time));
        let prices = Arc::new(StaticPriceSource::new());
        let custody = Arc::new(InMemoryCustody::new());

        let mut feed_decimals = HashMap::new();
        for feed in &config.feeds {
            let address = resolve_address(&feed.feed)?;
            prices.set_price(address, feed.decimals, feed.price, config.start_time)?;
            feed_decimals.insert(address, feed.decimals);
        }

        let mut roles = RoleRegistry::new();
        let mut admins = Vec::with_capacity(config.admins.len());
        for admin in &config.admins {
            let address = resolve_address(admin)?;
            for capability in Capability::ALL {
                roles.grant(address, capability);
            }
            admins.push(address);
        }
        for role in &config.roles {
            roles.grant(resolve_address(&role.principal)?, role.capability);
        }

        let bank = CustodyBank::new(
            config.bank,
            resolve_address(&config.native_feed)?,
            Collaborators {
                prices: prices.clone(),
                transfer: custody.clone(),
                access: Arc::new(roles),
                clock: clock.clone(),
            },
        )?;

        if !config.assets.is_empty() {
            let admin = admins
                .first()
                .ok_or_else(|| Error::InvalidConfig("assets need an admin".into()))?;
            for asset in &config.assets {
                bank.add_asset(
                    admin,
                    resolve_asset(&asset.asset)?,
                    resolve_address(&asset.feed)?,
                    asset.decimals,
                )?;
            }
        }

        for wallet in &config.wallets {
            custody.fund(
                resolve_address(&wallet.owner)?,
                resolve_asset(&wallet.asset)?,
                wallet.amount,
            )?;
        }

        info!(
            "Simulation ready: {} feeds, {} assets, {} wallets",
            config.feeds.len(),
            config.assets.len() + 1,
            config.wallets.len()
        );

        Ok(Self {
            bank,
            prices,
            custody,
            clock,
            feed_decimals,
        })
    }

    /// The bank under simulation
    pub fn bank(&self) -> &CustodyBank {
        &self.bank
    }

    /// The custody backing the bank
    pub fn custody(&self) -> &InMemoryCustody {
        &self.custody
    }

    /// Current simulated time
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Apply one step
    pub fn apply(&self, step: &Step) -> Result<StepOutcome> {
        match step {
            Step::SetPrice { feed, price } => {
                let feed = resolve_address(feed)?;
                let decimals = self
                    .feed_decimals
                    .get(&feed)
                    .copied()
                    .ok_or_else(|| Error::InvalidPriceFeed(format!("unknown feed {}", feed)))?;
                self.prices.set_price(feed, decimals, *price, self.clock.now())?;
                Ok(StepOutcome::PriceSet {
                    feed,
                    price: *price,
                })
            }
            Step::AdvanceTime { secs } => {
                self.clock.advance(*secs);
                Ok(StepOutcome::TimeAdvanced {
                    now: self.clock.now(),
                })
            }
            Step::FailPulls { fail } => {
                self.custody.set_fail_pulls(*fail)?;
                Ok(StepOutcome::FailureInjected {
                    side: "pull".into(),
                    fail: *fail,
                })
            }
            Step::FailPushes { fail } => {
                self.custody.set_fail_pushes(*fail)?;
                Ok(StepOutcome::FailureInjected {
                    side: "push".into(),
                    fail: *fail,
                })
            }
            _ => match step.to_operation()? {
                Some(op) => self.submit(op).map(StepOutcome::Ledger),
                None => Err(Error::Internal(format!("step {} has no operation", step.name()))),
            },
        }
    }

    /// Submit a ledger operation, attaching native value to native deposits
    pub fn submit(&self, op: LedgerOperation) -> Result<OperationResult> {
        if let LedgerOperation::DepositNative { owner, amount } = &op {
            let (owner, amount) = (*owner, *amount);
            self.custody.attach_native(&owner, amount)?;
            return match self.bank.execute(op) {
                Ok(result) => Ok(result),
                Err(e) => {
                    self.custody.refund_native(&owner, amount)?;
                    Err(e)
                }
            };
        }
        self.bank.execute(op)
    }

    /// Run a script, continuing past rejected steps
    pub fn run(&self, steps: &[Step]) -> Vec<StepReport> {
        steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let report = match self.apply(step) {
                    Ok(outcome) => StepReport {
                        index,
                        step: step.name().to_string(),
                        outcome: Some(outcome),
                        code: None,
                        error: None,
                    },
                    Err(e) => StepReport {
                        index,
                        step: step.name().to_string(),
                        outcome: None,
                        code: Some(e.code()),
                        error: Some(e.to_string()),
                    },
                };
                debug!(index, step = step.name(), ok = report.is_ok(), "Step applied");
                report
            })
            .collect()
    }

    /// Snapshot of the bank at the current simulated time
    pub fn snapshot(&self) -> Result<BankSnapshot> {
        self.bank.snapshot()
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("bank", &self.bank)
            .field("now", &self.clock.now())
            .field("feeds", &self.feed_decimals.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::amount::CanonicalAmount;
    use crate::utils::crypto::AssetId;

    fn config() -> SimulationConfig {
        serde_json::from_str(
            r#"{
                "native_feed": "ETH/USD",
                "feeds": [
                    {"feed": "ETH/USD", "decimals": 8, "price": 200000000000},
                    {"feed": "BTC/USD", "decimals": 8, "price": 5000000000000}
                ],
                "assets": [{"asset": "WBTC", "feed": "BTC/USD", "decimals": 8}],
                "admins": ["admin"],
                "wallets": [
                    {"owner": "alice", "asset": "native", "amount": 5000000000000000000},
                    {"owner": "alice", "asset": "WBTC", "amount": 100000000}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_native_deposit_attaches_value() {
        let sim = Simulation::from_config(&config()).unwrap();
        let alice = Address::derive("alice");

        let reports = sim.run(&[Step::DepositNative {
            owner: "alice".into(),
            amount: 1_000_000_000_000_000_000,
        }]);
        assert!(reports[0].is_ok());
        assert_eq!(
            sim.bank().balance_of(&alice, &AssetId::NATIVE).unwrap(),
            CanonicalAmount::from_units(1)
        );
        assert_eq!(
            sim.custody().held(&AssetId::NATIVE).unwrap(),
            1_000_000_000_000_000_000
        );
    }

    #[test]
    fn test_rejected_native_deposit_refunds() {
        let sim = Simulation::from_config(&config()).unwrap();
        let alice = Address::derive("alice");

        let reports = sim.run(&[
            Step::Pause {
                caller: "admin".into(),
            },
            Step::DepositNative {
                owner: "alice".into(),
                amount: 1_000_000_000_000_000_000,
            },
        ]);
        assert!(reports[0].is_ok());
        assert!(!reports[1].is_ok());
        assert_eq!(reports[1].code, Some(Error::ContractPaused.code()));
        assert_eq!(
            sim.custody().wallet_balance(&alice, &AssetId::NATIVE).unwrap(),
            5_000_000_000_000_000_000
        );
        assert_eq!(sim.custody().held(&AssetId::NATIVE).unwrap(), 0);
    }

    #[test]
    fn test_staleness_after_time_advance() {
        let sim = Simulation::from_config(&config()).unwrap();

        let reports = sim.run(&[
            Step::AdvanceTime { secs: 3_601 },
            Step::DepositAsset {
                owner: "alice".into(),
                asset: "WBTC".into(),
                amount: 1_000_000,
            },
            Step::SetPrice {
                feed: "BTC/USD".into(),
                price: 5_000_000_000_000,
            },
            Step::DepositAsset {
                owner: "alice".into(),
                asset: "WBTC".into(),
                amount: 1_000_000,
            },
        ]);

        assert!(reports[0].is_ok());
        assert!(!reports[1].is_ok());
        assert!(reports[2].is_ok());
        assert!(reports[3].is_ok());
    }

    #[test]
    fn test_unknown_feed_price_update() {
        let sim = Simulation::from_config(&config()).unwrap();
        let result = sim.apply(&Step::SetPrice {
            feed: "SOL/USD".into(),
            price: 1,
        });
        assert!(matches!(result, Err(Error::InvalidPriceFeed(_))));
    }

    #[test]
    fn test_failed_payout_reported() {
        let sim = Simulation::from_config(&config()).unwrap();
        let reports = sim.run(&[
            Step::DepositAsset {
                owner: "alice".into(),
                asset: "WBTC".into(),
                amount: 10_000_000,
            },
            Step::FailPushes { fail: true },
            Step::WithdrawAsset {
                owner: "alice".into(),
                asset: "WBTC".into(),
                amount: 1_000_000,
            },
        ]);

        assert!(reports[0].is_ok());
        assert_eq!(reports[2].code, Some(Error::TransferFailed(String::new()).code()));
        // One pull for the deposit, no completed push
        assert_eq!(sim.custody().transfer_counts().unwrap(), (1, 0));
        assert_eq!(
            sim.bank()
                .balance_of(&Address::derive("alice"), &AssetId::derive("WBTC"))
                .unwrap(),
            CanonicalAmount::from_raw(100_000)
        );
    }
}
