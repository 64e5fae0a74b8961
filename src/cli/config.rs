//! Simulation configuration.
//!
//! A simulation file describes a bank, its feeds, assets, roles, funded
//! wallets and a script of steps to run against in-memory collaborators.
//!
//! Accounts, feeds and assets may be written either as `0x`-prefixed hex or
//! as plain labels (`"alice"`, `"BTC/USD"`), which are hashed into stable
//! addresses. The asset label `"native"` is the native asset.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::access::Capability;
use crate::core::config::BankConfig;
use crate::error::Result;
use crate::protocol::operations::LedgerOperation;
use crate::utils::constants::{MAX_NATIVE_DECIMALS, MAX_POW10_EXPONENT};
use crate::utils::crypto::{Address, AssetId};

/// Resolve hex or a label to an address
pub fn resolve_address(s: &str) -> Result<Address> {
    if s.starts_with("0x") {
        Address::from_hex(s)
    } else {
        Ok(Address::derive(s))
    }
}

/// Resolve hex, `native` or a label to an asset id
pub fn resolve_asset(s: &str) -> Result<AssetId> {
    if s.eq_ignore_ascii_case("native") {
        Ok(AssetId::NATIVE)
    } else {
        resolve_address(s).map(AssetId::from)
    }
}

fn default_start_time() -> u64 {
    1_700_000_000
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIMULATION CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// A price feed and its initial answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Feed id
    pub feed: String,
    /// Fractional digits of answers
    pub decimals: u8,
    /// Initial answer
    pub price: i64,
}

/// An asset registered before the script runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Asset id
    pub asset: String,
    /// Feed id
    pub feed: String,
    /// Native precision
    pub decimals: u8,
}

/// A single capability grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Principal receiving the grant
    pub principal: String,
    /// Capability granted
    pub capability: Capability,
}

/// Spendable units given to an account outside the bank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Account
    pub owner: String,
    /// Asset
    pub asset: String,
    /// Amount in native units
    pub amount: u128,
}

/// One scripted step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Attach native value and deposit it
    DepositNative {
        /// Depositor
        owner: String,
        /// Native units
        amount: u128,
    },
    /// Deposit a registered asset
    DepositAsset {
        /// Depositor
        owner: String,
        /// Asset
        asset: String,
        /// Native units
        amount: u128,
    },
    /// Withdraw native value
    WithdrawNative {
        /// Withdrawer
        owner: String,
        /// Native units
        amount: u128,
    },
    /// Withdraw a registered asset
    WithdrawAsset {
        /// Withdrawer
        owner: String,
        /// Asset
        asset: String,
        /// Native units
        amount: u128,
    },
    /// Register or re-register an asset
    AddAsset {
        /// Caller
        caller: String,
        /// Asset
        asset: String,
        /// Feed id
        feed: String,
        /// Native precision
        decimals: u8,
    },
    /// Deactivate an asset
    RemoveAsset {
        /// Caller
        caller: String,
        /// Asset
        asset: String,
    },
    /// Pause the bank
    Pause {
        /// Caller
        caller: String,
    },
    /// Unpause the bank
    Unpause {
        /// Caller
        caller: String,
    },
    /// Publish a new answer on a feed at the current time
    SetPrice {
        /// Feed id
        feed: String,
        /// New answer
        price: i64,
    },
    /// Move the clock forward
    AdvanceTime {
        /// Seconds
        secs: u64,
    },
    /// Toggle failure of custody pulls
    FailPulls {
        /// Whether pulls fail
        fail: bool,
    },
    /// Toggle failure of custody payouts
    FailPushes {
        /// Whether pushes fail
        fail: bool,
    },
}

impl Step {
    /// Get the step name
    pub fn name(&self) -> &'static str {
        match self {
            Step::DepositNative { .. } => "deposit_native",
            Step::DepositAsset { .. } => "deposit_asset",
            Step::WithdrawNative { .. } => "withdraw_native",
            Step::WithdrawAsset { .. } => "withdraw_asset",
            Step::AddAsset { .. } => "add_asset",
            Step::RemoveAsset { .. } => "remove_asset",
            Step::Pause { .. } => "pause",
            Step::Unpause { .. } => "unpause",
            Step::SetPrice { .. } => "set_price",
            Step::AdvanceTime { .. } => "advance_time",
            Step::FailPulls { .. } => "fail_pulls",
            Step::FailPushes { .. } => "fail_pushes",
        }
    }

    /// Ledger operation for this step, `None` for environment steps
    pub fn to_operation(&self) -> Result<Option<LedgerOperation>> {
        let op = match self {
            Step::DepositNative { owner, amount } => LedgerOperation::DepositNative {
                owner: resolve_address(owner)?,
                amount: *amount,
            },
            Step::DepositAsset {
                owner,
                asset,
                amount,
            } => LedgerOperation::DepositAsset {
                owner: resolve_address(owner)?,
                asset: resolve_asset(asset)?,
                amount: *amount,
            },
            Step::WithdrawNative { owner, amount } => LedgerOperation::WithdrawNative {
                owner: resolve_address(owner)?,
                amount: *amount,
            },
            Step::WithdrawAsset {
                owner,
                asset,
                amount,
            } => LedgerOperation::WithdrawAsset {
                owner: resolve_address(owner)?,
                asset: resolve_asset(asset)?,
                amount: *amount,
            },
            Step::AddAsset {
                caller,
                asset,
                feed,
                decimals,
            } => LedgerOperation::AddAsset {
                caller: resolve_address(caller)?,
                asset: resolve_asset(asset)?,
                price_source: resolve_address(feed)?,
                decimals: *decimals,
            },
            Step::RemoveAsset { caller, asset } => LedgerOperation::RemoveAsset {
                caller: resolve_address(caller)?,
                asset: resolve_asset(asset)?,
            },
            Step::Pause { caller } => LedgerOperation::Pause {
                caller: resolve_address(caller)?,
            },
            Step::Unpause { caller } => LedgerOperation::Unpause {
                caller: resolve_address(caller)?,
            },
            Step::SetPrice { feed, .. } => {
                resolve_address(feed)?;
                return Ok(None);
            }
            Step::AdvanceTime { .. } | Step::FailPulls { .. } | Step::FailPushes { .. } => {
                return Ok(None)
            }
        };
        Ok(Some(op))
    }
}

/// Complete simulation description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Bank parameters
    #[serde(default)]
    pub bank: BankConfig,
    /// Initial clock time
    #[serde(default = "default_start_time")]
    pub start_time: u64,
    /// Feed the native asset is valued against
    pub native_feed: String,
    /// Feeds and initial answers
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    /// Assets registered by the first admin before the script runs
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    /// Principals holding every capability
    #[serde(default)]
    pub admins: Vec<String>,
    /// Individual capability grants
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    /// Funded wallets
    #[serde(default)]
    pub wallets: Vec<WalletConfig>,
    /// Script
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl SimulationConfig {
    /// A small runnable scenario used by `custody-ledger init`
    pub fn example() -> Self {
        let feed = |feed: &str, price: i64| FeedConfig {
            feed: feed.into(),
            decimals: 8,
            price,
        };
        let asset = |asset: &str, feed: &str, decimals: u8| AssetConfig {
            asset: asset.into(),
            feed: feed.into(),
            decimals,
        };
        let wallet = |asset: &str, amount: u128| WalletConfig {
            owner: "alice".into(),
            asset: asset.into(),
            amount,
        };

        Self {
            bank: BankConfig::default(),
            start_time: default_start_time(),
            native_feed: "ETH/USD".into(),
            feeds: vec![
                feed("ETH/USD", 200_000_000_000),
                feed("BTC/USD", 5_000_000_000_000),
                feed("USDC/USD", 100_000_000),
            ],
            assets: vec![asset("WBTC", "BTC/USD", 8), asset("USDC", "USDC/USD", 6)],
            admins: vec!["admin".into()],
            roles: Vec::new(),
            wallets: vec![
                wallet("native", 10_000_000_000_000_000_000),
                wallet("WBTC", 500_000_000),
                wallet("USDC", 50_000_000_000),
            ],
            steps: vec![
                Step::DepositNative {
                    owner: "alice".into(),
                    amount: 1_000_000_000_000_000_000,
                },
                Step::DepositAsset {
                    owner: "alice".into(),
                    asset: "WBTC".into(),
                    amount: 100_000_000,
                },
                Step::WithdrawAsset {
                    owner: "alice".into(),
                    asset: "WBTC".into(),
                    amount: 10_000_000,
                },
                Step::DepositAsset {
                    owner: "alice".into(),
                    asset: "USDC".into(),
                    amount: 20_000_000_000,
                },
                Step::WithdrawAsset {
                    owner: "alice".into(),
                    asset: "USDC".into(),
                    amount: 10_000_000_001,
                },
                Step::Pause {
                    caller: "admin".into(),
                },
                Step::WithdrawNative {
                    owner: "alice".into(),
                    amount: 500_000_000_000_000_000,
                },
                Step::Unpause {
                    caller: "admin".into(),
                },
                Step::AdvanceTime { secs: 3_601 },
                Step::WithdrawNative {
                    owner: "alice".into(),
                    amount: 500_000_000_000_000_000,
                },
                Step::SetPrice {
                    feed: "ETH/USD".into(),
                    price: 210_000_000_000,
                },
                Step::WithdrawNative {
                    owner: "alice".into(),
                    amount: 500_000_000_000_000_000,
                },
            ],
        }
    }

    /// Load from file
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from file, then overlay `CUSTODY_*` environment variables onto the
    /// bank parameters
    pub fn load_with_env(path: &Path) -> std::result::Result<Self, ConfigError> {
        Self::load_with_overrides(path, |key| std::env::var(key).ok())
    }

    /// Load from file, then overlay values from `lookup` onto the bank parameters
    pub fn load_with_overrides<F>(path: &Path, lookup: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::load(path)?;
        config.bank = config
            .bank
            .with_overrides(lookup)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        Ok(config)
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> std::result::Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let invalid = |e: crate::error::Error| ConfigError::Validation(e.to_string());

        self.bank.validate().map_err(invalid)?;
        let native_feed = resolve_address(&self.native_feed).map_err(invalid)?;

        let mut feeds = Vec::with_capacity(self.feeds.len());
        for feed in &self.feeds {
            if feed.decimals as u32 > MAX_POW10_EXPONENT {
                return Err(ConfigError::Validation(format!(
                    "feed {} has {} decimals, maximum is {}",
                    feed.feed, feed.decimals, MAX_POW10_EXPONENT
                )));
            }
            feeds.push(resolve_address(&feed.feed).map_err(invalid)?);
        }

        if !feeds.contains(&native_feed) {
            return Err(ConfigError::Validation(format!(
                "native feed {} is not listed in feeds",
                self.native_feed
            )));
        }

        if !self.assets.is_empty() && self.admins.is_empty() {
            return Err(ConfigError::Validation(
                "assets need at least one admin to register them".into(),
            ));
        }

        for asset in &self.assets {
            if asset.decimals > MAX_NATIVE_DECIMALS {
                return Err(ConfigError::Validation(format!(
                    "asset {} has {} decimals, maximum is {}",
                    asset.asset, asset.decimals, MAX_NATIVE_DECIMALS
                )));
            }
            resolve_asset(&asset.asset).map_err(invalid)?;
            let feed = resolve_address(&asset.feed).map_err(invalid)?;
            if !feeds.contains(&feed) {
                return Err(ConfigError::Validation(format!(
                    "asset {} uses unknown feed {}",
                    asset.asset, asset.feed
                )));
            }
        }

        for principal in self
            .admins
            .iter()
            .chain(self.roles.iter().map(|r| &r.principal))
        {
            resolve_address(principal).map_err(invalid)?;
        }

        for wallet in &self.wallets {
            resolve_address(&wallet.owner).map_err(invalid)?;
            resolve_asset(&wallet.asset).map_err(invalid)?;
        }

        for (i, step) in self.steps.iter().enumerate() {
            step.to_operation().map_err(|e| {
                ConfigError::Validation(format!("step {} ({}): {}", i, step.name(), e))
            })?;
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(String),
    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}
