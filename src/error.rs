//! Error types for the custody ledger.
//!
//! Every failure aborts the enclosing operation with full rollback. Errors are
//! grouped by category so callers can tell input mistakes apart from policy
//! rejections, oracle outages and transfer failures.

use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or out-of-range caller input
    Input,
    /// Request is well-formed but rejected by ledger policy
    Policy,
    /// Price source missing, invalid or stale
    Oracle,
    /// External custody movement failed
    Transfer,
    /// Caller lacks the required capability
    Authorization,
    /// Nested invocation or lock failure
    Concurrency,
    /// Should not happen in a healthy ledger
    Internal,
}

/// Main error type for the custody ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Input Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Deposit or withdrawal amount is zero
    #[error("Amount must be greater than zero")]
    AmountMustBeGreaterThanZero,

    /// Native decimals outside the supported range
    #[error("Invalid decimals {decimals}: maximum supported is {max}")]
    InvalidDecimals {
        /// Requested decimals
        decimals: u8,
        /// Maximum supported decimals
        max: u8,
    },

    /// Overflow in a checked calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Address text could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Bank configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Withdrawal amount carries units below canonical precision
    #[error("Amount {amount} has {dust} native units below canonical precision")]
    SubCanonicalAmount {
        /// Requested amount in native units
        amount: u128,
        /// Units that would not be debited
        dust: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Policy Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Asset is unknown, deactivated, or the operation is not allowed for it
    #[error("Token not supported: {0}")]
    TokenNotSupported(String),

    /// Ledger is paused
    #[error("Contract is paused")]
    ContractPaused,

    /// Deposit would push the aggregate above the bank cap
    #[error("Deposit exceeds bank cap: total {total} + value {value} > cap {cap}")]
    DepositExceedsBankCap {
        /// Current aggregate USD value
        total: u64,
        /// USD value of the rejected deposit
        value: u64,
        /// Configured bank cap
        cap: u64,
    },

    /// Withdrawal value is above the per-transaction ceiling
    #[error("Withdrawal value {value} exceeds threshold {threshold}")]
    WithdrawalExceedsThreshold {
        /// USD value of the rejected withdrawal
        value: u64,
        /// Configured per-transaction threshold
        threshold: u64,
    },

    /// Balance is lower than the requested amount
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Requested canonical amount
        required: u64,
        /// Available canonical balance
        available: u64,
    },

    /// Pause requested while already paused
    #[error("Contract is already paused")]
    AlreadyPaused,

    /// Unpause requested while active
    #[error("Contract is not paused")]
    NotPaused,

    // ═══════════════════════════════════════════════════════════════════
    // Oracle Errors
    // ═══════════════════════════════════════════════════════════════════

    /// No usable price source for the asset
    #[error("Invalid price feed: {0}")]
    InvalidPriceFeed(String),

    /// Price source reported a non-positive answer
    #[error("Invalid price: {0}")]
    InvalidPrice(i64),

    /// Price reading is too old or its round is incomplete
    #[error("Price is stale: {reason}")]
    StalePrice {
        /// Why the reading was rejected
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Transfer Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Custody pull or payout push failed
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    // ═══════════════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Caller lacks the capability required by the action
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    // ═══════════════════════════════════════════════════════════════════
    // Concurrency Errors
    // ═══════════════════════════════════════════════════════════════════

    /// A guarded operation was invoked while another one is in flight
    #[error("Reentrant call rejected")]
    ReentrantCall,

    /// Lock acquisition failed
    #[error("Failed to acquire lock")]
    Lock,

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for an [`Error::Overflow`]
    pub fn overflow(operation: impl Into<String>) -> Self {
        Error::Overflow {
            operation: operation.into(),
        }
    }

    /// Shorthand for an [`Error::StalePrice`]
    pub fn stale(reason: impl Into<String>) -> Self {
        Error::StalePrice {
            reason: reason.into(),
        }
    }

    /// Category this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::AmountMustBeGreaterThanZero
            | Error::InvalidDecimals { .. }
            | Error::Overflow { .. }
            | Error::InvalidAddress(_)
            | Error::InvalidConfig(_)
            | Error::SubCanonicalAmount { .. } => ErrorCategory::Input,

            Error::TokenNotSupported(_)
            | Error::ContractPaused
            | Error::DepositExceedsBankCap { .. }
            | Error::WithdrawalExceedsThreshold { .. }
            | Error::InsufficientBalance { .. }
            | Error::AlreadyPaused
            | Error::NotPaused => ErrorCategory::Policy,

            Error::InvalidPriceFeed(_) | Error::InvalidPrice(_) | Error::StalePrice { .. } => {
                ErrorCategory::Oracle
            }

            Error::TransferFailed(_) => ErrorCategory::Transfer,

            Error::Unauthorized(_) => ErrorCategory::Authorization,

            Error::ReentrantCall | Error::Lock => ErrorCategory::Concurrency,

            Error::Serialization(_)
            | Error::Deserialization(_)
            | Error::InvariantViolation(_)
            | Error::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_) | Error::Internal(_) | Error::Lock
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Input errors: 1xxx
            Error::AmountMustBeGreaterThanZero => 1001,
            Error::InvalidDecimals { .. } => 1002,
            Error::Overflow { .. } => 1003,
            Error::InvalidAddress(_) => 1004,
            Error::InvalidConfig(_) => 1005,
            Error::SubCanonicalAmount { .. } => 1006,

            // Policy errors: 2xxx
            Error::TokenNotSupported(_) => 2001,
            Error::ContractPaused => 2002,
            Error::DepositExceedsBankCap { .. } => 2003,
            Error::WithdrawalExceedsThreshold { .. } => 2004,
            Error::InsufficientBalance { .. } => 2005,
            Error::AlreadyPaused => 2006,
            Error::NotPaused => 2007,

            // Oracle errors: 3xxx
            Error::InvalidPriceFeed(_) => 3001,
            Error::InvalidPrice(_) => 3002,
            Error::StalePrice { .. } => 3003,

            // Transfer errors: 4xxx
            Error::TransferFailed(_) => 4001,

            // Authorization errors: 5xxx
            Error::Unauthorized(_) => 5001,

            // Concurrency errors: 6xxx
            Error::ReentrantCall => 6001,
            Error::Lock => 6002,

            // Internal errors: 9xxx
            Error::Serialization(_) => 9001,
            Error::Deserialization(_) => 9002,
            Error::InvariantViolation(_) => 9003,
            Error::Internal(_) => 9004,
        }
    }
}
