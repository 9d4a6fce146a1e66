//! Error Types for LoopVault
//!
//! Typed errors for every failure the engine can surface. All errors are
//! fail-fast and fail-closed: the enclosing operation aborts and no
//! partial ledger or position mutation is retained.

/// Result type alias for LoopVault operations
pub type LoopVaultResult<T> = Result<T, LoopVaultError>;

/// Main error enum for all LoopVault protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopVaultError {
    // ============ Amount Errors ============
    /// Invalid amount provided
    InvalidAmount { amount: u64, reason: AmountErrorReason },

    /// Caller lacks the assets for the requested operation
    InsufficientBalance { available: u64, requested: u64 },

    /// Holder lacks the shares for the requested operation
    InsufficientShares { available: u64, requested: u64 },

    /// Spender's allowance does not cover a delegated withdrawal
    InsufficientAllowance { available: u64, requested: u64 },

    // ============ Limit Errors ============
    /// Deposit would breach the vault's asset cap
    ExceedsLimit { limit: u64, requested: u64 },

    // ============ Position Errors ============
    /// Operation would leave the health factor below the configured floor
    UnsafePosition {
        health_factor: u128,
        min_health_factor: u128,
    },

    /// The lending market rejected a call (propagated, not reinterpreted)
    ExternalMarketFailure {
        verb: ExternalVerb,
        detail: &'static str,
    },

    // ============ Authorization Errors ============
    /// Owner-only action invoked by a non-owner
    Unauthorized { expected: [u8; 32], actual: [u8; 32] },

    // ============ State Errors ============
    /// Deposit attempted while the vault is paused
    Paused,

    /// A mutation was entered while another is in flight
    OperationInFlight,

    /// Invalid parameter value
    InvalidParameter {
        param: &'static str,
        reason: &'static str,
    },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,
}

/// Reasons for amount-related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountErrorReason {
    /// Amount is zero when non-zero required
    Zero,
    /// Amount exceeds maximum
    TooLarge,
    /// Amount too small to produce a nonzero result after rounding
    TooSmall,
}

/// Lending-market verbs, used to attribute propagated market failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalVerb {
    /// Supplying collateral
    Supply,
    /// Borrowing against collateral
    Borrow,
    /// Repaying debt
    Repay,
    /// Withdrawing collateral
    Withdraw,
    /// Querying the account position
    Query,
}

impl LoopVaultError {
    /// Returns a stable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "E010_INVALID_AMOUNT",
            Self::InsufficientBalance { .. } => "E011_INSUFFICIENT_BALANCE",
            Self::InsufficientShares { .. } => "E012_INSUFFICIENT_SHARES",
            Self::InsufficientAllowance { .. } => "E013_INSUFFICIENT_ALLOWANCE",
            Self::ExceedsLimit { .. } => "E020_EXCEEDS_LIMIT",
            Self::UnsafePosition { .. } => "E030_UNSAFE_POSITION",
            Self::ExternalMarketFailure { .. } => "E031_MARKET_FAILURE",
            Self::Unauthorized { .. } => "E040_UNAUTHORIZED",
            Self::Paused => "E050_PAUSED",
            Self::OperationInFlight => "E051_OPERATION_IN_FLIGHT",
            Self::InvalidParameter { .. } => "E052_INVALID_PARAM",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
        }
    }

    /// Returns true if the caller can fix the error and retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InsufficientBalance { .. } => true,  // get more funds
            Self::InsufficientShares { .. } => true,   // request less
            Self::InsufficientAllowance { .. } => true, // raise the allowance
            Self::ExceedsLimit { .. } => true,         // deposit less
            Self::UnsafePosition { .. } => true,       // wait for rebalance, request less
            Self::Paused => true,                      // wait for unpause
            _ => false,
        }
    }
}
