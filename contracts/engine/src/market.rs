//! Lending Market Interface
//!
//! The engine's seam to the external lending market: the five mutation
//! and query verbs the controllers call, plus the transaction boundary
//! the execution environment provides.
//!
//! In the reference deployment the environment is a blockchain virtual
//! machine, which reverts every market mutation automatically when the
//! enclosing transaction fails. A port has to reproduce that behavior
//! explicitly, so the seam carries a `snapshot`/`restore` pair: the
//! facade captures a snapshot at the entry of every mutating operation
//! and restores it on any error.

use loopvault_common::{AccountPosition, AssetKind, LoopVaultResult, RateMode};

pub mod mock;

pub use mock::{CallCounts, MockLendingMarket};

/// External lending market the vault loops against.
///
/// Every call is a fallible synchronous step; a failure aborts the entire
/// enclosing vault operation. Market-side rejections surface as
/// [`loopvault_common::LoopVaultError::ExternalMarketFailure`] and are
/// propagated to the caller unreinterpreted.
pub trait LendingMarket {
    /// Opaque capture of the market-side account state
    type Snapshot;

    /// Deposit collateral for the vault's account.
    fn supply(&mut self, asset: AssetKind, amount: u64) -> LoopVaultResult<()>;

    /// Increase debt. Must fail if the borrow would breach the market's
    /// own solvency rule.
    fn borrow(&mut self, asset: AssetKind, amount: u64, rate_mode: RateMode)
        -> LoopVaultResult<()>;

    /// Decrease debt. Amounts above the outstanding debt are capped at
    /// the outstanding debt.
    fn repay(&mut self, asset: AssetKind, amount: u64, rate_mode: RateMode)
        -> LoopVaultResult<()>;

    /// Decrease collateral. Must fail if the withdrawal would breach the
    /// market's own solvency rule.
    fn withdraw(&mut self, asset: AssetKind, amount: u64) -> LoopVaultResult<()>;

    /// Read the vault's aggregate position, base-currency denominated,
    /// computed against current oracle prices.
    fn account_position(&self) -> LoopVaultResult<AccountPosition>;

    /// The market's liquidation LTV for the looped asset pair, in basis
    /// points. Used to validate the vault's target LTV keeps its margin.
    fn liquidation_ltv_bps(&self) -> u64;

    /// Capture the account state for a later [`LendingMarket::restore`].
    fn snapshot(&self) -> Self::Snapshot;

    /// Roll the account state back to a previously captured snapshot.
    fn restore(&mut self, snapshot: Self::Snapshot);
}
