//! LoopVault Engine
//!
//! The leverage-loop and rebalancing engine behind the LoopVault facade.
//!
//! Deposits of a single base asset are driven into a leveraged position
//! against an external lending market by repeated supply → borrow →
//! re-supply cycles; withdrawals unwind proportional slices of the
//! position; a permissionless rebalancer steers the health factor back
//! into its configured band when market drift pushes it out. Share
//! accounting follows ERC-4626 conventions with rounding that always
//! favors existing holders.
//!
//! The engine executes serially: at most one in-flight mutation of a
//! vault's ledger/position pair, enforced by an explicit guard at every
//! entry point. Every mutating operation is all-or-nothing: any failure
//! restores the ledger and the market position to their pre-call state.
//!
//! This crate is `no_std` compatible when built without the default
//! `std` feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export collections for submodules based on feature
#[cfg(not(feature = "std"))]
pub use alloc::collections::BTreeMap;
#[cfg(feature = "std")]
pub use std::collections::BTreeMap;

pub mod ledger;
pub mod leverage;
pub mod market;
pub mod rebalance;
pub mod unwind;
pub mod vault;


// Re-exports for convenience
pub use ledger::*;
pub use leverage::*;
pub use market::*;
pub use rebalance::*;
pub use unwind::*;
pub use vault::*;
