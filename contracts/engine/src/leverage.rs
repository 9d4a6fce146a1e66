//! Leverage Loop Controller
//!
//! Drives freshly deposited base assets into a higher-leverage position:
//! supply the deposit as collateral, then repeat borrow → re-supply
//! cycles until the target loan-to-value is reached, borrow capacity is
//! exhausted, or the iteration cap is hit.
//!
//! The loop fails closed: if any cycle leaves the health factor below the
//! configured floor, the entire deposit is rejected rather than leaving a
//! partially-looped position. A failed deposit is preferable to an unsafe
//! one.

use borsh::{BorshDeserialize, BorshSerialize};
use loopvault_common::{
    bps_of, check, safe_add, AccountPosition, AmountErrorReason, AssetKind, LoopVaultError,
    LoopVaultResult, RateMode, VaultParameters,
};
use serde::{Deserialize, Serialize};

use crate::market::LendingMarket;

/// Result of a leverage loop run
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct LoopOutcome {
    /// Borrow/re-supply cycles executed (the initial supply is not a cycle)
    pub iterations: u32,
    /// Total collateral supplied, including the initial deposit
    pub supplied: u64,
    /// Total borrow-asset amount borrowed and re-supplied
    pub borrowed: u64,
    /// Final position after the loop
    pub position: AccountPosition,
}

/// Loop a fresh deposit into the position.
///
/// Exit conditions are checked in a fixed order every cycle: iteration
/// cap reached, no remaining borrow capacity, nothing left to borrow.
/// Reaching any of them is a normal, non-error termination; only a
/// health-factor breach fails the operation.
///
/// A `target_ltv_bps` of zero degenerates to the unleveraged initial
/// supply: the first capacity check exits the loop immediately.
pub fn run_leverage_loop<M: LendingMarket>(
    market: &mut M,
    params: &VaultParameters,
    assets: u64,
) -> LoopVaultResult<LoopOutcome> {
    check!(
        assets > 0,
        LoopVaultError::InvalidAmount {
            amount: 0,
            reason: AmountErrorReason::Zero,
        }
    );

    market.supply(AssetKind::Base, assets)?;

    let mut iterations = 0u32;
    let mut supplied = assets;
    let mut borrowed = 0u64;

    for _ in 0..params.max_loop_iterations {
        let position = market.account_position()?;

        let max_borrow = bps_of(position.collateral_value, params.target_ltv_bps)?;
        if max_borrow <= position.debt_value {
            break;
        }
        let to_borrow = max_borrow - position.debt_value;
        if to_borrow == 0 {
            break;
        }

        market.borrow(AssetKind::Borrow, to_borrow, RateMode::Variable)?;
        market.supply(AssetKind::Borrow, to_borrow)?;
        iterations += 1;
        borrowed = safe_add(borrowed, to_borrow)?;
        supplied = safe_add(supplied, to_borrow)?;

        let after = market.account_position()?;
        check!(
            after.health_factor >= params.min_health_factor,
            LoopVaultError::UnsafePosition {
                health_factor: after.health_factor,
                min_health_factor: params.min_health_factor,
            }
        );
    }

    let position = market.account_position()?;
    check!(
        position.health_factor >= params.min_health_factor,
        LoopVaultError::UnsafePosition {
            health_factor: position.health_factor,
            min_health_factor: params.min_health_factor,
        }
    );

    Ok(LoopOutcome {
        iterations,
        supplied,
        borrowed,
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockLendingMarket;
    use loopvault_common::constants::precision::WAD;
    use loopvault_common::constants::token::ONE;

    const THRESHOLD_BPS: u64 = 8_000;
    const LIQ_LTV_BPS: u64 = 8_000;

    fn market() -> MockLendingMarket {
        MockLendingMarket::new(THRESHOLD_BPS, LIQ_LTV_BPS)
    }

    #[test]
    fn test_loop_converges_on_target_ltv() {
        let mut m = market();
        let params = VaultParameters::default(); // 60% target LTV, 4 iterations

        let outcome = run_leverage_loop(&mut m, &params, 100 * ONE).unwrap();

        // Geometric series 100 / (1 - 0.6) = 250, cut off at 4 cycles:
        // 100 -> 160 -> 196 -> 217.6 -> 230.56
        assert_eq!(outcome.iterations, 4);
        assert!(outcome.position.collateral_value > 230 * ONE);
        assert!(outcome.position.collateral_value < 231 * ONE);
        assert!(outcome.position.debt_value > 130 * ONE);
        assert!(outcome.position.debt_value < 131 * ONE);
        assert!(outcome.position.health_factor >= params.min_health_factor);
    }

    #[test]
    fn test_zero_deposit_rejected_before_any_market_call() {
        let mut m = market();
        let params = VaultParameters::default();

        let err = run_leverage_loop(&mut m, &params, 0).unwrap_err();
        assert!(matches!(err, LoopVaultError::InvalidAmount { .. }));
        assert_eq!(m.calls().supply, 0);
    }

    #[test]
    fn test_zero_ltv_is_unleveraged_deposit() {
        let mut m = market();
        let params = VaultParameters {
            target_ltv_bps: 0,
            ..VaultParameters::default()
        };

        let outcome = run_leverage_loop(&mut m, &params, 100 * ONE).unwrap();
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.position.collateral_value, 100 * ONE);
        assert_eq!(outcome.position.debt_value, 0);
        assert_eq!(m.calls().borrow, 0);
    }

    #[test]
    fn test_loop_bounded_by_iteration_cap() {
        let mut m = market();
        let params = VaultParameters {
            max_loop_iterations: 2,
            ..VaultParameters::default()
        };

        let outcome = run_leverage_loop(&mut m, &params, 100 * ONE).unwrap();
        assert_eq!(outcome.iterations, 2);
        // Initial supply plus one re-supply per cycle
        assert_eq!(m.calls().supply, 3);
        assert_eq!(m.calls().borrow, 2);
    }

    #[test]
    fn test_loop_fails_closed_when_floor_breached() {
        let mut m = MockLendingMarket::new(7_000, 8_000);
        // 70% threshold with a 70% LTV target: the loop converges toward
        // health factor 1.0, well below the 1.15 floor
        let params = VaultParameters {
            target_ltv_bps: 7_000,
            ..VaultParameters::default()
        };

        let err = run_leverage_loop(&mut m, &params, 100 * ONE).unwrap_err();
        assert!(matches!(err, LoopVaultError::UnsafePosition { .. }));
    }

    #[test]
    fn test_no_capacity_is_normal_termination() {
        let mut m = market();
        // Existing position already above the target LTV: 160 debt on
        // 250 collateral is 64%, past the 60% target
        m.seed_position(250 * ONE, 160 * ONE);
        let params = VaultParameters {
            max_loop_iterations: 8,
            ..VaultParameters::default()
        };

        let outcome = run_leverage_loop(&mut m, &params, 10 * ONE).unwrap();
        // The top-up supplies and then finds max_borrow <= debt: exit
        // without borrowing, not an error
        assert_eq!(outcome.iterations, 0);
        assert_eq!(m.calls().borrow, 0);
        assert_eq!(m.calls().supply, 1);
        assert!(outcome.position.health_factor >= WAD);
    }

    #[test]
    fn test_market_failure_propagates() {
        let mut m = market();
        m.fail_after(loopvault_common::ExternalVerb::Borrow, 1);
        let params = VaultParameters::default();

        let err = run_leverage_loop(&mut m, &params, 100 * ONE).unwrap_err();
        assert!(matches!(
            err,
            LoopVaultError::ExternalMarketFailure { .. }
        ));
    }
}
