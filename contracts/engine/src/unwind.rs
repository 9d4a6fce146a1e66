//! Unwind Controller
//!
//! Reduces the position proportionally so a requested amount of base
//! asset can be returned to a withdrawing holder: repay the slice of debt
//! that corresponds to the withdrawn fraction of collateral, then
//! withdraw the requested assets themselves.

use borsh::{BorshDeserialize, BorshSerialize};
use loopvault_common::{
    check, mul_div_down, AccountPosition, AssetKind, LoopVaultError, LoopVaultResult, RateMode,
    VaultParameters,
};
use serde::{Deserialize, Serialize};

use crate::market::LendingMarket;

/// Result of an unwind run
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct UnwindOutcome {
    /// Base assets withdrawn for the receiver
    pub assets_withdrawn: u64,
    /// Debt repaid alongside the withdrawal
    pub debt_repaid: u64,
    /// Final position after the unwind
    pub position: AccountPosition,
}

/// Unwind a proportional slice of the position.
///
/// `debt_to_repay = floor(debt * assets_to_withdraw / collateral)`; the
/// repay leg is funded by withdrawing the same amount of borrow-asset
/// collateral. The health floor is asserted only when shares remain
/// outstanding after the withdrawal; the last holder out may drain the
/// position completely.
pub fn run_unwind<M: LendingMarket>(
    market: &mut M,
    params: &VaultParameters,
    assets_to_withdraw: u64,
    shares_remain: bool,
) -> LoopVaultResult<UnwindOutcome> {
    let position = market.account_position()?;

    // Nothing supplied: nothing to unwind, the transfer out is zero
    if position.collateral_value == 0 {
        return Ok(UnwindOutcome {
            assets_withdrawn: 0,
            debt_repaid: 0,
            position,
        });
    }

    let debt_to_repay = mul_div_down(
        position.debt_value as u128,
        assets_to_withdraw as u128,
        position.collateral_value as u128,
    )?;
    let debt_to_repay = u64::try_from(debt_to_repay).map_err(|_| LoopVaultError::Overflow)?;

    if debt_to_repay > 0 {
        market.withdraw(AssetKind::Borrow, debt_to_repay)?;
        market.repay(AssetKind::Borrow, debt_to_repay, RateMode::Variable)?;
    }

    market.withdraw(AssetKind::Base, assets_to_withdraw)?;

    let end = market.account_position()?;
    if shares_remain {
        check!(
            end.health_factor >= params.min_health_factor,
            LoopVaultError::UnsafePosition {
                health_factor: end.health_factor,
                min_health_factor: params.min_health_factor,
            }
        );
    }

    Ok(UnwindOutcome {
        assets_withdrawn: assets_to_withdraw,
        debt_repaid: debt_to_repay,
        position: end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockLendingMarket;
    use loopvault_common::constants::token::ONE;

    const THRESHOLD_BPS: u64 = 8_000;
    const LIQ_LTV_BPS: u64 = 8_000;

    fn market_with(collateral: u64, debt: u64) -> MockLendingMarket {
        let mut m = MockLendingMarket::new(THRESHOLD_BPS, LIQ_LTV_BPS);
        m.seed_position(collateral, debt);
        m
    }

    #[test]
    fn test_proportional_unwind() {
        // 345/195 is a looped position worth 150 net
        let mut m = market_with(345 * ONE, 195 * ONE);
        let params = VaultParameters::default();

        let outcome = run_unwind(&mut m, &params, 50 * ONE, true).unwrap();

        // floor(195 * 50 / 345) = 28.26..
        assert_eq!(outcome.debt_repaid, 2_826_086_956);
        assert_eq!(outcome.assets_withdrawn, 50 * ONE);
        assert_eq!(
            m.collateral_value(),
            345 * ONE - outcome.debt_repaid - 50 * ONE
        );
        assert_eq!(m.debt_value(), 195 * ONE - outcome.debt_repaid);
        assert!(outcome.position.health_factor >= params.min_health_factor);
    }

    #[test]
    fn test_unwind_without_debt_skips_repay_leg() {
        let mut m = market_with(100 * ONE, 0);
        let params = VaultParameters::default();

        let outcome = run_unwind(&mut m, &params, 40 * ONE, true).unwrap();
        assert_eq!(outcome.debt_repaid, 0);
        assert_eq!(m.calls().repay, 0);
        assert_eq!(m.collateral_value(), 60 * ONE);
    }

    #[test]
    fn test_empty_position_short_circuits() {
        let mut m = market_with(0, 0);
        let params = VaultParameters::default();

        let outcome = run_unwind(&mut m, &params, 10 * ONE, false).unwrap();
        assert_eq!(outcome.assets_withdrawn, 0);
        assert_eq!(outcome.debt_repaid, 0);
        assert_eq!(m.calls().withdraw, 0);
    }

    #[test]
    fn test_floor_enforced_when_shares_remain() {
        // 160/100 at an 80% threshold is hf 1.28; unwinding 30 of the
        // collateral leaves ~1.10, under the 1.15 floor
        let mut m = market_with(160 * ONE, 100 * ONE);
        let params = VaultParameters::default();

        let err = run_unwind(&mut m, &params, 30 * ONE, true).unwrap_err();
        assert!(matches!(err, LoopVaultError::UnsafePosition { .. }));
    }

    #[test]
    fn test_floor_skipped_for_last_holder() {
        let mut m = market_with(160 * ONE, 100 * ONE);
        let params = VaultParameters::default();

        // Same withdrawal, but no shares remain afterwards
        let outcome = run_unwind(&mut m, &params, 30 * ONE, false).unwrap();
        assert_eq!(outcome.assets_withdrawn, 30 * ONE);
    }
}
