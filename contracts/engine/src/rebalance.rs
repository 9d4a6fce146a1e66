//! Rebalancer
//!
//! Restores the health factor to the target band when market drift
//! (price movement, interest accrual) has pushed it outside
//! `[min_health_factor, max_health_factor]`.
//!
//! Two mutually exclusive branches per call:
//!
//! - **Deleverage** when the health factor is below the floor: withdraw
//!   collateral sufficient to repay a computed slice of debt, repay it,
//!   re-query, repeat until the target is reached or no debt remains.
//! - **Re-leverage** when the health factor is above the ceiling with
//!   debt outstanding: borrow back up to the target LTV and re-supply,
//!   re-query, repeat until the position is back inside the band.
//!
//! Rebalancing is callable by any party: it only ever moves the position
//! toward safety or target, never away from it, so the position can
//! self-heal without relying on a single operator being online.

use borsh::{BorshDeserialize, BorshSerialize};
use loopvault_common::constants::looping::MAX_REBALANCE_STEPS;
use loopvault_common::constants::precision::WAD;
use loopvault_common::{
    bps_of, check, mul_div_down, safe_add, AccountPosition, AssetKind, LoopVaultError,
    LoopVaultResult, RateMode, VaultParameters,
};
use serde::{Deserialize, Serialize};

use crate::market::LendingMarket;

/// Result of a rebalance call
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum RebalanceOutcome {
    /// The position was already inside the band (or debt-free); nothing
    /// was done. A normal outcome, not an error.
    NoAction { health_factor: u128 },

    /// Debt was repaid to lift the health factor back toward the target
    Deleveraged {
        health_factor_before: u128,
        health_factor_after: u128,
        debt_repaid: u64,
        steps: u32,
    },

    /// Debt was added to pull the health factor back under the ceiling
    Releveraged {
        health_factor_before: u128,
        health_factor_after: u128,
        debt_added: u64,
        steps: u32,
    },
}

/// Result of a full deleverage (emergency path)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct FullDeleverageOutcome {
    pub debt_repaid: u64,
    pub collateral_withdrawn: u64,
}

/// Debt slice to repay this step: `debt * (target - current) / target`,
/// WAD-consistent, clamped to `[0, debt]` by construction.
pub fn deleverage_slice(
    debt_value: u64,
    current_hf: u128,
    target_hf: u128,
) -> LoopVaultResult<u64> {
    if current_hf >= target_hf {
        return Ok(0);
    }
    let slice = mul_div_down(debt_value as u128, target_hf - current_hf, target_hf)?;
    u64::try_from(slice).map_err(|_| LoopVaultError::Overflow)
}

/// Largest collateral withdrawal the market will accept before the
/// position touches its liquidation boundary:
/// `collateral * (hf - 1) / hf`, zero at or below a health factor of 1.0.
///
/// Derived from the live health factor so the engine needs no knowledge
/// of the market's internal risk weighting.
pub fn safe_withdraw_bound(collateral_value: u64, health_factor: u128) -> LoopVaultResult<u64> {
    if health_factor <= WAD {
        return Ok(0);
    }
    if health_factor == u128::MAX {
        // Debt-free: everything is withdrawable
        return Ok(collateral_value);
    }
    let bound = mul_div_down(
        collateral_value as u128,
        health_factor - WAD,
        health_factor,
    )?;
    u64::try_from(bound).map_err(|_| LoopVaultError::Overflow)
}

/// Run one rebalance: pick the branch the live position calls for.
pub fn run_rebalance<M: LendingMarket>(
    market: &mut M,
    params: &VaultParameters,
) -> LoopVaultResult<RebalanceOutcome> {
    let start = market.account_position()?;

    if start.debt_value == 0 {
        return Ok(RebalanceOutcome::NoAction {
            health_factor: start.health_factor,
        });
    }
    if start.health_factor < params.min_health_factor {
        deleverage(market, params, start)
    } else if start.health_factor > params.max_health_factor {
        releverage(market, params, start)
    } else {
        Ok(RebalanceOutcome::NoAction {
            health_factor: start.health_factor,
        })
    }
}

fn deleverage<M: LendingMarket>(
    market: &mut M,
    params: &VaultParameters,
    start: AccountPosition,
) -> LoopVaultResult<RebalanceOutcome> {
    let mut steps = 0u32;
    let mut debt_repaid = 0u64;

    loop {
        let position = market.account_position()?;
        if position.debt_value == 0 || position.health_factor >= params.target_health_factor {
            break;
        }
        if steps >= MAX_REBALANCE_STEPS {
            break;
        }

        let mut slice = deleverage_slice(
            position.debt_value,
            position.health_factor,
            params.target_health_factor,
        )?;
        if slice == 0 {
            // Minimum-granularity repay so the loop always makes progress
            slice = bps_of(position.debt_value, params.deleverage_fallback_bps)?.max(1);
        }
        let slice = slice
            .min(position.debt_value)
            .min(safe_withdraw_bound(
                position.collateral_value,
                position.health_factor,
            )?);
        check!(
            slice > 0,
            LoopVaultError::UnsafePosition {
                health_factor: position.health_factor,
                min_health_factor: params.min_health_factor,
            }
        );

        market.withdraw(AssetKind::Borrow, slice)?;
        market.repay(AssetKind::Borrow, slice, RateMode::Variable)?;
        debt_repaid = safe_add(debt_repaid, slice)?;
        steps += 1;
    }

    let end = market.account_position()?;
    check!(
        end.health_factor >= params.min_health_factor,
        LoopVaultError::UnsafePosition {
            health_factor: end.health_factor,
            min_health_factor: params.min_health_factor,
        }
    );

    Ok(RebalanceOutcome::Deleveraged {
        health_factor_before: start.health_factor,
        health_factor_after: end.health_factor,
        debt_repaid,
        steps,
    })
}

fn releverage<M: LendingMarket>(
    market: &mut M,
    params: &VaultParameters,
    start: AccountPosition,
) -> LoopVaultResult<RebalanceOutcome> {
    let mut steps = 0u32;
    let mut debt_added = 0u64;

    loop {
        let position = market.account_position()?;
        if position.health_factor <= params.max_health_factor {
            break;
        }
        if steps >= MAX_REBALANCE_STEPS {
            break;
        }

        let max_borrow = bps_of(position.collateral_value, params.target_ltv_bps)?;
        if max_borrow <= position.debt_value {
            break;
        }
        let to_borrow = max_borrow - position.debt_value;

        market.borrow(AssetKind::Borrow, to_borrow, RateMode::Variable)?;
        market.supply(AssetKind::Borrow, to_borrow)?;
        debt_added = safe_add(debt_added, to_borrow)?;
        steps += 1;
    }

    if debt_added == 0 {
        // Above the ceiling but no capacity under the target LTV
        return Ok(RebalanceOutcome::NoAction {
            health_factor: start.health_factor,
        });
    }

    let end = market.account_position()?;
    check!(
        end.health_factor >= params.min_health_factor,
        LoopVaultError::UnsafePosition {
            health_factor: end.health_factor,
            min_health_factor: params.min_health_factor,
        }
    );

    Ok(RebalanceOutcome::Releveraged {
        health_factor_before: start.health_factor,
        health_factor_after: end.health_factor,
        debt_added,
        steps,
    })
}

/// Repay all debt and withdraw all collateral (emergency path).
///
/// Debt is cleared in slices bounded by what the market will let the
/// vault withdraw at each step; the freed collateral funds the repay, and
/// the bound grows as the health factor recovers. A position at or below
/// a health factor of 1.0 cannot be unwound this way and fails closed.
pub fn run_full_deleverage<M: LendingMarket>(
    market: &mut M,
) -> LoopVaultResult<FullDeleverageOutcome> {
    let mut debt_repaid = 0u64;
    let mut steps = 0u32;

    loop {
        let position = market.account_position()?;
        if position.debt_value == 0 {
            break;
        }
        check!(
            steps < MAX_REBALANCE_STEPS,
            LoopVaultError::UnsafePosition {
                health_factor: position.health_factor,
                min_health_factor: WAD,
            }
        );

        let slice = position.debt_value.min(safe_withdraw_bound(
            position.collateral_value,
            position.health_factor,
        )?);
        check!(
            slice > 0,
            LoopVaultError::UnsafePosition {
                health_factor: position.health_factor,
                min_health_factor: WAD,
            }
        );

        market.withdraw(AssetKind::Borrow, slice)?;
        market.repay(AssetKind::Borrow, slice, RateMode::Variable)?;
        debt_repaid = safe_add(debt_repaid, slice)?;
        steps += 1;
    }

    let position = market.account_position()?;
    let collateral_withdrawn = position.collateral_value;
    if collateral_withdrawn > 0 {
        market.withdraw(AssetKind::Base, collateral_withdrawn)?;
    }

    Ok(FullDeleverageOutcome {
        debt_repaid,
        collateral_withdrawn,
    })
}
