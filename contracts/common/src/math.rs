//! Fixed-Point Math for LoopVault
//!
//! Checked arithmetic over the protocol's three scales: 8-decimal asset
//! units (`u64`), WAD ratios (`u128`, 1e18 = 1.0) and basis points.
//! Rounding direction is always explicit at the call site; conversions
//! that credit the actor round down, conversions that charge the actor
//! round up.

use crate::constants::precision::{BPS, WAD};
use crate::errors::{LoopVaultError, LoopVaultResult};

/// floor(a * b / denominator), checked
pub fn mul_div_down(a: u128, b: u128, denominator: u128) -> LoopVaultResult<u128> {
    if denominator == 0 {
        return Err(LoopVaultError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(LoopVaultError::Overflow)?;
    Ok(product / denominator)
}

/// ceil(a * b / denominator), checked
pub fn mul_div_up(a: u128, b: u128, denominator: u128) -> LoopVaultResult<u128> {
    if denominator == 0 {
        return Err(LoopVaultError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(LoopVaultError::Overflow)?;
    let quotient = product / denominator;
    if product % denominator == 0 {
        Ok(quotient)
    } else {
        quotient.checked_add(1).ok_or(LoopVaultError::Overflow)
    }
}

/// floor(amount * bps / 10_000)
///
/// The workhorse for LTV math: `bps_of(collateral, target_ltv_bps)` is
/// the largest debt the target loan-to-value admits.
pub fn bps_of(amount: u64, bps: u64) -> LoopVaultResult<u64> {
    let result = mul_div_down(amount as u128, bps as u128, BPS as u128)?;
    u64::try_from(result).map_err(|_| LoopVaultError::Overflow)
}

/// Health factor of a position as a WAD ratio.
///
/// `health_factor = collateral_value * liquidation_threshold / debt_value`,
/// where the threshold is the market's risk weighting in basis points.
/// Zero debt yields `u128::MAX` (no liquidation risk).
///
/// # Arguments
/// * `collateral_value` - Aggregate collateral in base-currency units
/// * `debt_value` - Aggregate debt in base-currency units
/// * `liquidation_threshold_bps` - Market risk weighting, e.g. 8000 = 80%
pub fn health_factor(
    collateral_value: u64,
    debt_value: u64,
    liquidation_threshold_bps: u64,
) -> LoopVaultResult<u128> {
    if debt_value == 0 {
        return Ok(u128::MAX);
    }

    // Weighted collateral first, so the WAD multiply stays inside u128.
    let weighted = mul_div_down(
        collateral_value as u128,
        liquidation_threshold_bps as u128,
        BPS as u128,
    )?;
    mul_div_down(weighted, WAD, debt_value as u128)
}

/// Safe addition with overflow check
pub fn safe_add(a: u64, b: u64) -> LoopVaultResult<u64> {
    a.checked_add(b).ok_or(LoopVaultError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u64, b: u64) -> LoopVaultResult<u64> {
    a.checked_sub(b).ok_or(LoopVaultError::Underflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::token::ONE;

    #[test]
    fn test_mul_div_rounding() {
        // 10 * 10 / 3 = 33.33..
        assert_eq!(mul_div_down(10, 10, 3).unwrap(), 33);
        assert_eq!(mul_div_up(10, 10, 3).unwrap(), 34);

        // Exact division rounds the same both ways
        assert_eq!(mul_div_down(10, 9, 3).unwrap(), 30);
        assert_eq!(mul_div_up(10, 9, 3).unwrap(), 30);
    }

    #[test]
    fn test_mul_div_zero_denominator() {
        assert_eq!(
            mul_div_down(1, 1, 0),
            Err(LoopVaultError::DivisionByZero)
        );
        assert_eq!(mul_div_up(1, 1, 0), Err(LoopVaultError::DivisionByZero));
    }

    #[test]
    fn test_mul_div_overflow() {
        assert_eq!(
            mul_div_down(u128::MAX, 2, 1),
            Err(LoopVaultError::Overflow)
        );
    }

    #[test]
    fn test_bps_of() {
        // 60% of 100 units
        assert_eq!(bps_of(100 * ONE, 6_000).unwrap(), 60 * ONE);
        // 0 bps means no borrow capacity at all
        assert_eq!(bps_of(100 * ONE, 0).unwrap(), 0);
        // 100% is the identity
        assert_eq!(bps_of(100 * ONE, 10_000).unwrap(), 100 * ONE);
    }

    #[test]
    fn test_health_factor() {
        // 230 collateral, 130 debt, 80% threshold: 230 * 0.8 / 130 = 1.415..
        let hf = health_factor(230 * ONE, 130 * ONE, 8_000).unwrap();
        assert!(hf > 1_410_000_000_000_000_000);
        assert!(hf < 1_420_000_000_000_000_000);

        // On the liquidation boundary: 100 * 0.8 / 80 = 1.0
        let hf = health_factor(100 * ONE, 80 * ONE, 8_000).unwrap();
        assert_eq!(hf, WAD);
    }

    #[test]
    fn test_health_factor_zero_debt() {
        assert_eq!(health_factor(100 * ONE, 0, 8_000).unwrap(), u128::MAX);
        assert_eq!(health_factor(0, 0, 8_000).unwrap(), u128::MAX);
    }

    #[test]
    fn test_safe_ops() {
        assert_eq!(safe_add(1, 2).unwrap(), 3);
        assert_eq!(safe_add(u64::MAX, 1), Err(LoopVaultError::Overflow));
        assert_eq!(safe_sub(3, 2).unwrap(), 1);
        assert_eq!(safe_sub(2, 3), Err(LoopVaultError::Underflow));
    }
}
