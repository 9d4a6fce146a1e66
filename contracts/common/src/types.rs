//! Core Types for LoopVault
//!
//! The position snapshot returned by the lending market, the owner-mutable
//! vault parameters, and the small enums shared across the engine.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::{limits, looping, ltv, ratios};

/// Account address (pubkey hash)
pub type Address = [u8; 32];

/// The two legs of the looped pair
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum AssetKind {
    /// The asset depositors contribute
    Base,
    /// The correlated asset borrowed and re-supplied during looping
    Borrow,
}

/// Interest rate mode requested when borrowing or repaying
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum RateMode {
    /// Fixed-rate debt
    Stable,
    /// Floating-rate debt
    Variable,
}

/// The vault's aggregate state at the external lending market.
///
/// Always queried fresh before and after every state-changing call, never
/// cached: prices and accrued interest move between transactions, and the
/// engine's invariant checks must run against ground truth.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct AccountPosition {
    /// Aggregate collateral in base-currency units
    pub collateral_value: u64,
    /// Aggregate debt in base-currency units
    pub debt_value: u64,
    /// WAD-scaled solvency ratio; `u128::MAX` when debt is zero
    pub health_factor: u128,
}

impl AccountPosition {
    /// Net asset value backing the shares: collateral minus debt, floored
    /// at zero
    pub fn net_assets(&self) -> u64 {
        self.collateral_value.saturating_sub(self.debt_value)
    }
}

/// Direction a rebalance moved the position
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum RebalanceKind {
    /// Debt was repaid to raise the health factor
    Deleverage,
    /// Debt was added to lower the health factor toward the band
    Releverage,
}

/// Owner-mutable vault configuration.
///
/// Passed by reference into each controller call; the facade is the only
/// writer and validates every update before applying it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct VaultParameters {
    /// Health factor the rebalancer steers toward (WAD)
    pub target_health_factor: u128,
    /// Floor every state-changing operation must preserve (WAD)
    pub min_health_factor: u128,
    /// Ceiling above which the position is under-leveraged (WAD)
    pub max_health_factor: u128,
    /// Leverage target: borrow up to this fraction of collateral (bps)
    pub target_ltv_bps: u64,
    /// Minimum-granularity repay when the deleverage slice rounds to zero
    /// (bps of remaining debt)
    pub deleverage_fallback_bps: u64,
    /// Borrow/re-supply cycles allowed per deposit
    pub max_loop_iterations: u32,
    /// Cap on total managed assets
    pub max_total_assets: u64,
    /// When set, deposits and mints are rejected; exits stay open
    pub paused: bool,
}

impl Default for VaultParameters {
    fn default() -> Self {
        Self {
            target_health_factor: ratios::DEFAULT_TARGET_HEALTH_FACTOR,
            min_health_factor: ratios::DEFAULT_MIN_HEALTH_FACTOR,
            max_health_factor: ratios::DEFAULT_MAX_HEALTH_FACTOR,
            target_ltv_bps: ltv::DEFAULT_TARGET_LTV_BPS,
            deleverage_fallback_bps: looping::DEFAULT_DELEVERAGE_FALLBACK_BPS,
            max_loop_iterations: looping::DEFAULT_MAX_LOOP_ITERATIONS,
            max_total_assets: limits::DEFAULT_MAX_TOTAL_ASSETS,
            paused: false,
        }
    }
}

impl VaultParameters {
    /// Validate threshold ordering, absolute ranges and the LTV margin
    /// against the lending market's liquidation LTV.
    pub fn validate(&self, market_liquidation_ltv_bps: u64) -> crate::LoopVaultResult<()> {
        crate::validation::validate_parameters(self, market_liquidation_ltv_bps)
    }
}

/// Classification of the position relative to the configured band
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum HealthBand {
    /// No collateral and no debt
    Empty,
    /// Inside `[min_health_factor, max_health_factor]`, or debt-free
    Healthy,
    /// Below the floor; a deleverage would act
    BelowMinimum,
    /// Above the ceiling with debt outstanding; a re-leverage would act
    AboveMaximum,
}

impl HealthBand {
    /// Classify a live position against the configured thresholds.
    ///
    /// Mirrors the rebalancer's branch selection: a debt-free position is
    /// `Healthy` no matter how high its health factor reads, because
    /// there is nothing to re-leverage against.
    pub fn classify(position: &AccountPosition, params: &VaultParameters) -> Self {
        if position.collateral_value == 0 && position.debt_value == 0 {
            Self::Empty
        } else if position.debt_value == 0 {
            Self::Healthy
        } else if position.health_factor < params.min_health_factor {
            Self::BelowMinimum
        } else if position.health_factor > params.max_health_factor {
            Self::AboveMaximum
        } else {
            Self::Healthy
        }
    }
}

/// Read-only health summary for keepers deciding whether `rebalance()`
/// would act
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct HealthReport {
    pub band: HealthBand,
    pub position: AccountPosition,
    pub min_health_factor: u128,
    pub target_health_factor: u128,
    pub max_health_factor: u128,
}

impl HealthReport {
    pub fn new(position: AccountPosition, params: &VaultParameters) -> Self {
        Self {
            band: HealthBand::classify(&position, params),
            position,
            min_health_factor: params.min_health_factor,
            target_health_factor: params.target_health_factor,
            max_health_factor: params.max_health_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::token::ONE;

    fn position(collateral: u64, debt: u64, hf: u128) -> AccountPosition {
        AccountPosition {
            collateral_value: collateral,
            debt_value: debt,
            health_factor: hf,
        }
    }

    #[test]
    fn test_net_assets() {
        assert_eq!(position(230 * ONE, 130 * ONE, 0).net_assets(), 100 * ONE);
        // Underwater positions floor at zero
        assert_eq!(position(100 * ONE, 130 * ONE, 0).net_assets(), 0);
    }

    #[test]
    fn test_health_band_classification() {
        let params = VaultParameters::default();

        let empty = position(0, 0, u128::MAX);
        assert_eq!(HealthBand::classify(&empty, &params), HealthBand::Empty);

        // Debt-free with collateral: healthy, nothing to re-leverage
        let debt_free = position(100 * ONE, 0, u128::MAX);
        assert_eq!(HealthBand::classify(&debt_free, &params), HealthBand::Healthy);

        let below = position(150 * ONE, 130 * ONE, 1_000_000_000_000_000_000);
        assert_eq!(
            HealthBand::classify(&below, &params),
            HealthBand::BelowMinimum
        );

        let above = position(400 * ONE, 100 * ONE, 3_200_000_000_000_000_000);
        assert_eq!(
            HealthBand::classify(&above, &params),
            HealthBand::AboveMaximum
        );

        let healthy = position(230 * ONE, 130 * ONE, 1_415_000_000_000_000_000);
        assert_eq!(HealthBand::classify(&healthy, &params), HealthBand::Healthy);
    }

    #[test]
    fn test_default_parameters_are_ordered() {
        let params = VaultParameters::default();
        assert!(params.min_health_factor < params.target_health_factor);
        assert!(params.target_health_factor < params.max_health_factor);
    }
}
