//! Validation Helpers for LoopVault
//!
//! The `check!` macro plus the parameter validators shared by the vault
//! facade. Every owner update goes through [`validate_parameters`] so the
//! threshold ordering can never be broken piecemeal.

use crate::constants::{looping, ltv, precision, ratios};
use crate::errors::{LoopVaultError, LoopVaultResult};
use crate::types::VaultParameters;

/// Check a condition and return an error if it fails.
///
/// # Examples
///
/// ```rust,ignore
/// use loopvault_common::check;
///
/// check!(amount > 0, LoopVaultError::InvalidAmount {
///     amount: 0,
///     reason: AmountErrorReason::Zero,
/// });
/// ```
#[macro_export]
macro_rules! check {
    ($condition:expr, $error:expr) => {
        if !($condition) {
            return Err($error);
        }
    };
}

/// Validate a full parameter set.
///
/// Enforced on every update, never on a single field in isolation:
/// - the three health-factor thresholds are strictly ordered and inside
///   the sane absolute range
/// - the target LTV leaves the required margin below the lending market's
///   own liquidation LTV
/// - the deleverage fallback is a usable fraction
/// - the loop cap is positive and bounded
pub fn validate_parameters(
    params: &VaultParameters,
    market_liquidation_ltv_bps: u64,
) -> LoopVaultResult<()> {
    check!(
        params.min_health_factor < params.target_health_factor
            && params.target_health_factor < params.max_health_factor,
        LoopVaultError::InvalidParameter {
            param: "health_factors",
            reason: "thresholds must satisfy min < target < max",
        }
    );
    check!(
        params.min_health_factor >= ratios::HF_ABS_MIN,
        LoopVaultError::InvalidParameter {
            param: "min_health_factor",
            reason: "below the admissible range",
        }
    );
    check!(
        params.max_health_factor <= ratios::HF_ABS_MAX,
        LoopVaultError::InvalidParameter {
            param: "max_health_factor",
            reason: "above the admissible range",
        }
    );
    check!(
        params.target_ltv_bps <= precision::BPS,
        LoopVaultError::InvalidParameter {
            param: "target_ltv_bps",
            reason: "cannot exceed 100%",
        }
    );
    check!(
        params.target_ltv_bps + ltv::LIQUIDATION_MARGIN_BPS <= market_liquidation_ltv_bps,
        LoopVaultError::InvalidParameter {
            param: "target_ltv_bps",
            reason: "too close to the market liquidation LTV",
        }
    );
    check!(
        params.deleverage_fallback_bps > 0 && params.deleverage_fallback_bps <= precision::BPS,
        LoopVaultError::InvalidParameter {
            param: "deleverage_fallback_bps",
            reason: "must be in (0, 10000]",
        }
    );
    check!(
        params.max_loop_iterations >= 1
            && params.max_loop_iterations <= looping::MAX_LOOP_ITERATIONS_CEILING,
        LoopVaultError::InvalidParameter {
            param: "max_loop_iterations",
            reason: "must be in [1, ceiling]",
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKET_LIQ_LTV_BPS: u64 = 8_000;

    #[test]
    fn test_default_parameters_valid() {
        let params = VaultParameters::default();
        assert!(validate_parameters(&params, MARKET_LIQ_LTV_BPS).is_ok());
    }

    #[test]
    fn test_ordering_violation_rejected() {
        // min raised above target: a piecemeal update that would invert
        // the band
        let params = VaultParameters {
            min_health_factor: 1_400_000_000_000_000_000,
            target_health_factor: 1_300_000_000_000_000_000,
            ..VaultParameters::default()
        };
        let err = validate_parameters(&params, MARKET_LIQ_LTV_BPS).unwrap_err();
        assert!(matches!(
            err,
            LoopVaultError::InvalidParameter {
                param: "health_factors",
                ..
            }
        ));
    }

    #[test]
    fn test_absolute_range_enforced() {
        let too_low = VaultParameters {
            min_health_factor: 1_000_000_000_000_000_000, // 1.0, below 1.05
            ..VaultParameters::default()
        };
        assert!(validate_parameters(&too_low, MARKET_LIQ_LTV_BPS).is_err());

        let too_high = VaultParameters {
            max_health_factor: 4_000_000_000_000_000_000, // 4.0, above 3.0
            ..VaultParameters::default()
        };
        assert!(validate_parameters(&too_high, MARKET_LIQ_LTV_BPS).is_err());
    }

    #[test]
    fn test_ltv_margin_enforced() {
        // 78% target against an 80% liquidation LTV leaves less than the
        // required 5% margin
        let params = VaultParameters {
            target_ltv_bps: 7_800,
            ..VaultParameters::default()
        };
        assert!(validate_parameters(&params, MARKET_LIQ_LTV_BPS).is_err());

        // 75% is exactly on the margin and passes
        let params = VaultParameters {
            target_ltv_bps: 7_500,
            ..VaultParameters::default()
        };
        assert!(validate_parameters(&params, MARKET_LIQ_LTV_BPS).is_ok());
    }

    #[test]
    fn test_fallback_and_loop_cap_bounds() {
        let zero_fallback = VaultParameters {
            deleverage_fallback_bps: 0,
            ..VaultParameters::default()
        };
        assert!(validate_parameters(&zero_fallback, MARKET_LIQ_LTV_BPS).is_err());

        let zero_iterations = VaultParameters {
            max_loop_iterations: 0,
            ..VaultParameters::default()
        };
        assert!(validate_parameters(&zero_iterations, MARKET_LIQ_LTV_BPS).is_err());

        let oversized = VaultParameters {
            max_loop_iterations: looping::MAX_LOOP_ITERATIONS_CEILING + 1,
            ..VaultParameters::default()
        };
        assert!(validate_parameters(&oversized, MARKET_LIQ_LTV_BPS).is_err());
    }
}
