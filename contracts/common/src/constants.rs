//! Protocol Constants
//!
//! All magic numbers and default configuration values for LoopVault.
//! Health-factor thresholds follow the convention of the external lending
//! market: a WAD-scaled ratio where 1e18 means the position sits exactly
//! on the liquidation boundary.

/// Share token metadata
pub mod token {
    /// Share token name
    pub const NAME: &str = "LoopVault Share";
    /// Share token symbol
    pub const SYMBOL: &str = "lvSHARE";
    /// Decimal places (matches the base asset)
    pub const DECIMALS: u8 = 8;
    /// One unit with decimals (1 asset unit = 100_000_000 base units)
    pub const ONE: u64 = 100_000_000;
}

/// Precision constants
pub mod precision {
    /// WAD fixed point: a ratio of 1.0 is represented as 1e18
    pub const WAD: u128 = 1_000_000_000_000_000_000;

    /// Basis points denominator (10_000 = 100%)
    pub const BPS: u64 = 10_000;
}

/// Health-factor thresholds (WAD-scaled ratios)
pub mod ratios {
    use super::precision::WAD;

    /// Default floor below which every state-changing operation must fail
    pub const DEFAULT_MIN_HEALTH_FACTOR: u128 = 1_150_000_000_000_000_000; // 1.15

    /// Default value the rebalancer steers toward
    pub const DEFAULT_TARGET_HEALTH_FACTOR: u128 = 1_300_000_000_000_000_000; // 1.30

    /// Default ceiling above which the position is considered under-leveraged
    pub const DEFAULT_MAX_HEALTH_FACTOR: u128 = 1_500_000_000_000_000_000; // 1.50

    /// Lowest admissible value for any of the three thresholds
    pub const HF_ABS_MIN: u128 = 1_050_000_000_000_000_000; // 1.05

    /// Highest admissible value for any of the three thresholds
    pub const HF_ABS_MAX: u128 = 3 * WAD; // 3.00
}

/// Loan-to-value configuration (basis points)
pub mod ltv {
    /// Default leverage target: borrow up to 60% of collateral value
    pub const DEFAULT_TARGET_LTV_BPS: u64 = 6_000;

    /// Required gap between the target LTV and the lending market's own
    /// liquidation LTV for the asset pair
    pub const LIQUIDATION_MARGIN_BPS: u64 = 500;
}

/// Leverage-loop and rebalance iteration bounds
pub mod looping {
    /// Default number of borrow/re-supply cycles per deposit
    pub const DEFAULT_MAX_LOOP_ITERATIONS: u32 = 4;

    /// Hard ceiling on the configurable loop cap
    pub const MAX_LOOP_ITERATIONS_CEILING: u32 = 16;

    /// Default minimum-granularity repay when the deleverage slice
    /// formula rounds to zero (10% of remaining debt)
    pub const DEFAULT_DELEVERAGE_FALLBACK_BPS: u64 = 1_000;

    /// Termination backstop for both rebalance branches. The deleverage
    /// slice converges on the target asymptotically, so the tail of the
    /// loop can take a few dozen shrinking steps before the fallback
    /// kicks in.
    pub const MAX_REBALANCE_STEPS: u32 = 128;
}

/// Vault size limits
pub mod limits {
    use super::token::ONE;

    /// Default cap on total managed assets (10M base-asset units)
    pub const DEFAULT_MAX_TOTAL_ASSETS: u64 = 10_000_000 * ONE;
}
