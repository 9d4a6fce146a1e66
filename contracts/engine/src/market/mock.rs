//! Deterministic lending-market model for tests and simulation.
//!
//! Models a correlated asset pair priced 1:1 in the base currency, with
//! the market's own solvency rules on `borrow` and `withdraw`, per-verb
//! failure injection, and drift knobs (`accrue_interest`,
//! `shift_collateral_value`) to push a position out of its band the way
//! live prices and interest do.

use loopvault_common::constants::precision::BPS;
use loopvault_common::{
    bps_of, health_factor, AccountPosition, AssetKind, ExternalVerb, LoopVaultError,
    LoopVaultResult, RateMode,
};

use super::LendingMarket;

/// Per-verb call counters, for asserting loop bounds in tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub supply: u32,
    pub borrow: u32,
    pub repay: u32,
    pub withdraw: u32,
}

/// In-memory stand-in for the external lending market
#[derive(Debug, Clone)]
pub struct MockLendingMarket {
    collateral_value: u64,
    debt_value: u64,
    liquidation_threshold_bps: u64,
    liquidation_ltv_bps: u64,
    /// Armed failure: the (n+1)th call of the verb fails
    fail_plan: Option<(ExternalVerb, u32)>,
    calls: CallCounts,
}

impl MockLendingMarket {
    /// Create an empty market account.
    ///
    /// `liquidation_threshold_bps` is the risk weighting used in the
    /// health factor; `liquidation_ltv_bps` is the borrowing-power bound.
    /// The threshold is always at least the LTV on real markets.
    pub fn new(liquidation_threshold_bps: u64, liquidation_ltv_bps: u64) -> Self {
        Self {
            collateral_value: 0,
            debt_value: 0,
            liquidation_threshold_bps,
            liquidation_ltv_bps,
            fail_plan: None,
            calls: CallCounts::default(),
        }
    }

    /// Seed an existing position without going through the verbs.
    pub fn seed_position(&mut self, collateral_value: u64, debt_value: u64) {
        self.collateral_value = collateral_value;
        self.debt_value = debt_value;
    }

    /// Arm a failure: the (n+1)th call of `verb` from now fails.
    pub fn fail_after(&mut self, verb: ExternalVerb, calls: u32) {
        self.fail_plan = Some((verb, calls));
    }

    /// Disarm any pending injected failure.
    pub fn clear_failures(&mut self) {
        self.fail_plan = None;
    }

    /// Simulate interest accrual: debt grows by `bps` basis points.
    pub fn accrue_interest(&mut self, bps: u64) {
        let growth = bps_of(self.debt_value, bps).unwrap_or(0);
        self.debt_value = self.debt_value.saturating_add(growth);
    }

    /// Simulate a collateral price move: value scales to `bps` of itself
    /// (7_500 = -25%, 11_000 = +10%).
    pub fn shift_collateral_value(&mut self, bps: u64) {
        self.collateral_value = bps_of(self.collateral_value, bps).unwrap_or(u64::MAX);
    }

    /// Raw collateral value, for test assertions.
    pub fn collateral_value(&self) -> u64 {
        self.collateral_value
    }

    /// Raw debt value, for test assertions.
    pub fn debt_value(&self) -> u64 {
        self.debt_value
    }

    /// Per-verb call counters since construction (or last restore).
    pub fn calls(&self) -> CallCounts {
        self.calls
    }

    fn trip_failure(&mut self, verb: ExternalVerb) -> LoopVaultResult<()> {
        if let Some((armed, remaining)) = self.fail_plan {
            if armed == verb {
                if remaining == 0 {
                    self.fail_plan = None;
                    return Err(LoopVaultError::ExternalMarketFailure {
                        verb,
                        detail: "injected failure",
                    });
                }
                self.fail_plan = Some((armed, remaining - 1));
            }
        }
        Ok(())
    }

    fn solvent(&self, collateral_value: u64, debt_value: u64) -> bool {
        // On the boundary counts as solvent: hf >= 1.0
        (debt_value as u128) * (BPS as u128)
            <= (collateral_value as u128) * (self.liquidation_threshold_bps as u128)
    }
}

impl LendingMarket for MockLendingMarket {
    type Snapshot = MockLendingMarket;

    fn supply(&mut self, _asset: AssetKind, amount: u64) -> LoopVaultResult<()> {
        self.trip_failure(ExternalVerb::Supply)?;
        self.calls.supply += 1;
        if amount == 0 {
            return Err(LoopVaultError::ExternalMarketFailure {
                verb: ExternalVerb::Supply,
                detail: "zero amount",
            });
        }
        self.collateral_value = self.collateral_value.checked_add(amount).ok_or(
            LoopVaultError::ExternalMarketFailure {
                verb: ExternalVerb::Supply,
                detail: "collateral overflow",
            },
        )?;
        Ok(())
    }

    fn borrow(
        &mut self,
        _asset: AssetKind,
        amount: u64,
        _rate_mode: RateMode,
    ) -> LoopVaultResult<()> {
        self.trip_failure(ExternalVerb::Borrow)?;
        self.calls.borrow += 1;
        if amount == 0 {
            return Err(LoopVaultError::ExternalMarketFailure {
                verb: ExternalVerb::Borrow,
                detail: "zero amount",
            });
        }
        let new_debt = self.debt_value.checked_add(amount).ok_or(
            LoopVaultError::ExternalMarketFailure {
                verb: ExternalVerb::Borrow,
                detail: "debt overflow",
            },
        )?;
        let borrowing_power = bps_of(self.collateral_value, self.liquidation_ltv_bps)?;
        if new_debt > borrowing_power {
            return Err(LoopVaultError::ExternalMarketFailure {
                verb: ExternalVerb::Borrow,
                detail: "exceeds borrowing power",
            });
        }
        self.debt_value = new_debt;
        Ok(())
    }

    fn repay(
        &mut self,
        _asset: AssetKind,
        amount: u64,
        _rate_mode: RateMode,
    ) -> LoopVaultResult<()> {
        self.trip_failure(ExternalVerb::Repay)?;
        self.calls.repay += 1;
        if amount == 0 {
            return Err(LoopVaultError::ExternalMarketFailure {
                verb: ExternalVerb::Repay,
                detail: "zero amount",
            });
        }
        // Capped at outstanding debt
        self.debt_value = self.debt_value.saturating_sub(amount);
        Ok(())
    }

    fn withdraw(&mut self, _asset: AssetKind, amount: u64) -> LoopVaultResult<()> {
        self.trip_failure(ExternalVerb::Withdraw)?;
        self.calls.withdraw += 1;
        if amount == 0 {
            return Err(LoopVaultError::ExternalMarketFailure {
                verb: ExternalVerb::Withdraw,
                detail: "zero amount",
            });
        }
        let new_collateral = self.collateral_value.checked_sub(amount).ok_or(
            LoopVaultError::ExternalMarketFailure {
                verb: ExternalVerb::Withdraw,
                detail: "insufficient collateral",
            },
        )?;
        if !self.solvent(new_collateral, self.debt_value) {
            return Err(LoopVaultError::ExternalMarketFailure {
                verb: ExternalVerb::Withdraw,
                detail: "would breach solvency",
            });
        }
        self.collateral_value = new_collateral;
        Ok(())
    }

    fn account_position(&self) -> LoopVaultResult<AccountPosition> {
        Ok(AccountPosition {
            collateral_value: self.collateral_value,
            debt_value: self.debt_value,
            health_factor: health_factor(
                self.collateral_value,
                self.debt_value,
                self.liquidation_threshold_bps,
            )?,
        })
    }

    fn liquidation_ltv_bps(&self) -> u64 {
        self.liquidation_ltv_bps
    }

    fn snapshot(&self) -> Self::Snapshot {
        self.clone()
    }

    fn restore(&mut self, snapshot: Self::Snapshot) {
        *self = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopvault_common::constants::token::ONE;

    const THRESHOLD_BPS: u64 = 8_000;
    const LIQ_LTV_BPS: u64 = 7_000;

    fn market() -> MockLendingMarket {
        MockLendingMarket::new(THRESHOLD_BPS, LIQ_LTV_BPS)
    }

    #[test]
    fn test_supply_and_position() {
        let mut m = market();
        m.supply(AssetKind::Base, 100 * ONE).unwrap();

        let position = m.account_position().unwrap();
        assert_eq!(position.collateral_value, 100 * ONE);
        assert_eq!(position.debt_value, 0);
        assert_eq!(position.health_factor, u128::MAX);
    }

    #[test]
    fn test_borrow_respects_borrowing_power() {
        let mut m = market();
        m.supply(AssetKind::Base, 100 * ONE).unwrap();

        // 70% LTV: 70 units is the limit
        m.borrow(AssetKind::Borrow, 70 * ONE, RateMode::Variable)
            .unwrap();
        let err = m
            .borrow(AssetKind::Borrow, 1, RateMode::Variable)
            .unwrap_err();
        assert!(matches!(
            err,
            LoopVaultError::ExternalMarketFailure {
                verb: ExternalVerb::Borrow,
                ..
            }
        ));
    }

    #[test]
    fn test_withdraw_respects_solvency() {
        let mut m = market();
        m.supply(AssetKind::Base, 100 * ONE).unwrap();
        m.borrow(AssetKind::Borrow, 60 * ONE, RateMode::Variable)
            .unwrap();

        // Debt 60 needs at least 75 collateral at an 80% threshold
        assert!(m.withdraw(AssetKind::Base, 25 * ONE).is_ok());
        let err = m.withdraw(AssetKind::Base, 1 * ONE).unwrap_err();
        assert!(matches!(
            err,
            LoopVaultError::ExternalMarketFailure {
                verb: ExternalVerb::Withdraw,
                ..
            }
        ));
    }

    #[test]
    fn test_repay_caps_at_outstanding_debt() {
        let mut m = market();
        m.supply(AssetKind::Base, 100 * ONE).unwrap();
        m.borrow(AssetKind::Borrow, 50 * ONE, RateMode::Variable)
            .unwrap();

        m.repay(AssetKind::Borrow, 80 * ONE, RateMode::Variable)
            .unwrap();
        assert_eq!(m.debt_value(), 0);
    }

    #[test]
    fn test_failure_injection() {
        let mut m = market();
        m.fail_after(ExternalVerb::Supply, 1);

        m.supply(AssetKind::Base, ONE).unwrap();
        let err = m.supply(AssetKind::Base, ONE).unwrap_err();
        assert!(matches!(
            err,
            LoopVaultError::ExternalMarketFailure {
                verb: ExternalVerb::Supply,
                detail: "injected failure",
            }
        ));

        // One-shot: the plan disarms after tripping
        m.supply(AssetKind::Base, ONE).unwrap();
    }

    #[test]
    fn test_snapshot_restore() {
        let mut m = market();
        m.supply(AssetKind::Base, 100 * ONE).unwrap();

        let snapshot = m.snapshot();
        m.borrow(AssetKind::Borrow, 50 * ONE, RateMode::Variable)
            .unwrap();
        assert_eq!(m.debt_value(), 50 * ONE);

        m.restore(snapshot);
        assert_eq!(m.debt_value(), 0);
        assert_eq!(m.collateral_value(), 100 * ONE);
    }

    #[test]
    fn test_drift_knobs() {
        let mut m = market();
        m.seed_position(200 * ONE, 100 * ONE);

        m.accrue_interest(500); // +5%
        assert_eq!(m.debt_value(), 105 * ONE);

        m.shift_collateral_value(7_500); // -25%
        assert_eq!(m.collateral_value(), 150 * ONE);
    }
}
