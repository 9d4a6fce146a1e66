//! Vault Facade
//!
//! The ERC-4626-style surface over the controllers: deposit, mint,
//! withdraw, redeem, the permissionless rebalance, and the owner-gated
//! emergency controls. Each mutating verb is a strict sequence:
//! validate, convert, mutate ledger, mutate position, assert invariant,
//! emit. Any failure at any step reverts the entire operation.
//!
//! Atomicity is provided by an explicit envelope: an operation-in-flight
//! guard, a ledger/parameter snapshot, and the market's own snapshot are
//! taken at entry; every error path restores all three before returning.
//! Events are emitted only after the envelope commits.

use borsh::{BorshDeserialize, BorshSerialize};
use loopvault_common::constants::looping::MAX_LOOP_ITERATIONS_CEILING;
use loopvault_common::constants::precision::BPS;
use loopvault_common::{
    check, mul_div_down, safe_add, AccountPosition, Address, AmountErrorReason, EventLog,
    HealthReport, LoopVaultError, LoopVaultEvent, LoopVaultResult, RebalanceKind, VaultParameters,
    Vec,
};
use serde::{Deserialize, Serialize};

use crate::ledger::ShareLedger;
use crate::leverage::run_leverage_loop;
use crate::market::LendingMarket;
use crate::rebalance::{run_full_deleverage, run_rebalance, FullDeleverageOutcome, RebalanceOutcome};
use crate::unwind::{run_unwind, UnwindOutcome};

/// Result of a deposit or mint
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct DepositReceipt {
    /// Base assets contributed
    pub assets: u64,
    /// Shares minted to the receiver
    pub shares: u64,
    /// Borrow/re-supply cycles the leverage loop executed
    pub iterations: u32,
    /// Final position after looping
    pub position: AccountPosition,
}

/// Result of a withdraw or redeem
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct WithdrawReceipt {
    /// Base assets paid out to the receiver
    pub assets: u64,
    /// Shares burned from the owner
    pub shares: u64,
    /// Debt repaid during the unwind
    pub debt_repaid: u64,
    /// Final position after unwinding
    pub position: AccountPosition,
}

/// The pooled-deposit leveraged vault.
///
/// Owns the share ledger, the owner-mutable parameters, and the event
/// log. All position state lives at the external lending market and is
/// re-queried fresh around every mutation.
#[derive(Debug)]
pub struct LeverageVault {
    owner: Address,
    params: VaultParameters,
    ledger: ShareLedger,
    /// Base assets held by the vault outside the market. Zero in normal
    /// operation; funded by an emergency deleverage and drained by
    /// subsequent withdrawals.
    idle_assets: u64,
    events: EventLog,
    op_in_flight: bool,
}

impl LeverageVault {
    /// Create a vault with default parameters.
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            params: VaultParameters::default(),
            ledger: ShareLedger::new(),
            idle_assets: 0,
            events: EventLog::new(),
            op_in_flight: false,
        }
    }

    /// Create a vault with explicit parameters, validated against the
    /// market's liquidation LTV.
    pub fn with_parameters(
        owner: Address,
        params: VaultParameters,
        market_liquidation_ltv_bps: u64,
    ) -> LoopVaultResult<Self> {
        params.validate(market_liquidation_ltv_bps)?;
        Ok(Self {
            owner,
            params,
            ledger: ShareLedger::new(),
            idle_assets: 0,
            events: EventLog::new(),
            op_in_flight: false,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn parameters(&self) -> &VaultParameters {
        &self.params
    }

    pub fn is_paused(&self) -> bool {
        self.params.paused
    }

    /// Base assets held outside the market (nonzero only after an
    /// emergency deleverage)
    pub fn idle_assets(&self) -> u64 {
        self.idle_assets
    }

    pub fn balance_of(&self, holder: &Address) -> u64 {
        self.ledger.balance_of(holder)
    }

    pub fn total_shares(&self) -> u64 {
        self.ledger.total_shares()
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.ledger.allowance(owner, spender)
    }

    /// Events emitted so far
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Drain the event log, handing ownership of the events to the caller
    pub fn take_events(&mut self) -> Vec<LoopVaultEvent> {
        core::mem::take(&mut self.events).into_events()
    }

    // ========================================================================
    // Read-only queries
    // ========================================================================

    /// Net asset value backing the shares: idle assets plus collateral
    /// minus debt, floored at zero.
    pub fn total_assets<M: LendingMarket>(&self, market: &M) -> LoopVaultResult<u64> {
        let position = market.account_position()?;
        safe_add(self.idle_assets, position.net_assets())
    }

    /// Fresh position snapshot from the market
    pub fn position_details<M: LendingMarket>(
        &self,
        market: &M,
    ) -> LoopVaultResult<AccountPosition> {
        market.account_position()
    }

    /// Band classification for keepers deciding whether `rebalance`
    /// would act
    pub fn health_report<M: LendingMarket>(&self, market: &M) -> LoopVaultResult<HealthReport> {
        let position = market.account_position()?;
        Ok(HealthReport::new(position, &self.params))
    }

    pub fn convert_to_shares<M: LendingMarket>(
        &self,
        market: &M,
        assets: u64,
    ) -> LoopVaultResult<u64> {
        let total_assets = self.total_assets(market)?;
        self.ledger.convert_to_shares(assets, total_assets)
    }

    pub fn convert_to_assets<M: LendingMarket>(
        &self,
        market: &M,
        shares: u64,
    ) -> LoopVaultResult<u64> {
        let total_assets = self.total_assets(market)?;
        self.ledger.convert_to_assets(shares, total_assets)
    }

    /// Shares a deposit of `assets` would mint
    pub fn preview_deposit<M: LendingMarket>(
        &self,
        market: &M,
        assets: u64,
    ) -> LoopVaultResult<u64> {
        self.convert_to_shares(market, assets)
    }

    /// Assets a mint of `shares` would cost (rounds against the minter)
    pub fn preview_mint<M: LendingMarket>(&self, market: &M, shares: u64) -> LoopVaultResult<u64> {
        let total_assets = self.total_assets(market)?;
        self.ledger.preview_mint(shares, total_assets)
    }

    /// Shares a withdrawal of `assets` would burn (rounds against the
    /// withdrawer)
    pub fn preview_withdraw<M: LendingMarket>(
        &self,
        market: &M,
        assets: u64,
    ) -> LoopVaultResult<u64> {
        let total_assets = self.total_assets(market)?;
        self.ledger.preview_withdraw(assets, total_assets)
    }

    /// Assets a redemption of `shares` would pay out
    pub fn preview_redeem<M: LendingMarket>(
        &self,
        market: &M,
        shares: u64,
    ) -> LoopVaultResult<u64> {
        self.convert_to_assets(market, shares)
    }

    /// Largest deposit currently accepted: zero while paused, the
    /// remaining headroom under the asset cap otherwise.
    pub fn max_deposit<M: LendingMarket>(&self, market: &M) -> LoopVaultResult<u64> {
        if self.params.paused {
            return Ok(0);
        }
        let total_assets = self.total_assets(market)?;
        Ok(self.params.max_total_assets.saturating_sub(total_assets))
    }

    /// Largest mint currently accepted
    pub fn max_mint<M: LendingMarket>(&self, market: &M) -> LoopVaultResult<u64> {
        let assets = self.max_deposit(market)?;
        self.convert_to_shares(market, assets)
    }

    /// Largest withdrawal `owner` can make without breaching the health
    /// floor. The last holder out is exempt from the floor and can drain
    /// the position completely.
    pub fn max_withdraw<M: LendingMarket>(
        &self,
        market: &M,
        owner: &Address,
    ) -> LoopVaultResult<u64> {
        let balance = self.ledger.balance_of(owner);
        if balance == 0 {
            return Ok(0);
        }
        let total_assets = self.total_assets(market)?;
        let redeemable = self.ledger.convert_to_assets(balance, total_assets)?;
        if balance == self.ledger.total_shares() {
            return Ok(redeemable);
        }

        // Idle assets can be paid out without touching the position
        let from_idle = self.idle_assets.min(redeemable);
        let position = market.account_position()?;
        let unwindable = hf_bounded_withdraw(
            &position,
            self.params.min_health_factor,
            redeemable - from_idle,
        )?;
        safe_add(from_idle, unwindable)
    }

    /// Largest redemption `owner` can make without breaching the health
    /// floor
    pub fn max_redeem<M: LendingMarket>(
        &self,
        market: &M,
        owner: &Address,
    ) -> LoopVaultResult<u64> {
        let balance = self.ledger.balance_of(owner);
        if balance == self.ledger.total_shares() {
            return Ok(balance);
        }
        let assets = self.max_withdraw(market, owner)?;
        let shares = self.convert_to_shares(market, assets)?;
        Ok(shares.min(balance))
    }

    // ========================================================================
    // Share surface
    // ========================================================================

    /// Transfer shares between holders.
    pub fn transfer_shares(
        &mut self,
        caller: Address,
        to: Address,
        amount: u64,
    ) -> LoopVaultResult<()> {
        self.ledger.transfer(&caller, &to, amount)?;
        self.events.emit(LoopVaultEvent::SharesTransferred {
            from: caller,
            to,
            amount,
        });
        Ok(())
    }

    /// Set the allowance of `spender` over the caller's shares.
    pub fn approve(&mut self, caller: Address, spender: Address, amount: u64) {
        self.ledger.approve(&caller, &spender, amount);
        self.events.emit(LoopVaultEvent::SharesApproved {
            owner: caller,
            spender,
            amount,
        });
    }

    // ========================================================================
    // Mutating verbs
    // ========================================================================

    /// Deposit `assets` and loop them into the position; mint shares to
    /// `receiver`.
    pub fn deposit<M: LendingMarket>(
        &mut self,
        market: &mut M,
        caller: Address,
        assets: u64,
        receiver: Address,
    ) -> LoopVaultResult<DepositReceipt> {
        let receipt = self.execute(market, |vault, market| {
            check!(!vault.params.paused, LoopVaultError::Paused);
            check!(
                assets > 0,
                LoopVaultError::InvalidAmount {
                    amount: 0,
                    reason: AmountErrorReason::Zero,
                }
            );
            let total_assets = vault.total_assets(market)?;
            let new_total = safe_add(total_assets, assets)?;
            check!(
                new_total <= vault.params.max_total_assets,
                LoopVaultError::ExceedsLimit {
                    limit: vault.params.max_total_assets,
                    requested: new_total,
                }
            );

            // Share price from the pre-mutation total
            let shares = vault.ledger.convert_to_shares(assets, total_assets)?;
            check!(
                shares > 0,
                LoopVaultError::InvalidAmount {
                    amount: assets,
                    reason: AmountErrorReason::TooSmall,
                }
            );
            vault.ledger.mint(&receiver, shares)?;

            let outcome = run_leverage_loop(market, &vault.params, assets)?;
            Ok(DepositReceipt {
                assets,
                shares,
                iterations: outcome.iterations,
                position: outcome.position,
            })
        })?;

        self.events.emit(LoopVaultEvent::DepositLooped {
            caller,
            receiver,
            assets: receipt.assets,
            shares: receipt.shares,
            iterations: receipt.iterations,
            collateral_value: receipt.position.collateral_value,
            debt_value: receipt.position.debt_value,
            health_factor: receipt.position.health_factor,
        });
        Ok(receipt)
    }

    /// Mint exactly `shares` to `receiver`, contributing whatever assets
    /// that costs at the current share price.
    pub fn mint<M: LendingMarket>(
        &mut self,
        market: &mut M,
        caller: Address,
        shares: u64,
        receiver: Address,
    ) -> LoopVaultResult<DepositReceipt> {
        let receipt = self.execute(market, |vault, market| {
            check!(!vault.params.paused, LoopVaultError::Paused);
            check!(
                shares > 0,
                LoopVaultError::InvalidAmount {
                    amount: 0,
                    reason: AmountErrorReason::Zero,
                }
            );
            let total_assets = vault.total_assets(market)?;
            let assets = vault.ledger.preview_mint(shares, total_assets)?;
            check!(
                assets > 0,
                LoopVaultError::InvalidAmount {
                    amount: shares,
                    reason: AmountErrorReason::TooSmall,
                }
            );
            let new_total = safe_add(total_assets, assets)?;
            check!(
                new_total <= vault.params.max_total_assets,
                LoopVaultError::ExceedsLimit {
                    limit: vault.params.max_total_assets,
                    requested: new_total,
                }
            );

            vault.ledger.mint(&receiver, shares)?;
            let outcome = run_leverage_loop(market, &vault.params, assets)?;
            Ok(DepositReceipt {
                assets,
                shares,
                iterations: outcome.iterations,
                position: outcome.position,
            })
        })?;

        self.events.emit(LoopVaultEvent::DepositLooped {
            caller,
            receiver,
            assets: receipt.assets,
            shares: receipt.shares,
            iterations: receipt.iterations,
            collateral_value: receipt.position.collateral_value,
            debt_value: receipt.position.debt_value,
            health_factor: receipt.position.health_factor,
        });
        Ok(receipt)
    }

    /// Withdraw exactly `assets` to `receiver`, burning the owner's
    /// shares and unwinding a proportional slice of the position.
    /// Withdrawals stay open while the vault is paused.
    pub fn withdraw<M: LendingMarket>(
        &mut self,
        market: &mut M,
        caller: Address,
        assets: u64,
        receiver: Address,
        owner: Address,
    ) -> LoopVaultResult<WithdrawReceipt> {
        let receipt = self.execute(market, |vault, market| {
            check!(
                assets > 0,
                LoopVaultError::InvalidAmount {
                    amount: 0,
                    reason: AmountErrorReason::Zero,
                }
            );
            let total_assets = vault.total_assets(market)?;
            let balance = vault.ledger.balance_of(&owner);
            let redeemable = vault.ledger.convert_to_assets(balance, total_assets)?;
            check!(
                assets <= redeemable,
                LoopVaultError::InsufficientBalance {
                    available: redeemable,
                    requested: assets,
                }
            );

            let shares = vault.ledger.preview_withdraw(assets, total_assets)?;
            if caller != owner {
                vault.ledger.spend_allowance(&owner, &caller, shares)?;
            }
            vault.ledger.burn(&owner, shares)?;

            let outcome = vault.pay_out(market, assets)?;
            Ok(WithdrawReceipt {
                assets,
                shares,
                debt_repaid: outcome.debt_repaid,
                position: outcome.position,
            })
        })?;

        self.events.emit(LoopVaultEvent::WithdrawUnwound {
            caller,
            receiver,
            owner,
            assets: receipt.assets,
            shares: receipt.shares,
            debt_repaid: receipt.debt_repaid,
            health_factor: receipt.position.health_factor,
        });
        Ok(receipt)
    }

    /// Redeem exactly `shares` from `owner`, paying out whatever assets
    /// they convert to. Redemptions stay open while the vault is paused.
    pub fn redeem<M: LendingMarket>(
        &mut self,
        market: &mut M,
        caller: Address,
        shares: u64,
        receiver: Address,
        owner: Address,
    ) -> LoopVaultResult<WithdrawReceipt> {
        let receipt = self.execute(market, |vault, market| {
            check!(
                shares > 0,
                LoopVaultError::InvalidAmount {
                    amount: 0,
                    reason: AmountErrorReason::Zero,
                }
            );
            let total_assets = vault.total_assets(market)?;
            let assets = vault.ledger.convert_to_assets(shares, total_assets)?;

            if caller != owner {
                vault.ledger.spend_allowance(&owner, &caller, shares)?;
            }
            vault.ledger.burn(&owner, shares)?;

            let outcome = if assets > 0 {
                vault.pay_out(market, assets)?
            } else {
                UnwindOutcome {
                    assets_withdrawn: 0,
                    debt_repaid: 0,
                    position: market.account_position()?,
                }
            };
            Ok(WithdrawReceipt {
                assets,
                shares,
                debt_repaid: outcome.debt_repaid,
                position: outcome.position,
            })
        })?;

        self.events.emit(LoopVaultEvent::WithdrawUnwound {
            caller,
            receiver,
            owner,
            assets: receipt.assets,
            shares: receipt.shares,
            debt_repaid: receipt.debt_repaid,
            health_factor: receipt.position.health_factor,
        });
        Ok(receipt)
    }

    /// Steer the position back into the health-factor band. Callable by
    /// any party: it only ever moves the position toward safety.
    pub fn rebalance<M: LendingMarket>(
        &mut self,
        market: &mut M,
    ) -> LoopVaultResult<RebalanceOutcome> {
        let outcome = self.execute(market, |vault, market| run_rebalance(market, &vault.params))?;

        match outcome {
            RebalanceOutcome::Deleveraged {
                health_factor_before,
                health_factor_after,
                debt_repaid,
                ..
            } => self.events.emit(LoopVaultEvent::Rebalanced {
                kind: RebalanceKind::Deleverage,
                health_factor_before,
                health_factor_after,
                debt_delta: debt_repaid,
            }),
            RebalanceOutcome::Releveraged {
                health_factor_before,
                health_factor_after,
                debt_added,
                ..
            } => self.events.emit(LoopVaultEvent::Rebalanced {
                kind: RebalanceKind::Releverage,
                health_factor_before,
                health_factor_after,
                debt_delta: debt_added,
            }),
            RebalanceOutcome::NoAction { .. } => {}
        }
        Ok(outcome)
    }

    // ========================================================================
    // Owner controls
    // ========================================================================

    /// Pause deposits and mints. Withdrawals stay open so holders are
    /// never locked out of exit liquidity.
    pub fn pause(&mut self, caller: Address) -> LoopVaultResult<()> {
        self.require_owner(&caller)?;
        self.params.paused = true;
        self.events.emit(LoopVaultEvent::VaultPaused { by: caller });
        Ok(())
    }

    /// Resume deposits and mints.
    pub fn unpause(&mut self, caller: Address) -> LoopVaultResult<()> {
        self.require_owner(&caller)?;
        self.params.paused = false;
        self.events.emit(LoopVaultEvent::VaultUnpaused { by: caller });
        Ok(())
    }

    /// Repay all debt, withdraw all collateral into the vault's idle
    /// balance, and force-pause. Crisis response for when normal
    /// rebalancing cannot keep pace with the market.
    pub fn emergency_deleverage<M: LendingMarket>(
        &mut self,
        market: &mut M,
        caller: Address,
    ) -> LoopVaultResult<FullDeleverageOutcome> {
        self.require_owner(&caller)?;
        let outcome = self.execute(market, |vault, market| {
            let outcome = run_full_deleverage(market)?;
            vault.idle_assets = safe_add(vault.idle_assets, outcome.collateral_withdrawn)?;
            vault.params.paused = true;
            Ok(outcome)
        })?;

        self.events.emit(LoopVaultEvent::EmergencyDeleveraged {
            caller,
            debt_repaid: outcome.debt_repaid,
            collateral_withdrawn: outcome.collateral_withdrawn,
        });
        Ok(outcome)
    }

    /// Update the health-factor band and leverage target, validated as a
    /// whole against the market's liquidation LTV.
    pub fn set_parameters<M: LendingMarket>(
        &mut self,
        market: &M,
        caller: Address,
        target_health_factor: u128,
        min_health_factor: u128,
        max_health_factor: u128,
        target_ltv_bps: u64,
    ) -> LoopVaultResult<()> {
        self.require_owner(&caller)?;
        let candidate = VaultParameters {
            target_health_factor,
            min_health_factor,
            max_health_factor,
            target_ltv_bps,
            ..self.params
        };
        candidate.validate(market.liquidation_ltv_bps())?;
        self.params = candidate;
        self.events.emit(LoopVaultEvent::ParametersUpdated {
            target_health_factor,
            min_health_factor,
            max_health_factor,
            target_ltv_bps,
        });
        Ok(())
    }

    /// Update the leverage-loop iteration cap.
    pub fn set_max_loop_iterations(&mut self, caller: Address, n: u32) -> LoopVaultResult<()> {
        self.require_owner(&caller)?;
        check!(
            n >= 1 && n <= MAX_LOOP_ITERATIONS_CEILING,
            LoopVaultError::InvalidParameter {
                param: "max_loop_iterations",
                reason: "must be in [1, ceiling]",
            }
        );
        self.params.max_loop_iterations = n;
        self.events.emit(LoopVaultEvent::LoopCapUpdated {
            max_loop_iterations: n,
        });
        Ok(())
    }

    /// Update the cap on total managed assets.
    pub fn set_max_total_assets(&mut self, caller: Address, cap: u64) -> LoopVaultResult<()> {
        self.require_owner(&caller)?;
        self.params.max_total_assets = cap;
        self.events.emit(LoopVaultEvent::AssetCapUpdated {
            max_total_assets: cap,
        });
        Ok(())
    }

    /// Update the deleverage minimum-granularity fraction.
    pub fn set_deleverage_fallback(&mut self, caller: Address, bps: u64) -> LoopVaultResult<()> {
        self.require_owner(&caller)?;
        check!(
            bps > 0 && bps <= BPS,
            LoopVaultError::InvalidParameter {
                param: "deleverage_fallback_bps",
                reason: "must be in (0, 10000]",
            }
        );
        self.params.deleverage_fallback_bps = bps;
        self.events
            .emit(LoopVaultEvent::DeleverageFallbackUpdated { fallback_bps: bps });
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn require_owner(&self, caller: &Address) -> LoopVaultResult<()> {
        check!(
            *caller == self.owner,
            LoopVaultError::Unauthorized {
                expected: self.owner,
                actual: *caller,
            }
        );
        Ok(())
    }

    /// Pay out `assets`: idle balance first, the rest unwound from the
    /// position. Idle payouts leave the position untouched, so the
    /// health floor can only bind on the unwound remainder.
    ///
    /// When no shares remain outstanding the proportional formula cannot
    /// serve the exit: it leaves residual debt at a degraded LTV the
    /// market would refuse to release. The final holder's payout
    /// clears the whole position instead; rounding dust stays idle.
    fn pay_out<M: LendingMarket>(
        &mut self,
        market: &mut M,
        assets: u64,
    ) -> LoopVaultResult<UnwindOutcome> {
        if self.ledger.total_shares() == 0 {
            let cleared = run_full_deleverage(market)?;
            self.idle_assets = safe_add(self.idle_assets, cleared.collateral_withdrawn)?;
            check!(
                self.idle_assets >= assets,
                LoopVaultError::InsufficientBalance {
                    available: self.idle_assets,
                    requested: assets,
                }
            );
            self.idle_assets -= assets;
            return Ok(UnwindOutcome {
                assets_withdrawn: assets,
                debt_repaid: cleared.debt_repaid,
                position: market.account_position()?,
            });
        }

        let from_idle = self.idle_assets.min(assets);
        let from_market = assets - from_idle;

        let outcome = if from_market > 0 {
            run_unwind(market, &self.params, from_market, true)?
        } else {
            UnwindOutcome {
                assets_withdrawn: 0,
                debt_repaid: 0,
                position: market.account_position()?,
            }
        };
        self.idle_assets -= from_idle;
        Ok(outcome)
    }

    /// Atomic envelope around a mutating operation: reentrancy guard,
    /// snapshot of ledger + parameters + idle balance + market state,
    /// full restore on any error.
    fn execute<M, T, F>(&mut self, market: &mut M, op: F) -> LoopVaultResult<T>
    where
        M: LendingMarket,
        F: FnOnce(&mut Self, &mut M) -> LoopVaultResult<T>,
    {
        check!(!self.op_in_flight, LoopVaultError::OperationInFlight);
        self.op_in_flight = true;

        let ledger_before = self.ledger.clone();
        let params_before = self.params;
        let idle_before = self.idle_assets;
        let market_before = market.snapshot();

        let result = op(self, market);
        if result.is_err() {
            self.ledger = ledger_before;
            self.params = params_before;
            self.idle_assets = idle_before;
            market.restore(market_before);
        }
        self.op_in_flight = false;
        result
    }
}

/// Largest unwindable withdrawal that keeps the health factor at or
/// above `min_health_factor`, found by binary search over the closed
/// form: withdrawing `a` scales the health factor by
/// `1 - (debt * a) / (collateral * (collateral - a))`.
fn hf_bounded_withdraw(
    position: &AccountPosition,
    min_health_factor: u128,
    cap: u64,
) -> LoopVaultResult<u64> {
    if position.debt_value == 0 {
        return Ok(cap);
    }
    if position.health_factor <= min_health_factor {
        return Ok(0);
    }

    let mut lo = 0u64;
    let mut hi = cap;
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if withdraw_keeps_floor(position, min_health_factor, mid)? {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(lo)
}

/// Predicate for the search: `d*a*hf <= c*(c-a)*(hf-min)`, evaluated as
/// `(d*a/c)*hf <= (c-a)*(hf-min)` so the products stay inside u128. A
/// right-side overflow means the headroom is astronomically large.
fn withdraw_keeps_floor(
    position: &AccountPosition,
    min_health_factor: u128,
    amount: u64,
) -> LoopVaultResult<bool> {
    let c = position.collateral_value as u128;
    let d = position.debt_value as u128;
    let hf = position.health_factor;
    let a = amount as u128;

    if a >= c {
        return Ok(false);
    }
    let q = mul_div_down(d, a, c)?;
    let lhs = match q.checked_mul(hf) {
        Some(v) => v,
        None => return Ok(false),
    };
    let rhs = match (c - a).checked_mul(hf - min_health_factor) {
        Some(v) => v,
        None => return Ok(true),
    };
    Ok(lhs <= rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockLendingMarket;
    use loopvault_common::constants::token::ONE;
    use loopvault_common::EventType;

    const OWNER: Address = [1u8; 32];
    const ALICE: Address = [2u8; 32];
    const BOB: Address = [3u8; 32];

    const THRESHOLD_BPS: u64 = 8_000;
    const LIQ_LTV_BPS: u64 = 8_000;

    fn market() -> MockLendingMarket {
        MockLendingMarket::new(THRESHOLD_BPS, LIQ_LTV_BPS)
    }

    #[test]
    fn test_with_parameters_validates() {
        let bad = VaultParameters {
            target_ltv_bps: 7_900,
            ..VaultParameters::default()
        };
        assert!(LeverageVault::with_parameters(OWNER, bad, LIQ_LTV_BPS).is_err());

        let good = VaultParameters::default();
        assert!(LeverageVault::with_parameters(OWNER, good, LIQ_LTV_BPS).is_ok());
    }

    #[test]
    fn test_owner_gating() {
        let mut vault = LeverageVault::new(OWNER);

        let err = vault.pause(ALICE).unwrap_err();
        assert!(matches!(err, LoopVaultError::Unauthorized { .. }));
        assert!(!vault.is_paused());

        vault.pause(OWNER).unwrap();
        assert!(vault.is_paused());
        vault.unpause(OWNER).unwrap();
        assert!(!vault.is_paused());
    }

    #[test]
    fn test_pause_gates_deposits_only() {
        let mut m = market();
        let mut vault = LeverageVault::new(OWNER);
        vault.deposit(&mut m, ALICE, 100 * ONE, ALICE).unwrap();

        vault.pause(OWNER).unwrap();
        let err = vault.deposit(&mut m, ALICE, 10 * ONE, ALICE).unwrap_err();
        assert_eq!(err, LoopVaultError::Paused);
        let err = vault.mint(&mut m, ALICE, 10 * ONE, ALICE).unwrap_err();
        assert_eq!(err, LoopVaultError::Paused);

        // Exit liquidity stays open
        vault
            .withdraw(&mut m, ALICE, 10 * ONE, ALICE, ALICE)
            .unwrap();
    }

    #[test]
    fn test_max_deposit_tracks_cap() {
        let mut m = market();
        let mut vault = LeverageVault::new(OWNER);
        vault.set_max_total_assets(OWNER, 150 * ONE).unwrap();

        assert_eq!(vault.max_deposit(&m).unwrap(), 150 * ONE);
        vault.deposit(&mut m, ALICE, 100 * ONE, ALICE).unwrap();
        let headroom = vault.max_deposit(&m).unwrap();
        // The loop only moves debt-financed collateral, so net assets
        // stay at the deposit and the headroom at the difference
        assert_eq!(headroom, 50 * ONE);

        let err = vault
            .deposit(&mut m, ALICE, headroom + 1, ALICE)
            .unwrap_err();
        assert!(matches!(err, LoopVaultError::ExceedsLimit { .. }));

        vault.pause(OWNER).unwrap();
        assert_eq!(vault.max_deposit(&m).unwrap(), 0);
    }

    #[test]
    fn test_share_surface_emits_events() {
        let mut m = market();
        let mut vault = LeverageVault::new(OWNER);
        vault.deposit(&mut m, ALICE, 100 * ONE, ALICE).unwrap();

        vault.transfer_shares(ALICE, BOB, 40 * ONE).unwrap();
        assert_eq!(vault.balance_of(&BOB), 40 * ONE);

        vault.approve(BOB, ALICE, 10 * ONE);
        assert_eq!(vault.allowance(&BOB, &ALICE), 10 * ONE);

        let log = vault.events();
        assert_eq!(log.filter_by_type(EventType::SharesTransferred).len(), 1);
        assert_eq!(log.filter_by_type(EventType::SharesApproved).len(), 1);
    }

    #[test]
    fn test_delegated_withdraw_spends_allowance() {
        let mut m = market();
        let mut vault = LeverageVault::new(OWNER);
        vault.deposit(&mut m, ALICE, 100 * ONE, ALICE).unwrap();

        // No allowance yet
        let err = vault
            .withdraw(&mut m, BOB, 10 * ONE, BOB, ALICE)
            .unwrap_err();
        assert!(matches!(err, LoopVaultError::InsufficientAllowance { .. }));

        vault.approve(ALICE, BOB, 50 * ONE);
        let receipt = vault.withdraw(&mut m, BOB, 10 * ONE, BOB, ALICE).unwrap();
        assert_eq!(
            vault.allowance(&ALICE, &BOB),
            50 * ONE - receipt.shares
        );
    }

    #[test]
    fn test_reentrancy_guard_blocks_nested_entry() {
        // Drive the guard directly: a market whose callback re-enters
        // would observe op_in_flight and fail. Simulate by checking the
        // flag is held across the envelope via a failing op.
        let mut m = market();
        let mut vault = LeverageVault::new(OWNER);

        let result: LoopVaultResult<()> = vault.execute(&mut m, |vault, market| {
            // Nested mutation attempt from within an operation
            let err = vault.deposit(market, ALICE, ONE, ALICE).unwrap_err();
            assert_eq!(err, LoopVaultError::OperationInFlight);
            Ok(())
        });
        result.unwrap();

        // Guard released afterwards
        vault.deposit(&mut m, ALICE, ONE, ALICE).unwrap();
    }

    #[test]
    fn test_hf_bounded_withdraw_sanity() {
        // 230/130 at hf ~1.415 with a 1.15 floor: some headroom, but not
        // the whole net value
        let position = AccountPosition {
            collateral_value: 230 * ONE,
            debt_value: 130 * ONE,
            health_factor: 1_415_384_615_384_615_384,
        };
        let min = 1_150_000_000_000_000_000;

        let bound = hf_bounded_withdraw(&position, min, 100 * ONE).unwrap();
        assert!(bound > 0);
        assert!(bound < 100 * ONE);
        assert!(withdraw_keeps_floor(&position, min, bound).unwrap());
        assert!(!withdraw_keeps_floor(&position, min, bound + 1).unwrap());

        // Below the floor already: nothing is withdrawable
        let sunk = AccountPosition {
            health_factor: 1_100_000_000_000_000_000,
            ..position
        };
        assert_eq!(hf_bounded_withdraw(&sunk, min, 100 * ONE).unwrap(), 0);

        // Debt-free: the cap itself
        let clean = AccountPosition {
            collateral_value: 100 * ONE,
            debt_value: 0,
            health_factor: u128::MAX,
        };
        assert_eq!(
            hf_bounded_withdraw(&clean, min, 70 * ONE).unwrap(),
            70 * ONE
        );
    }
}
