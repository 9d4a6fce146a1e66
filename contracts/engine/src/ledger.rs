//! Share Ledger
//!
//! Ownership bookkeeping for the vault: holder balances, total shares
//! outstanding, spender allowances, and the share ↔ asset conversions.
//!
//! Rounding always favors existing holders over the actor performing the
//! current operation:
//!
//! | Operation        | Convert         | Rounding |
//! |------------------|-----------------|----------|
//! | deposit          | assets → shares | DOWN     |
//! | redeem           | shares → assets | DOWN     |
//! | mint             | shares → assets | UP       |
//! | withdraw         | assets → shares | UP       |
//!
//! The ledger never talks to the lending market; conversions take the
//! vault's current total assets as an argument.

use loopvault_common::{
    check, mul_div_down, mul_div_up, safe_add, safe_sub, Address, AmountErrorReason,
    LoopVaultError, LoopVaultResult,
};

use crate::BTreeMap;

/// Holder balances and total shares outstanding.
///
/// Invariant: the sum of all holder balances equals `total_shares` after
/// every operation. The vault facade is the only writer.
#[derive(Debug, Clone, Default)]
pub struct ShareLedger {
    shares: BTreeMap<Address, u64>,
    total_shares: u64,
    allowances: BTreeMap<(Address, Address), u64>,
}

impl ShareLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares held by `holder`
    pub fn balance_of(&self, holder: &Address) -> u64 {
        self.shares.get(holder).copied().unwrap_or(0)
    }

    /// Total shares outstanding
    pub fn total_shares(&self) -> u64 {
        self.total_shares
    }

    /// Remaining allowance of `spender` over `owner`'s shares
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Assets → shares, rounding DOWN (deposit path).
    ///
    /// The first depositor gets shares 1:1 with assets.
    pub fn convert_to_shares(&self, assets: u64, total_assets: u64) -> LoopVaultResult<u64> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        let shares = mul_div_down(
            assets as u128,
            self.total_shares as u128,
            total_assets as u128,
        )?;
        u64::try_from(shares).map_err(|_| LoopVaultError::Overflow)
    }

    /// Shares → assets, rounding DOWN (redeem path).
    pub fn convert_to_assets(&self, shares: u64, total_assets: u64) -> LoopVaultResult<u64> {
        if self.total_shares == 0 {
            return Ok(0);
        }
        let assets = mul_div_down(
            shares as u128,
            total_assets as u128,
            self.total_shares as u128,
        )?;
        u64::try_from(assets).map_err(|_| LoopVaultError::Overflow)
    }

    /// Assets a minter must contribute for `shares`, rounding UP.
    pub fn preview_mint(&self, shares: u64, total_assets: u64) -> LoopVaultResult<u64> {
        if self.total_shares == 0 {
            return Ok(shares);
        }
        let assets = mul_div_up(
            shares as u128,
            total_assets as u128,
            self.total_shares as u128,
        )?;
        u64::try_from(assets).map_err(|_| LoopVaultError::Overflow)
    }

    /// Shares burned to withdraw `assets`, rounding UP.
    pub fn preview_withdraw(&self, assets: u64, total_assets: u64) -> LoopVaultResult<u64> {
        if self.total_shares == 0 {
            return Ok(0);
        }
        let shares = mul_div_up(
            assets as u128,
            self.total_shares as u128,
            total_assets as u128,
        )?;
        u64::try_from(shares).map_err(|_| LoopVaultError::Overflow)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Credit `amount` shares to `receiver`.
    pub fn mint(&mut self, receiver: &Address, amount: u64) -> LoopVaultResult<()> {
        check!(
            amount > 0,
            LoopVaultError::InvalidAmount {
                amount,
                reason: AmountErrorReason::Zero,
            }
        );
        let new_total = safe_add(self.total_shares, amount)?;
        let balance = self.balance_of(receiver);
        self.shares.insert(*receiver, safe_add(balance, amount)?);
        self.total_shares = new_total;
        Ok(())
    }

    /// Destroy `amount` shares held by `owner`.
    pub fn burn(&mut self, owner: &Address, amount: u64) -> LoopVaultResult<()> {
        check!(
            amount > 0,
            LoopVaultError::InvalidAmount {
                amount,
                reason: AmountErrorReason::Zero,
            }
        );
        let balance = self.balance_of(owner);
        check!(
            balance >= amount,
            LoopVaultError::InsufficientShares {
                available: balance,
                requested: amount,
            }
        );
        let remaining = balance - amount;
        if remaining == 0 {
            self.shares.remove(owner);
        } else {
            self.shares.insert(*owner, remaining);
        }
        self.total_shares = safe_sub(self.total_shares, amount)?;
        Ok(())
    }

    /// Move `amount` shares between holders; total shares unchanged.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u64) -> LoopVaultResult<()> {
        check!(
            amount > 0,
            LoopVaultError::InvalidAmount {
                amount,
                reason: AmountErrorReason::Zero,
            }
        );
        let from_balance = self.balance_of(from);
        check!(
            from_balance >= amount,
            LoopVaultError::InsufficientShares {
                available: from_balance,
                requested: amount,
            }
        );
        if from == to {
            return Ok(());
        }
        let remaining = from_balance - amount;
        if remaining == 0 {
            self.shares.remove(from);
        } else {
            self.shares.insert(*from, remaining);
        }
        let to_balance = self.balance_of(to);
        self.shares.insert(*to, safe_add(to_balance, amount)?);
        Ok(())
    }

    /// Set the allowance of `spender` over `owner`'s shares.
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: u64) {
        if amount == 0 {
            self.allowances.remove(&(*owner, *spender));
        } else {
            self.allowances.insert((*owner, *spender), amount);
        }
    }

    /// Consume `amount` from the allowance of `spender` over `owner`.
    pub fn spend_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: u64,
    ) -> LoopVaultResult<()> {
        let available = self.allowance(owner, spender);
        check!(
            available >= amount,
            LoopVaultError::InsufficientAllowance {
                available,
                requested: amount,
            }
        );
        self.approve(owner, spender, available - amount);
        Ok(())
    }

    /// Sum of all holder balances, for invariant checks in tests.
    pub fn checked_supply(&self) -> u64 {
        self.shares.values().sum()
    }
}
