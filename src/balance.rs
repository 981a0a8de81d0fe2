/// ENFORCED BALANCE TYPE - Used by the Ledger and WithdrawalProcessor
///
/// This is the SINGLE source of truth for balance arithmetic.
/// ALL balance mutations MUST go through these methods.
///
/// # Enforcement Strategy:
/// 1. Fields are PRIVATE - no direct access
/// 2. All mutations return Result - errors are explicit
/// 3. checked_add/sub - overflow protection
/// 4. A failed mutation leaves the balance untouched
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::{Amount, UserId};

/// Balance arithmetic errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BalanceError {
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Amount, available: Amount },

    #[error("Balance overflow")]
    Overflow,
}

/// Per-user loyalty balance
///
/// # Invariants (ENFORCED by private fields):
/// - `current` never goes below zero (unsigned + checked debit)
/// - `withdrawn` never decreases (only `withdraw` touches it, always upward)
///
/// # Usage:
/// ```
/// use loyalty_ledger::Balance;
///
/// let mut balance = Balance::new(1);
/// balance.credit(500).unwrap();
/// balance.withdraw(300).unwrap();
/// assert_eq!(balance.current(), 200);
/// assert_eq!(balance.withdrawn(), 300);
/// assert!(balance.withdraw(800).is_err());
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Balance {
    user_id: UserId,
    current: Amount,   // PRIVATE - ONLY modified through credit/withdraw
    withdrawn: Amount, // PRIVATE - ONLY modified through withdraw
}

impl Balance {
    /// Empty balance for a user
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            current: 0,
            withdrawn: 0,
        }
    }

    /// Rebuild a balance from persisted amounts
    ///
    /// Only storage backends should call this; the values must come from a
    /// previously committed state.
    pub const fn restore(user_id: UserId, current: Amount, withdrawn: Amount) -> Self {
        Self {
            user_id,
            current,
            withdrawn,
        }
    }

    // ============================================================
    // READ-ONLY GETTERS
    // ============================================================

    #[inline(always)]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Spendable amount
    #[inline(always)]
    pub const fn current(&self) -> Amount {
        self.current
    }

    /// Lifetime total debited by withdrawals
    #[inline(always)]
    pub const fn withdrawn(&self) -> Amount {
        self.withdrawn
    }

    // ============================================================
    // VALIDATED MUTATIONS
    // ============================================================

    /// Credit an accrual to the spendable amount
    ///
    /// # Errors
    /// - `Overflow` if the result does not fit
    pub fn credit(&mut self, amount: Amount) -> Result<(), BalanceError> {
        self.current = self
            .current
            .checked_add(amount)
            .ok_or(BalanceError::Overflow)?;
        Ok(())
    }

    /// Debit `sum` from the spendable amount and add it to `withdrawn`
    ///
    /// This is atomic - either both fields change or neither does.
    ///
    /// # Errors
    /// - `InsufficientFunds` if current < sum
    /// - `Overflow` if withdrawn would overflow
    pub fn withdraw(&mut self, sum: Amount) -> Result<(), BalanceError> {
        if self.current < sum {
            return Err(BalanceError::InsufficientFunds {
                requested: sum,
                available: self.current,
            });
        }
        // Validate both sides before applying either
        let withdrawn = self
            .withdrawn
            .checked_add(sum)
            .ok_or(BalanceError::Overflow)?;
        self.current -= sum;
        self.withdrawn = withdrawn;
        Ok(())
    }
}
