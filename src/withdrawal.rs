//! Withdrawal Processor
//!
//! Debits a user's balance and records the withdrawal in one transaction:
//!
//! 1. Lock the balance (create a zero balance if the user has none)
//! 2. Check funds - insufficient -> roll back, nothing persisted
//! 3. Deduct and insert the withdrawal row
//! 4. Commit

use std::sync::Arc;
use tracing::info;

use crate::balance::Balance;
use crate::core_types::{Amount, UserId};
use crate::error::LedgerError;
use crate::models::Withdrawal;
use crate::storage::{LedgerStore, LedgerTx, StorageError};
use crate::validation::OrderNumber;

pub struct WithdrawalProcessor {
    store: Arc<dyn LedgerStore>,
}

impl WithdrawalProcessor {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Withdraw `sum` from the user's balance against `order_number`.
    ///
    /// # Errors
    /// - `InvalidAmount` if `sum == 0`
    /// - `InvalidOrderNumber` if the number is empty
    /// - `InsufficientFunds` if `current < sum`; the balance is unchanged
    ///   and no withdrawal row exists afterwards
    pub async fn create(
        &self,
        user_id: UserId,
        order_number: &str,
        sum: Amount,
    ) -> Result<Withdrawal, LedgerError> {
        if sum == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let order_number = OrderNumber::new(order_number)
            .map_err(|_| LedgerError::InvalidOrderNumber(order_number.to_string()))?;

        let mut tx = self.store.begin().await?;

        // 1. Lock & load balance
        let mut balance = lock_or_create_balance(&mut *tx, user_id).await?;

        // 2. Check funds
        if let Err(e) = balance.withdraw(sum) {
            tx.rollback().await?;
            info!(
                user_id,
                order_number = %order_number,
                sum,
                available = balance.current(),
                "Withdrawal rejected"
            );
            return Err(e.into());
        }

        // 3. Deduct & record
        tx.update_balance(&balance).await?;
        let withdrawal = tx
            .insert_withdrawal(user_id, order_number.as_str(), sum)
            .await?;

        tx.commit().await?;

        info!(
            withdrawal_id = withdrawal.id,
            user_id,
            order_number = %order_number,
            sum,
            current = balance.current(),
            withdrawn = balance.withdrawn(),
            "Withdrawal processed"
        );

        Ok(withdrawal)
    }
}

async fn lock_or_create_balance(
    tx: &mut dyn LedgerTx,
    user_id: UserId,
) -> Result<Balance, LedgerError> {
    if let Some(balance) = tx.balance_for_update(user_id).await? {
        return Ok(balance);
    }
    if let Some(balance) = tx.create_balance(user_id, 0).await? {
        return Ok(balance);
    }
    // Created concurrently
    tx.balance_for_update(user_id).await?.ok_or_else(|| {
        StorageError::Fault(format!("balance of user {} vanished after insert", user_id)).into()
    })
}
