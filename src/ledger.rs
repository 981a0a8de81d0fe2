//! Ledger - the only writer of order accruals and balance credits
//!
//! `apply_accrual` runs as one storage transaction:
//!
//! 1. lock the order row (missing -> `NotFound`, terminal -> `AlreadyFinal`)
//! 2. update status and accrual
//! 3. lock the user's balance, creating it on first credit
//! 4. credit and commit
//!
//! Any error drops the transaction before commit, which rolls it back.

use std::sync::Arc;
use tracing::{debug, info};

use crate::balance::Balance;
use crate::core_types::{Amount, OrderId, UserId};
use crate::error::LedgerError;
use crate::models::{Order, OrderStatus};
use crate::storage::{LedgerStore, LedgerTx, StorageError};

/// Result of a successful `apply_accrual`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualOutcome {
    /// Order updated and balance credited
    Applied { order: Order, balance: Balance },
    /// Order was already `Processed` or `Invalid`; nothing changed
    AlreadyFinal(Order),
}

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Record what the provider reported for an order.
    ///
    /// Only `Processed` keeps the reported accrual; every other status
    /// stores and credits 0.
    pub async fn apply_accrual(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        accrual: Amount,
    ) -> Result<AccrualOutcome, LedgerError> {
        let mut tx = self.store.begin().await?;

        let order = tx
            .order_for_update(order_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("order {}", order_id)))?;

        if order.status.is_final() {
            tx.rollback().await?;
            debug!(
                order_id,
                number = %order.number,
                status = %order.status,
                "Order already final, accrual ignored"
            );
            return Ok(AccrualOutcome::AlreadyFinal(order));
        }

        let credited = if status == OrderStatus::Processed {
            accrual
        } else {
            0
        };

        tx.update_order(order_id, status, credited).await?;

        let balance = credit_balance(&mut *tx, order.user_id, credited).await?;

        tx.commit().await?;

        info!(
            order_id,
            user_id = order.user_id,
            number = %order.number,
            status = %status,
            accrual = credited,
            current = balance.current(),
            "Accrual applied"
        );

        Ok(AccrualOutcome::Applied {
            order: Order {
                status,
                accrual: credited,
                ..order
            },
            balance,
        })
    }
}

/// Lock the user's balance (creating it if absent) and credit `amount`.
async fn credit_balance(
    tx: &mut dyn LedgerTx,
    user_id: UserId,
    amount: Amount,
) -> Result<Balance, LedgerError> {
    if let Some(mut balance) = tx.balance_for_update(user_id).await? {
        balance.credit(amount)?;
        tx.update_balance(&balance).await?;
        return Ok(balance);
    }

    if let Some(created) = tx.create_balance(user_id, amount).await? {
        return Ok(created);
    }

    // Lost the insert race to a concurrent transaction; the row exists now
    let mut balance = tx.balance_for_update(user_id).await?.ok_or_else(|| {
        StorageError::Fault(format!("balance of user {} vanished after insert", user_id))
    })?;
    balance.credit(amount)?;
    tx.update_balance(&balance).await?;
    Ok(balance)
}
