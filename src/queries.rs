//! Read-only account views for the API layer

use std::sync::Arc;

use crate::balance::Balance;
use crate::core_types::UserId;
use crate::error::LedgerError;
use crate::models::{Order, Withdrawal};
use crate::storage::LedgerStore;

pub struct AccountQueries {
    store: Arc<dyn LedgerStore>,
}

impl AccountQueries {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Zero balance if the user never had a credit or withdrawal
    pub async fn balance(&self, user_id: UserId) -> Result<Balance, LedgerError> {
        Ok(self
            .store
            .find_balance(user_id)
            .await?
            .unwrap_or_else(|| Balance::new(user_id)))
    }

    /// Newest first
    pub async fn orders(&self, user_id: UserId) -> Result<Vec<Order>, LedgerError> {
        Ok(self.store.user_orders(user_id).await?)
    }

    /// Oldest first
    pub async fn withdrawals(&self, user_id: UserId) -> Result<Vec<Withdrawal>, LedgerError> {
        Ok(self.store.user_withdrawals(user_id).await?)
    }
}
