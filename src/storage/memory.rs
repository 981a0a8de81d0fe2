//! In-memory ledger storage
//!
//! Every order and balance lives in its own row slot (`Arc<Mutex<_>>`).
//! A transaction locks the slots it touches with owned guards, stages its
//! writes next to the guards, and publishes them on commit. Dropping the
//! transaction releases the guards and discards the staged values.
//!
//! Balance slots hold `Option<Balance>`: `None` means "no row yet", so two
//! transactions racing to create the same user's balance serialize on the
//! same slot just like an insert on a unique key. A slot still holding
//! `None` when the last transaction using it ends is removed again, so
//! lookups of users without a balance do not grow the table.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{LedgerStore, LedgerTx, StorageError, StoreResult};
use crate::balance::Balance;
use crate::core_types::{Amount, OrderId, UserId};
use crate::models::{Order, OrderStatus, Withdrawal};

type Row<T> = Arc<Mutex<T>>;

#[derive(Default)]
struct Tables {
    orders: DashMap<OrderId, Row<Order>>,
    /// Unique index on order number
    order_numbers: DashMap<String, OrderId>,
    balances: DashMap<UserId, Row<Option<Balance>>>,
    withdrawals: RwLock<Vec<Withdrawal>>,
    next_order_id: AtomicU64,
    next_withdrawal_id: AtomicU64,
}

impl Tables {
    fn order_row(&self, order_id: OrderId) -> Option<Row<Order>> {
        self.orders.get(&order_id).map(|r| r.value().clone())
    }

    fn balance_row(&self, user_id: UserId) -> Row<Option<Balance>> {
        self.balances
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .value()
            .clone()
    }

    fn order_rows(&self) -> Vec<Row<Order>> {
        self.orders.iter().map(|e| e.value().clone()).collect()
    }
}

/// A thread-safe in-memory ledger store.
///
/// Cloning shares the same tables.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<Tables>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn snapshot_orders(&self) -> Vec<Order> {
        let mut orders = Vec::new();
        for row in self.tables.order_rows() {
            orders.push(row.lock().await.clone());
        }
        orders
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn create_order(&self, user_id: UserId, number: &str) -> StoreResult<Order> {
        match self.tables.order_numbers.entry(number.to_string()) {
            Entry::Occupied(_) => Err(StorageError::OrderNotUnique(number.to_string())),
            Entry::Vacant(slot) => {
                let id = self.tables.next_order_id.fetch_add(1, Ordering::SeqCst) + 1;
                let order = Order {
                    id,
                    user_id,
                    number: number.to_string(),
                    status: OrderStatus::Registered,
                    accrual: 0,
                    created_at: Utc::now(),
                };
                self.tables
                    .orders
                    .insert(id, Arc::new(Mutex::new(order.clone())));
                slot.insert(id);
                Ok(order)
            }
        }
    }

    async fn find_order_by_number(&self, number: &str) -> StoreResult<Option<Order>> {
        let Some(order_id) = self.tables.order_numbers.get(number).map(|r| *r.value()) else {
            return Ok(None);
        };
        match self.tables.order_row(order_id) {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn user_orders(&self, user_id: UserId) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .snapshot_orders()
            .await
            .into_iter()
            .filter(|o| o.user_id == user_id)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn unfinished_orders(&self, limit: usize) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .snapshot_orders()
            .await
            .into_iter()
            .filter(|o| !o.status.is_final())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        orders.truncate(limit);
        Ok(orders)
    }

    async fn find_balance(&self, user_id: UserId) -> StoreResult<Option<Balance>> {
        let row = self.tables.balances.get(&user_id).map(|r| r.value().clone());
        match row {
            Some(row) => Ok(*row.lock().await),
            None => Ok(None),
        }
    }

    async fn user_withdrawals(&self, user_id: UserId) -> StoreResult<Vec<Withdrawal>> {
        let withdrawals = self.tables.withdrawals.read().await;
        Ok(withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        Ok(Box::new(MemoryTx {
            tables: self.tables.clone(),
            orders: HashMap::new(),
            balances: BalanceLocks {
                tables: self.tables.clone(),
                rows: HashMap::new(),
            },
            withdrawals: Vec::new(),
        }))
    }
}

/// A locked row together with the value this transaction will publish
struct Staged<T> {
    guard: OwnedMutexGuard<T>,
    value: T,
}

/// Balance rows locked by one transaction
struct BalanceLocks {
    tables: Arc<Tables>,
    rows: HashMap<UserId, Staged<Option<Balance>>>,
}

impl Drop for BalanceLocks {
    fn drop(&mut self) {
        let empty: Vec<UserId> = self
            .rows
            .iter()
            .filter(|(_, staged)| staged.guard.is_none())
            .map(|(user_id, _)| *user_id)
            .collect();
        self.rows.clear();

        // Only the map holds the slot and no balance was published into it
        for user_id in empty {
            self.tables.balances.remove_if(&user_id, |_, row| {
                Arc::strong_count(row) == 1 && row.try_lock().is_ok_and(|b| b.is_none())
            });
        }
    }
}

/// In-memory transaction. Rolls back on drop.
pub struct MemoryTx {
    tables: Arc<Tables>,
    orders: HashMap<OrderId, Staged<Order>>,
    balances: BalanceLocks,
    withdrawals: Vec<Withdrawal>,
}

impl MemoryTx {
    async fn lock_order(&mut self, order_id: OrderId) -> Option<&mut Staged<Order>> {
        match self.orders.entry(order_id) {
            MapEntry::Occupied(e) => Some(e.into_mut()),
            MapEntry::Vacant(e) => {
                let row = self.tables.order_row(order_id)?;
                let guard = row.lock_owned().await;
                let value = (*guard).clone();
                Some(e.insert(Staged { guard, value }))
            }
        }
    }

    async fn lock_balance(&mut self, user_id: UserId) -> &mut Staged<Option<Balance>> {
        match self.balances.rows.entry(user_id) {
            MapEntry::Occupied(e) => e.into_mut(),
            MapEntry::Vacant(e) => {
                let guard = self.tables.balance_row(user_id).lock_owned().await;
                let value = *guard;
                e.insert(Staged { guard, value })
            }
        }
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn order_for_update(&mut self, order_id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.lock_order(order_id).await.map(|s| s.value.clone()))
    }

    async fn update_order(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        accrual: Amount,
    ) -> StoreResult<()> {
        let staged = self
            .lock_order(order_id)
            .await
            .ok_or_else(|| StorageError::NotFound(format!("order id={}", order_id)))?;
        staged.value.status = status;
        staged.value.accrual = accrual;
        Ok(())
    }

    async fn balance_for_update(&mut self, user_id: UserId) -> StoreResult<Option<Balance>> {
        Ok(self.lock_balance(user_id).await.value)
    }

    async fn create_balance(
        &mut self,
        user_id: UserId,
        current: Amount,
    ) -> StoreResult<Option<Balance>> {
        let staged = self.lock_balance(user_id).await;
        if staged.value.is_some() {
            return Ok(None);
        }
        let balance = Balance::restore(user_id, current, 0);
        staged.value = Some(balance);
        Ok(Some(balance))
    }

    async fn update_balance(&mut self, balance: &Balance) -> StoreResult<()> {
        let staged = self.lock_balance(balance.user_id()).await;
        if staged.value.is_none() {
            return Err(StorageError::NotFound(format!(
                "balance for user id={}",
                balance.user_id()
            )));
        }
        staged.value = Some(*balance);
        Ok(())
    }

    async fn insert_withdrawal(
        &mut self,
        user_id: UserId,
        order_number: &str,
        sum: Amount,
    ) -> StoreResult<Withdrawal> {
        let id = self.tables.next_withdrawal_id.fetch_add(1, Ordering::SeqCst) + 1;
        let withdrawal = Withdrawal {
            id,
            user_id,
            order_number: order_number.to_string(),
            sum,
            processed_at: Utc::now(),
        };
        self.withdrawals.push(withdrawal.clone());
        Ok(withdrawal)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx {
            tables,
            mut orders,
            mut balances,
            withdrawals,
        } = *self;

        // Rows first, withdrawal history last; guards are released after both
        for staged in orders.values_mut() {
            *staged.guard = staged.value.clone();
        }
        for staged in balances.rows.values_mut() {
            *staged.guard = staged.value;
        }
        if !withdrawals.is_empty() {
            tables.withdrawals.write().await.extend(withdrawals);
        }
        drop(orders);
        drop(balances);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
