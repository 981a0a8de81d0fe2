//! Ledger storage
//!
//! The ledger talks to storage through two traits:
//!
//! - [`LedgerStore`]: plain reads, order creation, and [`LedgerStore::begin`]
//! - [`LedgerTx`]: a scoped transaction. Operations run in straight-line
//!   code and end with `commit()` or `rollback()`. Dropping an uncommitted
//!   transaction rolls it back, so an early `?` return never leaves partial
//!   state behind.
//!
//! Balance and order reads made through a transaction lock the row until the
//! transaction ends (`SELECT ... FOR UPDATE` on PostgreSQL).
//!
//! Backends:
//! - [`memory::InMemoryStore`] - process-local, used by tests and demos
//! - [`postgres::PgStore`] - PostgreSQL via sqlx

pub mod memory;
pub mod postgres;
pub mod schema;

use async_trait::async_trait;
use thiserror::Error;

use crate::balance::Balance;
use crate::core_types::{Amount, OrderId, UserId};
use crate::models::{Order, OrderStatus, Withdrawal};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Storage-level failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("order with number \"{0}\" already exists")]
    OrderNotUnique(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    #[error("Amount {0} exceeds storage range")]
    AmountOutOfRange(Amount),

    #[error("Storage fault: {0}")]
    Fault(String),
}

pub type StoreResult<T> = Result<T, StorageError>;

/// Non-transactional operations plus the transaction entry point
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a `Registered` order.
    ///
    /// Fails with `OrderNotUnique` when the number is already taken,
    /// whoever owns it.
    async fn create_order(&self, user_id: UserId, number: &str) -> StoreResult<Order>;

    async fn find_order_by_number(&self, number: &str) -> StoreResult<Option<Order>>;

    /// A user's orders, newest first
    async fn user_orders(&self, user_id: UserId) -> StoreResult<Vec<Order>>;

    /// Orders not yet final (`Registered` or `Processing`), oldest first
    async fn unfinished_orders(&self, limit: usize) -> StoreResult<Vec<Order>>;

    async fn find_balance(&self, user_id: UserId) -> StoreResult<Option<Balance>>;

    /// A user's withdrawals, oldest first
    async fn user_withdrawals(&self, user_id: UserId) -> StoreResult<Vec<Withdrawal>>;

    /// Start a transaction
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>>;
}

/// Scoped storage transaction
#[async_trait]
pub trait LedgerTx: Send {
    /// Read and lock an order row
    async fn order_for_update(&mut self, order_id: OrderId) -> StoreResult<Option<Order>>;

    async fn update_order(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        accrual: Amount,
    ) -> StoreResult<()>;

    /// Read and lock a user's balance row
    async fn balance_for_update(&mut self, user_id: UserId) -> StoreResult<Option<Balance>>;

    /// Insert a balance row with `withdrawn = 0` and lock it.
    ///
    /// Returns `None` if the row already exists (e.g. created by a concurrent
    /// transaction); callers then re-read it with `balance_for_update`.
    async fn create_balance(
        &mut self,
        user_id: UserId,
        current: Amount,
    ) -> StoreResult<Option<Balance>>;

    /// Persist both amounts of a balance previously locked in this transaction
    async fn update_balance(&mut self, balance: &Balance) -> StoreResult<()>;

    async fn insert_withdrawal(
        &mut self,
        user_id: UserId,
        order_number: &str,
        sum: Amount,
    ) -> StoreResult<Withdrawal>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
