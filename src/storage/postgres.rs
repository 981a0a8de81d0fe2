//! PostgreSQL ledger store
//!
//! Amounts and ids are `u64` in the domain and `BIGINT` in the database.
//! Values above `i64::MAX` are rejected with `AmountOutOfRange` instead of
//! wrapping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;

use super::{LedgerStore, LedgerTx, StorageError, StoreResult, schema};
use crate::balance::Balance;
use crate::core_types::{Amount, OrderId, UserId};
use crate::models::{Order, OrderStatus, Withdrawal};

const ORDER_COLUMNS: &str = "id, user_id, number, status, accrual, created_at";
const WITHDRAWAL_COLUMNS: &str = "id, user_id, order_number, sum, processed_at";

/// Unique-violation SQLSTATE
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL connection pool behind the `LedgerStore` trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        schema::init_schema(&self.pool).await
    }
}

fn to_db(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::AmountOutOfRange(value))
}

fn from_db(table: &'static str, column: &str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StorageError::CorruptRow {
        table,
        reason: format!("negative {}: {}", column, value),
    })
}

fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    let status_id: i16 = row.try_get("status")?;
    let status = OrderStatus::from_id(status_id).ok_or_else(|| StorageError::CorruptRow {
        table: "orders",
        reason: format!("unknown status id {}", status_id),
    })?;

    Ok(Order {
        id: from_db("orders", "id", row.try_get("id")?)?,
        user_id: from_db("orders", "user_id", row.try_get("user_id")?)?,
        number: row.try_get("number")?,
        status,
        accrual: from_db("orders", "accrual", row.try_get("accrual")?)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn balance_from_row(row: &PgRow) -> StoreResult<Balance> {
    Ok(Balance::restore(
        from_db("balances", "user_id", row.try_get("user_id")?)?,
        from_db("balances", "current_amount", row.try_get("current_amount")?)?,
        from_db("balances", "withdrawn_amount", row.try_get("withdrawn_amount")?)?,
    ))
}

fn withdrawal_from_row(row: &PgRow) -> StoreResult<Withdrawal> {
    Ok(Withdrawal {
        id: from_db("withdrawals", "id", row.try_get("id")?)?,
        user_id: from_db("withdrawals", "user_id", row.try_get("user_id")?)?,
        order_number: row.try_get("order_number")?,
        sum: from_db("withdrawals", "sum", row.try_get("sum")?)?,
        processed_at: row.try_get::<DateTime<Utc>, _>("processed_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn create_order(&self, user_id: UserId, number: &str) -> StoreResult<Order> {
        let sql = format!(
            "INSERT INTO orders (user_id, number, status, accrual) VALUES ($1, $2, $3, 0) \
             RETURNING {}",
            ORDER_COLUMNS
        );
        let result = sqlx::query(&sql)
            .bind(to_db(user_id)?)
            .bind(number)
            .bind(OrderStatus::Registered.id())
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => order_from_row(&row),
            Err(e) if is_unique_violation(&e) => {
                Err(StorageError::OrderNotUnique(number.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_order_by_number(&self, number: &str) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE number = $1", ORDER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn user_orders(&self, user_id: UserId) -> StoreResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            ORDER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(to_db(user_id)?)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn unfinished_orders(&self, limit: usize) -> StoreResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE status IN ($1, $2) \
             ORDER BY created_at ASC, id ASC LIMIT $3",
            ORDER_COLUMNS
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&sql)
            .bind(OrderStatus::Registered.id())
            .bind(OrderStatus::Processing.id())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn find_balance(&self, user_id: UserId) -> StoreResult<Option<Balance>> {
        let row = sqlx::query(
            "SELECT user_id, current_amount, withdrawn_amount FROM balances WHERE user_id = $1",
        )
        .bind(to_db(user_id)?)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(balance_from_row).transpose()
    }

    async fn user_withdrawals(&self, user_id: UserId) -> StoreResult<Vec<Withdrawal>> {
        let sql = format!(
            "SELECT {} FROM withdrawals WHERE user_id = $1 ORDER BY processed_at ASC, id ASC",
            WITHDRAWAL_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(to_db(user_id)?)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(withdrawal_from_row).collect()
    }

    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

/// Open PostgreSQL transaction. sqlx rolls it back on drop.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn order_for_update(&mut self, order_id: OrderId) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(to_db(order_id)?)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn update_order(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        accrual: Amount,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE orders SET status = $1, accrual = $2 WHERE id = $3")
            .bind(status.id())
            .bind(to_db(accrual)?)
            .bind(to_db(order_id)?)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("order {}", order_id)));
        }
        Ok(())
    }

    async fn balance_for_update(&mut self, user_id: UserId) -> StoreResult<Option<Balance>> {
        let row = sqlx::query(
            "SELECT user_id, current_amount, withdrawn_amount FROM balances \
             WHERE user_id = $1 FOR UPDATE",
        )
        .bind(to_db(user_id)?)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(balance_from_row).transpose()
    }

    async fn create_balance(
        &mut self,
        user_id: UserId,
        current: Amount,
    ) -> StoreResult<Option<Balance>> {
        // The inserted row is locked by this transaction until it ends
        let row = sqlx::query(
            "INSERT INTO balances (user_id, current_amount, withdrawn_amount) VALUES ($1, $2, 0) \
             ON CONFLICT (user_id) DO NOTHING \
             RETURNING user_id, current_amount, withdrawn_amount",
        )
        .bind(to_db(user_id)?)
        .bind(to_db(current)?)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(balance_from_row).transpose()
    }

    async fn update_balance(&mut self, balance: &Balance) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE balances SET current_amount = $1, withdrawn_amount = $2 WHERE user_id = $3",
        )
        .bind(to_db(balance.current())?)
        .bind(to_db(balance.withdrawn())?)
        .bind(to_db(balance.user_id())?)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "balance of user {}",
                balance.user_id()
            )));
        }
        Ok(())
    }

    async fn insert_withdrawal(
        &mut self,
        user_id: UserId,
        order_number: &str,
        sum: Amount,
    ) -> StoreResult<Withdrawal> {
        let sql = format!(
            "INSERT INTO withdrawals (user_id, order_number, sum) VALUES ($1, $2, $3) \
             RETURNING {}",
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(to_db(user_id)?)
            .bind(order_number)
            .bind(to_db(sum)?)
            .fetch_one(&mut *self.tx)
            .await?;
        withdrawal_from_row(&row)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
