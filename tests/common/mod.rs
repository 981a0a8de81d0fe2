//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use loyalty_ledger::storage::StoreResult;
use loyalty_ledger::{
    AccrualDispatcher, AccrualInfoProvider, Amount, Balance, DispatchError, DispatchSettings,
    InMemoryStore, Ledger, LedgerStore, LedgerTx, Order, OrderId, OrderInfo, OrderSink,
    OrderStatus, ProviderError, StorageError, UserId, Withdrawal,
};

// ============================================================================
// Accrual provider stub
// ============================================================================

#[derive(Debug, Clone)]
pub enum StubResponse {
    Info(OrderStatus, Amount),
    /// Answers as if asked about another order number
    InfoFor(String, OrderStatus, Amount),
    NotFound,
    Unavailable,
    RateLimited,
}

/// Scripted accrual provider. Unknown numbers answer `NotFound`.
#[derive(Default)]
pub struct StubProvider {
    responses: Mutex<HashMap<String, StubResponse>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps `delay` before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn respond(&self, number: &str, response: StubResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(number.to_string(), response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccrualInfoProvider for StubProvider {
    async fn get_order_info(&self, number: &str) -> Result<OrderInfo, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.responses.lock().unwrap().get(number).cloned();
        match response {
            Some(StubResponse::Info(status, accrual)) => Ok(OrderInfo {
                number: number.to_string(),
                status,
                accrual,
            }),
            Some(StubResponse::InfoFor(reported, status, accrual)) => Ok(OrderInfo {
                number: reported,
                status,
                accrual,
            }),
            Some(StubResponse::Unavailable) => Err(ProviderError::ServiceUnavailable(503)),
            Some(StubResponse::RateLimited) => Err(ProviderError::RateLimited {
                retry_after: Some(Duration::from_secs(60)),
            }),
            Some(StubResponse::NotFound) | None => Err(ProviderError::NotFound(number.into())),
        }
    }
}

// ============================================================================
// Recording sink
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    pub submitted: Mutex<Vec<Order>>,
    fail_with: Option<DispatchError>,
    attempts: AtomicUsize,
}

impl RecordingSink {
    /// Sink that refuses every order with `err`
    pub fn failing(err: DispatchError) -> Self {
        Self {
            fail_with: Some(err),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn numbers(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.number.clone())
            .collect()
    }
}

#[async_trait]
impl OrderSink for RecordingSink {
    async fn submit(&self, order: Order) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_with {
            return Err(err);
        }
        self.submitted.lock().unwrap().push(order);
        Ok(())
    }
}

// ============================================================================
// Fault-injecting store
// ============================================================================

/// Transaction step that fails with `StorageError::Fault`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    UpdateBalance,
    CreateBalance,
    InsertWithdrawal,
    Commit,
}

/// Wraps an `InMemoryStore`; transactions fail at `fail_on`
pub struct FailingStore {
    inner: InMemoryStore,
    fail_on: FailPoint,
}

impl FailingStore {
    pub fn new(inner: InMemoryStore, fail_on: FailPoint) -> Self {
        Self { inner, fail_on }
    }
}

fn fault(point: FailPoint) -> StorageError {
    StorageError::Fault(format!("injected failure at {:?}", point))
}

#[async_trait]
impl LedgerStore for FailingStore {
    async fn create_order(&self, user_id: UserId, number: &str) -> StoreResult<Order> {
        self.inner.create_order(user_id, number).await
    }

    async fn find_order_by_number(&self, number: &str) -> StoreResult<Option<Order>> {
        self.inner.find_order_by_number(number).await
    }

    async fn user_orders(&self, user_id: UserId) -> StoreResult<Vec<Order>> {
        self.inner.user_orders(user_id).await
    }

    async fn unfinished_orders(&self, limit: usize) -> StoreResult<Vec<Order>> {
        self.inner.unfinished_orders(limit).await
    }

    async fn find_balance(&self, user_id: UserId) -> StoreResult<Option<Balance>> {
        self.inner.find_balance(user_id).await
    }

    async fn user_withdrawals(&self, user_id: UserId) -> StoreResult<Vec<Withdrawal>> {
        self.inner.user_withdrawals(user_id).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        Ok(Box::new(FailingTx {
            inner: self.inner.begin().await?,
            fail_on: self.fail_on,
        }))
    }
}

struct FailingTx {
    inner: Box<dyn LedgerTx>,
    fail_on: FailPoint,
}

#[async_trait]
impl LedgerTx for FailingTx {
    async fn order_for_update(&mut self, order_id: OrderId) -> StoreResult<Option<Order>> {
        self.inner.order_for_update(order_id).await
    }

    async fn update_order(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        accrual: Amount,
    ) -> StoreResult<()> {
        self.inner.update_order(order_id, status, accrual).await
    }

    async fn balance_for_update(&mut self, user_id: UserId) -> StoreResult<Option<Balance>> {
        self.inner.balance_for_update(user_id).await
    }

    async fn create_balance(
        &mut self,
        user_id: UserId,
        current: Amount,
    ) -> StoreResult<Option<Balance>> {
        if self.fail_on == FailPoint::CreateBalance {
            return Err(fault(self.fail_on));
        }
        self.inner.create_balance(user_id, current).await
    }

    async fn update_balance(&mut self, balance: &Balance) -> StoreResult<()> {
        if self.fail_on == FailPoint::UpdateBalance {
            return Err(fault(self.fail_on));
        }
        self.inner.update_balance(balance).await
    }

    async fn insert_withdrawal(
        &mut self,
        user_id: UserId,
        order_number: &str,
        sum: Amount,
    ) -> StoreResult<Withdrawal> {
        if self.fail_on == FailPoint::InsertWithdrawal {
            return Err(fault(self.fail_on));
        }
        self.inner.insert_withdrawal(user_id, order_number, sum).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if self.fail_on == FailPoint::Commit {
            return Err(fault(self.fail_on));
        }
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

// ============================================================================
// Setup helpers
// ============================================================================

pub fn settings(workers: usize, queue_capacity: usize) -> DispatchSettings {
    DispatchSettings {
        workers,
        queue_capacity,
        submit_timeout: Duration::from_millis(50),
        request_timeout: Duration::from_millis(500),
        shutdown_timeout: Duration::from_secs(2),
    }
}

pub struct Pipeline {
    pub store: InMemoryStore,
    pub provider: Arc<StubProvider>,
    pub ledger: Arc<Ledger>,
    pub dispatcher: Arc<AccrualDispatcher>,
}

/// In-memory store, stub provider and a running dispatcher
pub fn pipeline(provider: StubProvider, settings: DispatchSettings) -> Pipeline {
    let store = InMemoryStore::new();
    let provider = Arc::new(provider);
    let ledger = Arc::new(Ledger::new(Arc::new(store.clone())));
    let dispatcher = AccrualDispatcher::start(settings, provider.clone(), ledger.clone());
    Pipeline {
        store,
        provider,
        ledger,
        dispatcher,
    }
}

/// Poll until the order reaches `status`, panicking after `timeout`
pub async fn wait_for_status(
    store: &InMemoryStore,
    number: &str,
    status: OrderStatus,
    timeout: Duration,
) -> Order {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let order = store.find_order_by_number(number).await.unwrap();
        if let Some(order) = order.filter(|o| o.status == status) {
            return order;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "order {} did not reach {} within {:?}",
            number,
            status,
            timeout
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
