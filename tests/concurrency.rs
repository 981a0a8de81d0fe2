//! Concurrent credits and debits against one balance

use std::sync::Arc;

use futures::future::join_all;
use loyalty_ledger::{
    AccrualOutcome, Balance, InMemoryStore, Ledger, LedgerStore, OrderStatus, WithdrawalProcessor,
};

const CREDITS: u64 = 50;
const CREDIT_AMOUNT: u64 = 7;
const DEBITS: u64 = 40;
const DEBIT_AMOUNT: u64 = 5;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_lost_updates_between_credits_and_debits() {
    let store = InMemoryStore::new();
    let shared: Arc<dyn LedgerStore> = Arc::new(store.clone());
    let ledger = Arc::new(Ledger::new(shared.clone()));
    let withdrawals = Arc::new(WithdrawalProcessor::new(shared));

    // Seed enough funds that every debit succeeds in any interleaving
    let seed = store.create_order(1, "seed").await.unwrap();
    ledger
        .apply_accrual(seed.id, OrderStatus::Processed, DEBITS * DEBIT_AMOUNT)
        .await
        .unwrap();

    let mut order_ids = Vec::new();
    for i in 0..CREDITS {
        order_ids.push(store.create_order(1, &format!("c{}", i)).await.unwrap().id);
    }

    let credits = order_ids.into_iter().map(|id| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .apply_accrual(id, OrderStatus::Processed, CREDIT_AMOUNT)
                .await
                .map(|_| ())
        })
    });
    let debits = (0..DEBITS).map(|i| {
        let withdrawals = withdrawals.clone();
        tokio::spawn(async move {
            withdrawals
                .create(1, &format!("w{}", i), DEBIT_AMOUNT)
                .await
                .map(|_| ())
        })
    });

    let (credit_results, debit_results) =
        futures::join!(join_all(credits), join_all(debits));
    for result in credit_results.into_iter().chain(debit_results) {
        result.unwrap().unwrap();
    }

    let balance = store.find_balance(1).await.unwrap().unwrap();
    assert_eq!(
        balance,
        Balance::restore(1, CREDITS * CREDIT_AMOUNT, DEBITS * DEBIT_AMOUNT)
    );
    assert_eq!(
        store.user_withdrawals(1).await.unwrap().len() as u64,
        DEBITS
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_credits_create_one_balance() {
    let store = InMemoryStore::new();
    let ledger = Arc::new(Ledger::new(Arc::new(store.clone())));

    let mut order_ids = Vec::new();
    for i in 0..20 {
        order_ids.push(store.create_order(9, &format!("n{}", i)).await.unwrap().id);
    }

    let tasks = order_ids.into_iter().map(|id| {
        let ledger = ledger.clone();
        tokio::spawn(async move { ledger.apply_accrual(id, OrderStatus::Processed, 10).await })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(
        store.find_balance(9).await.unwrap(),
        Some(Balance::restore(9, 200, 0))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_order_applied_concurrently_is_credited_once() {
    let store = InMemoryStore::new();
    let ledger = Arc::new(Ledger::new(Arc::new(store.clone())));
    let order = store.create_order(4, "79927398713").await.unwrap();

    let tasks = (0..8).map(|_| {
        let ledger = ledger.clone();
        let id = order.id;
        tokio::spawn(async move { ledger.apply_accrual(id, OrderStatus::Processed, 500).await })
    });

    let mut applied = 0;
    for result in join_all(tasks).await {
        match result.unwrap().unwrap() {
            AccrualOutcome::Applied { .. } => applied += 1,
            AccrualOutcome::AlreadyFinal(_) => {}
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(
        store.find_balance(4).await.unwrap().map(|b| b.current()),
        Some(500)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() {
    let store = InMemoryStore::new();
    let shared: Arc<dyn LedgerStore> = Arc::new(store.clone());
    let ledger = Ledger::new(shared.clone());
    let withdrawals = Arc::new(WithdrawalProcessor::new(shared));

    let order = store.create_order(2, "seed").await.unwrap();
    ledger
        .apply_accrual(order.id, OrderStatus::Processed, 100)
        .await
        .unwrap();

    // 10 x 30 requested against 100 available: exactly 3 succeed
    let tasks = (0..10).map(|i| {
        let withdrawals = withdrawals.clone();
        tokio::spawn(async move { withdrawals.create(2, &format!("w{}", i), 30).await })
    });
    let succeeded = join_all(tasks)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();

    assert_eq!(succeeded, 3);
    assert_eq!(
        store.find_balance(2).await.unwrap(),
        Some(Balance::restore(2, 10, 90))
    );
    assert_eq!(store.user_withdrawals(2).await.unwrap().len(), 3);
}
