//! Order Registry
//!
//! Entry point for order submissions. Validates the number, creates the
//! order, and hands it to the accrual dispatcher. Registration never waits
//! for the accrual provider.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RegistryConfig;
use crate::core_types::UserId;
use crate::dispatcher::OrderSink;
use crate::error::LedgerError;
use crate::models::Order;
use crate::storage::{LedgerStore, StorageError};
use crate::validation::OrderNumber;

pub struct OrderRegistry {
    store: Arc<dyn LedgerStore>,
    sink: Arc<dyn OrderSink>,
    validate_luhn: bool,
}

impl OrderRegistry {
    pub fn new(store: Arc<dyn LedgerStore>, sink: Arc<dyn OrderSink>) -> Self {
        Self {
            store,
            sink,
            validate_luhn: false,
        }
    }

    /// Registry configured from the `registry` config section
    pub fn from_config(
        store: Arc<dyn LedgerStore>,
        sink: Arc<dyn OrderSink>,
        config: &RegistryConfig,
    ) -> Self {
        Self::new(store, sink).with_luhn_validation(config.validate_luhn)
    }

    /// Require digits-only numbers with a valid Luhn check digit
    pub fn with_luhn_validation(mut self, enabled: bool) -> Self {
        self.validate_luhn = enabled;
        self
    }

    /// Register an order number for a user.
    ///
    /// # Errors
    /// - `InvalidOrderNumber` for an empty (or, with Luhn checking, malformed) number
    /// - `DuplicateOrder` if this user already registered the number
    /// - `ConflictOrder` if another user owns it
    pub async fn register(&self, user_id: UserId, number: &str) -> Result<Order, LedgerError> {
        let parsed = if self.validate_luhn {
            OrderNumber::with_luhn(number)
        } else {
            OrderNumber::new(number)
        };
        let number = parsed
            .map_err(|e| {
                info!(user_id, number, reason = %e, "Rejected order number");
                LedgerError::InvalidOrderNumber(number.to_string())
            })?
            .into_inner();

        let order = match self.store.create_order(user_id, &number).await {
            Ok(order) => order,
            Err(StorageError::OrderNotUnique(_)) => {
                return Err(self.existing_order_error(user_id, &number).await);
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            order_id = order.id,
            user_id,
            number = %order.number,
            "Order registered"
        );

        if let Err(e) = self.sink.submit(order.clone()).await {
            // Registration stands; the rescan will pick the order up
            warn!(order_id = order.id, error = %e, "Failed to queue order for accrual");
        }

        Ok(order)
    }

    async fn existing_order_error(&self, user_id: UserId, number: &str) -> LedgerError {
        match self.store.find_order_by_number(number).await {
            Ok(Some(existing)) if existing.user_id == user_id => {
                LedgerError::DuplicateOrder(existing)
            }
            Ok(Some(existing)) => LedgerError::ConflictOrder(existing),
            Ok(None) => LedgerError::Transaction(StorageError::Fault(format!(
                "order {} reported as duplicate but not found",
                number
            ))),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatchError;
    use crate::models::OrderStatus;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        submitted: Mutex<Vec<Order>>,
        fail_with: Option<DispatchError>,
    }

    #[async_trait]
    impl OrderSink for RecordingSink {
        async fn submit(&self, order: Order) -> Result<(), DispatchError> {
            if let Some(err) = self.fail_with {
                return Err(err);
            }
            self.submitted.lock().unwrap().push(order);
            Ok(())
        }
    }

    fn registry(sink: Arc<RecordingSink>) -> (InMemoryStore, OrderRegistry) {
        let store = InMemoryStore::new();
        let registry = OrderRegistry::new(Arc::new(store.clone()), sink);
        (store, registry)
    }

    #[tokio::test]
    async fn test_register_submits_exactly_once() {
        let sink = Arc::new(RecordingSink::default());
        let (_store, registry) = registry(sink.clone());

        let order = registry.register(1, "79927398713").await.unwrap();
        assert_eq!(order.status, OrderStatus::Registered);
        assert_eq!(order.user_id, 1);

        let submitted = sink.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0], order);
    }

    #[tokio::test]
    async fn test_duplicate_and_conflict_are_not_submitted() {
        let sink = Arc::new(RecordingSink::default());
        let (store, registry) = registry(sink.clone());
        let original = registry.register(1, "79927398713").await.unwrap();

        let err = registry.register(1, "79927398713").await.unwrap_err();
        assert!(matches!(&err, LedgerError::DuplicateOrder(o) if *o == original));

        let err = registry.register(2, "79927398713").await.unwrap_err();
        assert!(matches!(&err, LedgerError::ConflictOrder(o) if o.user_id == 1));

        assert_eq!(sink.submitted.lock().unwrap().len(), 1);
        let stored = store
            .find_order_by_number("79927398713")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, original);
    }

    #[tokio::test]
    async fn test_number_is_trimmed() {
        let sink = Arc::new(RecordingSink::default());
        let (_store, registry) = registry(sink);

        let order = registry.register(1, "  12345678903 ").await.unwrap();
        assert_eq!(order.number, "12345678903");

        let err = registry.register(1, "12345678903").await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateOrder(_)));
    }

    #[tokio::test]
    async fn test_empty_number_is_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let (_store, registry) = registry(sink.clone());

        for bad in ["", "   "] {
            let err = registry.register(1, bad).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidOrderNumber(_)));
        }
        assert!(sink.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_luhn_validation_when_enabled() {
        let sink = Arc::new(RecordingSink::default());
        let (_store, registry) = registry(sink);
        let registry = registry.with_luhn_validation(true);

        assert!(registry.register(1, "79927398713").await.is_ok());
        let err = registry.register(1, "79927398710").await.unwrap_err();
        assert_eq!(err.http_status(), 422);
    }

    #[tokio::test]
    async fn test_from_config_applies_luhn_setting() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());

        let strict = OrderRegistry::from_config(
            store.clone(),
            sink.clone(),
            &RegistryConfig {
                validate_luhn: true,
            },
        );
        assert!(matches!(
            strict.register(1, "79927398713?x").await,
            Err(LedgerError::InvalidOrderNumber(_))
        ));

        let lenient = OrderRegistry::from_config(store, sink.clone(), &RegistryConfig::default());
        assert!(lenient.register(1, "79927398713?x").await.is_ok());
        assert_eq!(sink.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_fail_registration() {
        let sink = Arc::new(RecordingSink {
            fail_with: Some(DispatchError::QueueFull),
            ..Default::default()
        });
        let (store, registry) = registry(sink);

        let order = registry.register(1, "79927398713").await.unwrap();
        assert_eq!(
            store.find_order_by_number("79927398713").await.unwrap(),
            Some(order)
        );
    }
}
