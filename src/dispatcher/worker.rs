//! Accrual worker
//!
//! One task of the dispatcher pool. Errors are logged and the loop moves on
//! to the next order; a single failing order never stops the worker.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::channel::JobReceiver;
use crate::accrual::{AccrualInfoProvider, OrderInfo, ProviderError};
use crate::error::ErrorKind;
use crate::ledger::{AccrualOutcome, Ledger};
use crate::models::Order;

pub struct AccrualWorker {
    id: usize,
    jobs: JobReceiver,
    provider: Arc<dyn AccrualInfoProvider>,
    ledger: Arc<Ledger>,
    request_timeout: Duration,
}

impl AccrualWorker {
    pub fn new(
        id: usize,
        jobs: JobReceiver,
        provider: Arc<dyn AccrualInfoProvider>,
        ledger: Arc<Ledger>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            id,
            jobs,
            provider,
            ledger,
            request_timeout,
        }
    }

    /// Process orders until the queue is closed and empty
    pub async fn run(self) {
        debug!(worker = self.id, "Accrual worker started");

        let mut processed = 0u64;
        while let Some(order) = self.jobs.recv().await {
            self.process(order).await;
            processed += 1;
        }

        info!(worker = self.id, processed, "Accrual worker stopped");
    }

    async fn process(&self, order: Order) {
        let info = match self.fetch(&order.number).await {
            Ok(info) => info,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    worker = self.id,
                    order_id = order.id,
                    number = %order.number,
                    "Order unknown to accrual service, dropping"
                );
                return;
            }
            Err(e) => {
                // Left unfinished; the rescan resubmits it
                warn!(
                    worker = self.id,
                    order_id = order.id,
                    number = %order.number,
                    error = %e,
                    "Accrual lookup failed"
                );
                return;
            }
        };

        if info.number != order.number {
            warn!(
                worker = self.id,
                order_id = order.id,
                number = %order.number,
                reported = %info.number,
                "Accrual service answered for a different order, dropping"
            );
            return;
        }

        match self
            .ledger
            .apply_accrual(order.id, info.status, info.accrual)
            .await
        {
            Ok(AccrualOutcome::Applied { order, .. }) => {
                debug!(
                    worker = self.id,
                    order_id = order.id,
                    status = %order.status,
                    "Order updated"
                );
            }
            Ok(AccrualOutcome::AlreadyFinal(_)) => {}
            Err(e) => {
                error!(
                    worker = self.id,
                    order_id = order.id,
                    number = %order.number,
                    code = e.code(),
                    error = %e,
                    "Failed to apply accrual"
                );
            }
        }
    }

    /// Provider call bounded by the per-request deadline
    async fn fetch(&self, number: &str) -> Result<OrderInfo, ProviderError> {
        match tokio::time::timeout(self.request_timeout, self.provider.get_order_info(number)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.request_timeout)),
        }
    }
}
