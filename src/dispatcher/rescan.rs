//! Rescan Worker
//!
//! Background worker that resubmits orders still waiting for a final
//! accrual status: orders whose provider call failed, orders that were
//! `Processing` at the last lookup, and anything queued before a restart.
//!
//! A scan ends at the first submit the dispatcher refuses, so a stalled
//! provider costs at most one `submit_timeout` per tick.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{DispatchError, OrderSink};
use crate::config::RescanConfig;
use crate::shutdown::ShutdownSignal;
use crate::storage::{LedgerStore, StorageError};

/// Configuration for the rescan worker
#[derive(Debug, Clone)]
pub struct RescanSettings {
    /// How often to scan for unfinished orders
    pub interval: Duration,
    /// Maximum orders to resubmit per scan
    pub batch_size: usize,
}

impl From<&RescanConfig> for RescanSettings {
    fn from(config: &RescanConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            batch_size: config.batch_size,
        }
    }
}

impl Default for RescanSettings {
    fn default() -> Self {
        Self::from(&RescanConfig::default())
    }
}

pub struct RescanWorker {
    store: Arc<dyn LedgerStore>,
    sink: Arc<dyn OrderSink>,
    settings: RescanSettings,
}

impl RescanWorker {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        sink: Arc<dyn OrderSink>,
        settings: RescanSettings,
    ) -> Self {
        Self {
            store,
            sink,
            settings,
        }
    }

    /// Scan every `interval` until shutdown is requested
    pub async fn run(&self, shutdown: ShutdownSignal) {
        info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            batch_size = self.settings.batch_size,
            "Starting rescan worker"
        );

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once().await {
                        error!(error = %e, "Rescan failed");
                    }
                }
            }
        }

        info!("Rescan worker stopped");
    }

    /// Run a single scan. Returns how many orders were resubmitted.
    pub async fn scan_once(&self) -> Result<usize, StorageError> {
        let orders = self
            .store
            .unfinished_orders(self.settings.batch_size)
            .await?;

        if orders.is_empty() {
            debug!("No unfinished orders");
            return Ok(0);
        }

        let mut submitted = 0;
        for order in orders {
            let order_id = order.id;
            match self.sink.submit(order).await {
                Ok(()) => submitted += 1,
                Err(DispatchError::Closed) => {
                    debug!("Dispatcher closed, stopping scan");
                    break;
                }
                Err(DispatchError::QueueFull) => {
                    // Leave the queue to registrations; the next tick retries
                    warn!(order_id, submitted, "Accrual queue full, stopping scan");
                    break;
                }
            }
        }

        if submitted > 0 {
            info!(count = submitted, "Resubmitted unfinished orders");
        }

        Ok(submitted)
    }
}
