//! Accrual Dispatcher
//!
//! A bounded queue of registered orders and a fixed pool of worker tasks.
//! Each worker loops: dequeue an order, ask the accrual provider about it
//! (bounded by `request_timeout`), and hand the answer to
//! [`Ledger::apply_accrual`](crate::ledger::Ledger::apply_accrual).
//!
//! `submit` and `shutdown` are the only public operations; the queue and the
//! worker handles stay private.
//!
//! # Shutdown
//!
//! `shutdown()` closes the queue to new submissions. Workers finish what is
//! already queued and exit when the queue is empty. If they are still busy
//! after `shutdown_timeout`, the remaining tasks are aborted.

pub mod channel;
pub mod rescan;
pub mod worker;

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::accrual::AccrualInfoProvider;
use crate::config::DispatcherConfig;
use crate::ledger::Ledger;
use crate::models::Order;

use channel::{JobSender, job_queue};
use worker::AccrualWorker;

pub use rescan::RescanWorker;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Accrual queue is full")]
    QueueFull,

    #[error("Accrual dispatcher is shut down")]
    Closed,
}

/// Anything orders can be handed to for accrual processing
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn submit(&self, order: Order) -> Result<(), DispatchError>;
}

/// Timing and sizing for a running dispatcher
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub submit_timeout: Duration,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl DispatchSettings {
    pub fn from_config(dispatcher: &DispatcherConfig, request_timeout: Duration) -> Self {
        Self {
            workers: dispatcher.workers.max(1),
            queue_capacity: dispatcher.queue_capacity.max(1),
            submit_timeout: Duration::from_millis(dispatcher.submit_timeout_ms),
            request_timeout,
            shutdown_timeout: Duration::from_millis(dispatcher.shutdown_timeout_ms),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&DispatcherConfig::default(), Duration::from_secs(5))
    }
}

pub struct AccrualDispatcher {
    /// `None` once shut down
    sender: RwLock<Option<JobSender>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    settings: DispatchSettings,
}

impl AccrualDispatcher {
    /// Create the queue and spawn the worker pool
    pub fn start(
        settings: DispatchSettings,
        provider: Arc<dyn AccrualInfoProvider>,
        ledger: Arc<Ledger>,
    ) -> Arc<Self> {
        let (sender, receiver) = job_queue(settings.queue_capacity);

        let handles = (0..settings.workers)
            .map(|worker_id| {
                let worker = AccrualWorker::new(
                    worker_id,
                    receiver.clone(),
                    provider.clone(),
                    ledger.clone(),
                    settings.request_timeout,
                );
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            workers = settings.workers,
            queue_capacity = settings.queue_capacity,
            request_timeout_ms = settings.request_timeout.as_millis() as u64,
            "Accrual dispatcher started"
        );

        Arc::new(Self {
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(handles),
            settings,
        })
    }

    /// Enqueue an order for accrual processing.
    ///
    /// Waits for queue space at most `submit_timeout`.
    pub async fn submit(&self, order: Order) -> Result<(), DispatchError> {
        let sender = self.current_sender().ok_or(DispatchError::Closed)?;
        let order_id = order.id;

        sender.send(order, self.settings.submit_timeout).await?;
        debug!(order_id, "Order queued for accrual");
        Ok(())
    }

    /// Stop accepting work, let the workers drain the queue, and wait for
    /// them. Safe to call more than once.
    pub async fn shutdown(&self) {
        // Dropping the last sender closes the queue once in-flight submits end
        let sender = match self.sender.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let handles = std::mem::take(&mut *self.workers.lock().await);
        if handles.is_empty() {
            return;
        }

        info!(workers = handles.len(), "Shutting down accrual dispatcher");
        let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        match tokio::time::timeout(self.settings.shutdown_timeout, join_all(handles)).await {
            Ok(_) => info!("Accrual dispatcher drained"),
            Err(_) => {
                warn!(
                    timeout_ms = self.settings.shutdown_timeout.as_millis() as u64,
                    "Accrual workers did not finish in time, aborting"
                );
                for handle in abort_handles {
                    handle.abort();
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.current_sender().is_none()
    }

    fn current_sender(&self) -> Option<JobSender> {
        match self.sender.read() {
            Ok(guard) => guard.as_ref().cloned(),
            Err(poisoned) => poisoned.into_inner().as_ref().cloned(),
        }
    }
}

#[async_trait]
impl OrderSink for AccrualDispatcher {
    async fn submit(&self, order: Order) -> Result<(), DispatchError> {
        AccrualDispatcher::submit(self, order).await
    }
}
