//! Accrual job queue
//!
//! Bounded multi-producer, multi-consumer queue of orders. Producers wait
//! for space up to a deadline; consumers share one receiver and take turns.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{Mutex, mpsc};

use super::DispatchError;
use crate::models::Order;

/// Producer side. Clone freely; the queue closes when every sender is gone.
#[derive(Clone)]
pub struct JobSender {
    tx: mpsc::Sender<Order>,
}

impl JobSender {
    /// Enqueue an order, waiting at most `timeout` for space
    pub async fn send(&self, order: Order, timeout: Duration) -> Result<(), DispatchError> {
        self.tx
            .send_timeout(order, timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => DispatchError::QueueFull,
                SendTimeoutError::Closed(_) => DispatchError::Closed,
            })
    }
}

/// Consumer side, shared by all workers
#[derive(Clone)]
pub struct JobReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Order>>>,
}

impl JobReceiver {
    /// Next order, or `None` once the queue is closed and drained
    pub async fn recv(&self) -> Option<Order> {
        self.rx.lock().await.recv().await
    }
}

/// Create a new job queue pair
pub fn job_queue(capacity: usize) -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        JobSender { tx },
        JobReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}
