//! Accrual provider
//!
//! The external reward service that decides whether an order earns points
//! and how many. The dispatcher only sees the [`AccrualInfoProvider`] trait;
//! [`client::HttpAccrualClient`] is the production implementation.

pub mod client;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::core_types::Amount;
use crate::error::ErrorKind;
use crate::models::OrderStatus;

pub use client::HttpAccrualClient;

/// What the provider currently knows about an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderInfo {
    pub number: String,
    pub status: OrderStatus,
    /// Zero unless the status is `Processed`
    pub accrual: Amount,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Order {0} is not known to the accrual service")]
    NotFound(String),

    #[error("Rate limited by the accrual service (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Accrual service unavailable: HTTP {0}")]
    ServiceUnavailable(u16),

    #[error("Accrual request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode accrual response: {0}")]
    Decode(String),

    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(u16),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::TransientProvider,
        }
    }
}

#[async_trait]
pub trait AccrualInfoProvider: Send + Sync {
    /// Look up the current reward status of an order.
    ///
    /// Implementations do not retry; callers bound the call with their own
    /// deadline.
    async fn get_order_info(&self, number: &str) -> Result<OrderInfo, ProviderError>;
}
