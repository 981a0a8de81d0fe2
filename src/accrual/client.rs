//! HTTP accrual client
//!
//! `GET {base_url}/api/orders/{number}`:
//!
//! | HTTP | Result |
//! |------|--------|
//! | 200  | `OrderInfo` decoded from JSON |
//! | 204  | `NotFound` |
//! | 429  | `RateLimited` (`Retry-After` seconds when present) |
//! | 5xx  | `ServiceUnavailable` |
//! | else | `UnexpectedStatus` |
//!
//! The order number is sent as one percent-encoded path segment, so `/`,
//! `?` or `#` inside it can never address a different order.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{AccrualInfoProvider, OrderInfo, ProviderError};
use crate::core_types::Amount;
use crate::models::OrderStatus;

/// Wire format of a 200 response
#[derive(Debug, Deserialize)]
struct OrderInfoResponse {
    #[serde(alias = "number")]
    order: String,
    status: String,
    #[serde(default)]
    accrual: Option<Amount>,
}

impl TryFrom<OrderInfoResponse> for OrderInfo {
    type Error = ProviderError;

    fn try_from(resp: OrderInfoResponse) -> Result<Self, Self::Error> {
        let status = OrderStatus::from_provider(&resp.status)
            .ok_or_else(|| ProviderError::Decode(format!("unknown status {:?}", resp.status)))?;

        Ok(OrderInfo {
            number: resp.order,
            status,
            accrual: resp.accrual.unwrap_or(0),
        })
    }
}

pub struct HttpAccrualClient {
    base_url: Url,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl HttpAccrualClient {
    /// Build a client. `request_timeout` applies to each whole request.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        let parsed = Url::parse(base_url)
            .map_err(|e| ProviderError::Transport(format!("Invalid accrual base URL {}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(ProviderError::Transport(format!(
                "Invalid accrual base URL {}: cannot hold a path",
                base_url
            )));
        }

        Ok(Self {
            base_url: parsed,
            request_timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// `None` for numbers no URL path segment can carry (`.` and `..`)
    fn order_url(&self, number: &str) -> Option<Url> {
        if matches!(number, "." | "..") {
            return None;
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["api", "orders", number]);
        Some(url)
    }
}

fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl AccrualInfoProvider for HttpAccrualClient {
    async fn get_order_info(&self, number: &str) -> Result<OrderInfo, ProviderError> {
        let Some(url) = self.order_url(number) else {
            warn!(order = number, "Order number cannot be addressed, treating as unknown");
            return Err(ProviderError::NotFound(number.to_string()));
        };
        let resp = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.request_timeout)
                } else {
                    ProviderError::Transport(format!("GET {} failed: {}", url, e))
                }
            })?;

        let status = resp.status();
        debug!(order = number, http_status = status.as_u16(), "Accrual response");

        match status {
            StatusCode::OK => {
                let body: OrderInfoResponse = resp
                    .json()
                    .await
                    .map_err(|e| ProviderError::Decode(e.to_string()))?;
                body.try_into()
            }
            StatusCode::NO_CONTENT => Err(ProviderError::NotFound(number.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited {
                retry_after: retry_after(&resp),
            }),
            s if s.is_server_error() => Err(ProviderError::ServiceUnavailable(s.as_u16())),
            s => Err(ProviderError::UnexpectedStatus(s.as_u16())),
        }
    }
}
