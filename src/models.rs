// models.rs - Order and withdrawal records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{Amount, OrderId, UserId, WithdrawalId};

/// Order lifecycle status
///
/// `Registered` on first submission; every later transition is driven by
/// what the accrual provider reports. `Processed` and `Invalid` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum OrderStatus {
    Registered = 0,
    Processing = 1,
    Invalid = 2,
    Processed = 3,
}

/// Bidirectional codec table: enum <-> provider string.
///
/// The numeric storage id is the enum discriminant.
const STATUS_TABLE: [(OrderStatus, &str); 4] = [
    (OrderStatus::Registered, "REGISTERED"),
    (OrderStatus::Processing, "PROCESSING"),
    (OrderStatus::Invalid, "INVALID"),
    (OrderStatus::Processed, "PROCESSED"),
];

impl OrderStatus {
    /// All statuses, in storage-id order
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Registered,
        OrderStatus::Processing,
        OrderStatus::Invalid,
        OrderStatus::Processed,
    ];

    /// Get numeric ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL ID
    pub fn from_id(id: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// Provider-facing name
    pub fn as_str(&self) -> &'static str {
        STATUS_TABLE
            .iter()
            .find(|(status, _)| status == self)
            .map(|(_, name)| *name)
            .unwrap_or("UNKNOWN")
    }

    /// Parse the provider's textual status. Exact match only.
    pub fn from_provider(name: &str) -> Option<Self> {
        STATUS_TABLE
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(status, _)| *status)
    }

    /// No further provider report can change the order
    pub fn is_final(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_provider(s).ok_or_else(|| format!("Unknown order status: {}", s))
    }
}

impl TryFrom<i16> for OrderStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        OrderStatus::from_id(value).ok_or(())
    }
}

/// A submitted order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub number: String,
    pub status: OrderStatus,
    pub accrual: Amount,
    pub created_at: DateTime<Utc>,
}

/// An executed withdrawal. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub order_number: String,
    pub sum: Amount,
    pub processed_at: DateTime<Utc>,
}
