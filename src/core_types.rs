//! Core types used throughout the ledger
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

/// User ID - globally unique, immutable after assignment.
///
/// Issued by the upstream user registry; the ledger only stores it.
pub type UserId = u64;

/// Order ID - storage-assigned surrogate key of an order row.
///
/// The business identity of an order is its number; the ID is used for
/// row-level addressing inside transactions.
pub type OrderId = u64;

/// Withdrawal ID - storage-assigned, unique within the system
pub type WithdrawalId = u64;

/// Monetary amount in the smallest currency unit.
///
/// # Constraints:
/// - Never negative (unsigned)
/// - No floating point anywhere in the ledger
/// - Stored as BIGINT in PostgreSQL, so values above `i64::MAX` are rejected
pub type Amount = u64;
