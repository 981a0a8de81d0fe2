//! Ledger error types
//!
//! Every failure returned by the registry, ledger and withdrawal processor is
//! a [`LedgerError`]. Callers branch on [`LedgerError::kind`] and read the
//! attached payload (the existing order, the available amount, ...).

use thiserror::Error;

use crate::balance::BalanceError;
use crate::core_types::Amount;
use crate::models::Order;
use crate::storage::StorageError;

/// Coarse error category shared by ledger and provider errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DuplicateOrder,
    ConflictOrder,
    InsufficientFunds,
    NotFound,
    InvalidInput,
    TransactionFailure,
    TransientProvider,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DuplicateOrder => "duplicate_order",
            ErrorKind::ConflictOrder => "conflict_order",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::TransactionFailure => "transaction_failure",
            ErrorKind::TransientProvider => "transient_provider",
        }
    }
}

/// Ledger error types
#[derive(Error, Debug)]
pub enum LedgerError {
    // === Registration ===
    #[error("Order {} already registered by this user", .0.number)]
    DuplicateOrder(Order),

    #[error("Order {} already registered by another user", .0.number)]
    ConflictOrder(Order),

    // === Validation ===
    #[error("Invalid order number: {0:?}")]
    InvalidOrderNumber(String),

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    // === Balance ===
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Amount, available: Amount },

    #[error("Balance overflow")]
    Overflow,

    #[error("Not found: {0}")]
    NotFound(String),

    // === System ===
    #[error("Transaction failed: {0}")]
    Transaction(#[from] StorageError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::DuplicateOrder(_) => ErrorKind::DuplicateOrder,
            LedgerError::ConflictOrder(_) => ErrorKind::ConflictOrder,
            LedgerError::InvalidOrderNumber(_) | LedgerError::InvalidAmount => {
                ErrorKind::InvalidInput
            }
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::Overflow | LedgerError::Transaction(_) => ErrorKind::TransactionFailure,
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::DuplicateOrder(_) => "DUPLICATE_ORDER",
            LedgerError::ConflictOrder(_) => "CONFLICT_ORDER",
            LedgerError::InvalidOrderNumber(_) => "INVALID_ORDER_NUMBER",
            LedgerError::InvalidAmount => "INVALID_AMOUNT",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::Overflow => "OVERFLOW",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Transaction(_) => "TRANSACTION_FAILED",
        }
    }

    /// Get HTTP status code suggestion
    ///
    /// A duplicate submission by the same user is not a failure for the
    /// client, hence 200.
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::DuplicateOrder(_) => 200,
            LedgerError::InvalidAmount => 400,
            LedgerError::InsufficientFunds { .. } => 402,
            LedgerError::NotFound(_) => 404,
            LedgerError::ConflictOrder(_) => 409,
            LedgerError::InvalidOrderNumber(_) => 422,
            LedgerError::Overflow | LedgerError::Transaction(_) => 500,
        }
    }

    /// The existing order carried by duplicate/conflict errors
    pub fn existing_order(&self) -> Option<&Order> {
        match self {
            LedgerError::DuplicateOrder(order) | LedgerError::ConflictOrder(order) => Some(order),
            _ => None,
        }
    }
}

impl From<BalanceError> for LedgerError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::InsufficientFunds {
                requested,
                available,
            } => LedgerError::InsufficientFunds {
                requested,
                available,
            },
            BalanceError::Overflow => LedgerError::Overflow,
        }
    }
}
