//! Loyalty Ledger - order accrual pipeline and transactional balance ledger
//!
//! Users submit order numbers; a pool of workers asks an external accrual
//! service what each order earns, and the ledger credits the result to the
//! user's balance. Withdrawals debit the balance.
//!
//! ```text
//! register ──▶ OrderRegistry ──▶ AccrualDispatcher ──▶ worker ──▶ AccrualInfoProvider
//!                                  (bounded queue)         │
//!                                        ▲                 ▼
//!                                  RescanWorker        Ledger::apply_accrual
//!                                                          │
//! withdraw ──▶ WithdrawalProcessor ────────────────────▶ LedgerStore (tx)
//! ```
//!
//! # Modules
//!
//! - [`core_types`] - Id and amount aliases
//! - [`models`] - Order, Withdrawal, OrderStatus codec
//! - [`balance`] - Enforced balance type
//! - [`storage`] - Store/transaction traits, in-memory and PostgreSQL backends
//! - [`accrual`] - Accrual provider trait and HTTP client
//! - [`ledger`] - Transactional accrual application
//! - [`registry`] - Order registration
//! - [`dispatcher`] - Job queue, worker pool, rescan worker
//! - [`withdrawal`] - Transactional withdrawals
//! - [`queries`] - Read-only account views
//! - [`config`] / [`logging`] - Ambient setup

// Core types - must be first!
pub mod core_types;

pub mod balance;
pub mod error;
pub mod models;
pub mod validation;

// Storage & external services
pub mod accrual;
pub mod storage;

// Ledger components
pub mod dispatcher;
pub mod ledger;
pub mod queries;
pub mod registry;
pub mod withdrawal;

// Process plumbing
pub mod config;
pub mod logging;
pub mod shutdown;

// Convenient re-exports at crate root
pub use accrual::{AccrualInfoProvider, HttpAccrualClient, OrderInfo, ProviderError};
pub use balance::{Balance, BalanceError};
pub use config::AppConfig;
pub use core_types::{Amount, OrderId, UserId, WithdrawalId};
pub use dispatcher::{AccrualDispatcher, DispatchError, DispatchSettings, OrderSink, RescanWorker};
pub use error::{ErrorKind, LedgerError};
pub use ledger::{AccrualOutcome, Ledger};
pub use models::{Order, OrderStatus, Withdrawal};
pub use queries::AccountQueries;
pub use registry::OrderRegistry;
pub use shutdown::ShutdownSignal;
pub use storage::{InMemoryStore, LedgerStore, LedgerTx, PgStore, StorageError};
pub use withdrawal::WithdrawalProcessor;
