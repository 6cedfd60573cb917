//! The store a runner works against: ledger bookkeeping plus script
//! execution over one connection.

mod postgres;

pub use postgres::PgStore;

use std::future::Future;
use std::pin::Pin;

use shift_core::error::Result;
use shift_core::ledger::MigrationRecord;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Ledger and execution backend.
pub trait MigrationStore: Send {
    /// Create the ledger schema and table if absent.
    fn bootstrap(&mut self) -> StoreFuture<'_, ()>;

    /// All ledger rows, ordered by script name.
    fn applied(&mut self) -> StoreFuture<'_, Vec<MigrationRecord>>;

    /// Insert a ledger row for `script_name`.
    fn record<'a>(&'a mut self, script_name: &'a str) -> StoreFuture<'a, ()>;

    /// Delete ledger rows for `script_name`, returning how many went away.
    fn remove<'a>(&'a mut self, script_name: &'a str) -> StoreFuture<'a, u64>;

    /// Run a script as one statement batch, wrapped in a transaction when
    /// `transactional`. On failure the transaction is rolled back and a
    /// `ShiftError::Statement` describes the driver error.
    fn execute_script<'a>(&'a mut self, sql: &'a str, transactional: bool)
        -> StoreFuture<'a, u64>;

    /// Release the connection. Further calls fail.
    fn close(&mut self) -> StoreFuture<'_, ()>;
}
