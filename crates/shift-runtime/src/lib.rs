pub mod db;
pub mod ledger;
pub mod migrations;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use db::{connect, connect_options};
pub use ledger::{MigrationStore, PgStore, StoreFuture};
pub use migrations::{MigrationRunner, MigrationStatus, RunReport, ScriptRun};
