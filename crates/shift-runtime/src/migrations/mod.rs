mod runner;

pub use runner::{MigrationRunner, MigrationStatus, RunReport, ScriptRun};
