pub mod config;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod scaffold;
pub mod scripts;
pub mod template;

pub use config::{DatabaseConfig, LedgerConfig, PathsConfig, ShiftConfig};
pub use error::{Diagnostics, Result, ShiftError};
pub use ledger::{LedgerTable, MigrationRecord};
pub use policy::{policy_plan, ArtifactKind, PolicyArtifact, POLICY_SEQUENCE};
pub use scripts::{is_reserved, list_scripts, pending_scripts, ScriptLayout};
