mod create;
mod migrate;

pub use migrate::DbAction;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use console::style;
use shift_core::config::{ShiftConfig, DEFAULT_CONFIG_FILE};
use shift_core::ShiftError;
use tracing_subscriber::EnvFilter;

/// shift - PostgreSQL migration runner.
///
/// Without flags, plays every pending script of the migrations directory,
/// each in its own transaction, and records it in the ledger.
#[derive(Parser, Debug)]
#[command(name = "shift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Play only this script (even if already applied).
    pub script: Option<String>,

    /// Create a new migration file with the given name.
    #[arg(short = 'c', long, value_name = "NAME")]
    pub create: Option<String>,

    /// With --create, create a function file instead (bare flag reuses the --create name).
    #[arg(
        long,
        value_name = "NAME",
        num_args = 0..=1,
        default_missing_value = "",
        requires = "create"
    )]
    pub func: Option<String>,

    /// Mark a script as applied without running it.
    #[arg(long, value_name = "SCRIPT", num_args = 0..=1, default_missing_value = "")]
    pub skip: Option<String>,

    /// Delete a script's ledger row. Its SQL effects are not undone.
    #[arg(long, value_name = "SCRIPT")]
    pub revert: Option<String>,

    /// List applied and pending scripts.
    #[arg(long)]
    pub list: bool,

    /// Sync functions, triggers, policies and cron jobs.
    #[arg(long, visible_alias = "db")]
    pub policies: bool,

    /// Run scripts without a wrapping transaction, for statements that
    /// cannot run inside a transaction block. Only works when such a
    /// statement is the only one in its script.
    #[arg(long = "no-transaction")]
    pub no_transaction: bool,

    /// Verbose logging, including driver results.
    #[arg(long)]
    pub debug: bool,

    /// Configuration file path.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Project root (overrides the configured one).
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

/// What one invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    CreateMigration { name: String },
    CreateFunction { name: String },
    Database(DbAction),
}

impl Cli {
    /// Resolve flags into a mode. First match wins: create, create
    /// function, skip, policies, list, revert, single script, pending.
    pub fn mode(&self) -> std::result::Result<Mode, ShiftError> {
        if let Some(create) = &self.create {
            return Ok(match &self.func {
                None => Mode::CreateMigration {
                    name: create.clone(),
                },
                Some(func) if func.is_empty() => Mode::CreateFunction {
                    name: create.clone(),
                },
                Some(func) => Mode::CreateFunction { name: func.clone() },
            });
        }

        if let Some(skip) = &self.skip {
            let script = self
                .script
                .clone()
                .or_else(|| Some(skip.clone()).filter(|s| !s.is_empty()))
                .ok_or_else(|| {
                    ShiftError::Usage("--skip requires the script to skip".into())
                })?;
            return Ok(Mode::Database(DbAction::Skip(script)));
        }

        let action = if self.policies {
            DbAction::SyncPolicies
        } else if self.list {
            DbAction::List
        } else if let Some(revert) = &self.revert {
            DbAction::Revert(revert.clone())
        } else if let Some(script) = &self.script {
            DbAction::RunOne(script.clone())
        } else {
            DbAction::RunPending
        };
        Ok(Mode::Database(action))
    }

    /// Execute the invocation.
    pub async fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();

        let mode = self.mode()?;
        let config = self.load_config()?;
        init_tracing(self.debug, config.database.debug_sql);

        println!();
        println!(
            "  {}  {} v{}",
            style("💾").bold(),
            style("SHIFT MIGRATIONS").bold().cyan(),
            env!("CARGO_PKG_VERSION")
        );
        println!();

        match mode {
            Mode::CreateMigration { name } => create::migration(&config, &name),
            Mode::CreateFunction { name } => create::function(&config, &name),
            Mode::Database(action) => {
                if self.no_transaction {
                    println!(
                        "  {} Transactions disabled: use single-statement scripts for non-transactional DDL",
                        style("⚠").yellow()
                    );
                }
                migrate::execute(&config, action, !self.no_transaction).await
            }
        }
    }

    fn load_config(&self) -> Result<ShiftConfig> {
        let mut config = ShiftConfig::load_optional(&self.config)?.with_env();
        if let Some(dir) = &self.dir {
            config.paths.root = dir.clone();
        }
        Ok(config)
    }
}

/// Log filter: RUST_LOG when set, else info (debug with `--debug`).
/// Driver statement logs only show up with `--debug` or `debug_sql`.
fn filter_directives(debug: bool, debug_sql: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    let sqlx = if debug || debug_sql { "debug" } else { "warn" };
    format!("{},sqlx={}", level, sqlx)
}

fn init_tracing(debug: bool, debug_sql: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(debug, debug_sql)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
