use anyhow::Result;
use console::style;
use tracing::warn;

use shift_core::config::ShiftConfig;
use shift_runtime::migrations::{MigrationStatus, RunReport, ScriptRun};
use shift_runtime::{connect, MigrationRunner, MigrationStore, PgStore};

/// Modes that need the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbAction {
    List,
    Skip(String),
    Revert(String),
    SyncPolicies,
    RunOne(String),
    RunPending,
}

/// Connect, run `action`, and close the connection whatever happened.
pub async fn execute(config: &ShiftConfig, action: DbAction, transactional: bool) -> Result<()> {
    let table = config.ledger_table()?;
    let conn = connect(&config.database).await?;
    println!(
        "  {} Connected to {}",
        style("✓").green(),
        style(config.database.redacted_target()).cyan()
    );

    let mut runner =
        MigrationRunner::new(PgStore::new(conn, table), config.layout()).transactional(transactional);

    let result = dispatch(&mut runner, action).await;

    if let Err(e) = runner.close().await {
        warn!("Failed to close connection: {}", e);
    }

    result
}

/// Bootstrap the ledger, then perform `action`.
pub async fn dispatch<S: MigrationStore>(
    runner: &mut MigrationRunner<S>,
    action: DbAction,
) -> Result<()> {
    runner.bootstrap().await?;

    match action {
        DbAction::List => {
            let status = runner.status().await?;
            print_status(&status);
        }

        DbAction::Skip(script) => {
            if runner.skip(&script).await? {
                println!(
                    "  {} Skipped permanently: {}",
                    style("✓").green(),
                    style(&script).cyan()
                );
            } else {
                println!(
                    "  {} {} is a policy artifact and is never recorded",
                    style("ℹ").blue(),
                    style(&script).cyan()
                );
            }
        }

        DbAction::Revert(script) => {
            let removed = runner.revert(&script).await?;
            if removed == 0 {
                println!(
                    "  {} No ledger row for {}",
                    style("ℹ").blue(),
                    style(&script).cyan()
                );
            } else {
                println!(
                    "  {} Reverted migration: {} (SQL effects are left in place)",
                    style("✓").green(),
                    style(&script).cyan()
                );
            }
        }

        DbAction::SyncPolicies => {
            println!("  {} Syncing database policies...", style("→").dim());
            let report = runner.sync_policies().await?;
            print_report(&report);
        }

        DbAction::RunOne(script) => {
            println!(
                "  {} Running {}...",
                style("→").dim(),
                style(&script).cyan()
            );
            let report = runner.run_one(&script).await?;
            print_report(&report);
        }

        DbAction::RunPending => {
            println!("  {} Running pending migrations...", style("→").dim());
            let report = runner.run_pending().await?;
            print_report(&report);
        }
    }

    println!();
    Ok(())
}

fn print_status(status: &MigrationStatus) {
    if status.applied.is_empty() && status.pending.is_empty() {
        println!("  {} No migrations found", style("ℹ").blue());
        return;
    }

    if !status.applied.is_empty() {
        println!("  {} Scripts already played:", style("✓").green());
        for record in &status.applied {
            let at = record
                .created_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "    {:>4} {} {} {}",
                style(record.id).dim(),
                style(&record.script_name).cyan(),
                style("at").dim(),
                at
            );
        }
    }

    if !status.pending.is_empty() {
        if !status.applied.is_empty() {
            println!();
        }
        println!("  {} Scripts to play:", style("○").yellow());
        for name in &status.pending {
            println!("    {} {}", style("→").dim(), style(name).yellow());
        }
    }

    println!();
    println!(
        "  {} {} applied, {} pending ({} local)",
        style("ℹ").blue(),
        status.applied.len(),
        status.pending.len(),
        status.local
    );
}

fn print_report(report: &RunReport) {
    if report.is_empty() {
        println!("  {} Nothing to play", style("ℹ").blue());
        return;
    }

    for run in &report.executed {
        println!(
            "  {} {} {}",
            style("✓").green(),
            style(&run.name).cyan(),
            style(format!("({})", run_detail(run))).dim()
        );
    }
    println!(
        "  {} {} script(s) played",
        style("✓").green(),
        report.executed.len()
    );
}

fn run_detail(run: &ScriptRun) -> String {
    let mut detail = format!(
        "{} row(s), {} ms",
        run.rows_affected,
        run.elapsed.as_millis()
    );
    if !run.recorded {
        detail.push_str(", not recorded");
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;
    use shift_core::scripts::ScriptLayout;
    use shift_runtime::testing::MemoryStore;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn runner(dir: &TempDir, store: &MemoryStore) -> MigrationRunner<MemoryStore> {
        let root = dir.path();
        MigrationRunner::new(
            store.clone(),
            ScriptLayout {
                migrations_dir: root.join("db-migrations"),
                functions_dir: root.join("db-functions"),
                policy_root: root.to_path_buf(),
            },
        )
    }

    #[tokio::test]
    async fn test_every_action_bootstraps_first() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let mut runner = runner(&dir, &store);

        dispatch(&mut runner, DbAction::List).await.unwrap();
        dispatch(&mut runner, DbAction::Revert("a.sql".into()))
            .await
            .unwrap();
        assert_eq!(store.bootstrap_calls(), 2);
    }

    #[tokio::test]
    async fn test_list_does_not_mutate() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("db-migrations")).unwrap();
        fs::write(dir.path().join("db-migrations/a.sql"), "SELECT 1;").unwrap();

        let store = MemoryStore::new();
        let mut runner = runner(&dir, &store);
        dispatch(&mut runner, DbAction::List).await.unwrap();

        assert!(store.records().is_empty());
        assert!(store.executed().is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_propagates() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("db-migrations")).unwrap();
        fs::write(dir.path().join("db-migrations/a.sql"), "OOPS;").unwrap();

        let store = MemoryStore::new().fail_on("OOPS");
        let mut runner = runner(&dir, &store);
        let err = dispatch(&mut runner, DbAction::RunPending)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("a.sql"));
        assert!(store.records().is_empty());
    }

    #[test]
    fn test_run_detail() {
        let mut run = ScriptRun {
            name: "a.sql".into(),
            rows_affected: 3,
            elapsed: Duration::from_millis(12),
            recorded: true,
        };
        assert_eq!(run_detail(&run), "3 row(s), 12 ms");

        run.recorded = false;
        assert_eq!(run_detail(&run), "3 row(s), 12 ms, not recorded");
    }
}
