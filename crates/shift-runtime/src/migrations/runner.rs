//! Migration runner.
//!
//! Plays scripts strictly in filesystem order over the injected store, one
//! transaction per script. The first failure aborts the queue; nothing is
//! recorded for a script whose commit did not succeed.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use shift_core::error::{Result, ShiftError};
use shift_core::ledger::MigrationRecord;
use shift_core::policy::policy_plan;
use shift_core::scripts::{is_reserved, list_scripts, pending_scripts, ScriptLayout};
use tracing::{debug, error, info, warn};

use crate::ledger::MigrationStore;

/// Applied vs pending, as seen by one invocation.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub applied: Vec<MigrationRecord>,
    pub pending: Vec<String>,
    /// Number of scripts found on disk.
    pub local: usize,
}

/// One successfully executed script.
#[derive(Debug, Clone)]
pub struct ScriptRun {
    pub name: String,
    pub rows_affected: u64,
    pub elapsed: Duration,
    pub recorded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub executed: Vec<ScriptRun>,
}

impl RunReport {
    pub fn names(&self) -> Vec<&str> {
        self.executed.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.executed.is_empty()
    }
}

struct QueuedScript {
    name: String,
    path: PathBuf,
}

/// Migration runner over an injected store.
pub struct MigrationRunner<S> {
    store: S,
    layout: ScriptLayout,
    transactional: bool,
}

impl<S: MigrationStore> MigrationRunner<S> {
    pub fn new(store: S, layout: ScriptLayout) -> Self {
        Self {
            store,
            layout,
            transactional: true,
        }
    }

    /// Enable or disable the per-script transaction.
    ///
    /// Without it each script is still sent as one batch, which the server
    /// runs as an implicit transaction; statements that refuse any
    /// transaction block only work as the sole statement of their script.
    pub fn transactional(mut self, enabled: bool) -> Self {
        self.transactional = enabled;
        self
    }

    /// Create the ledger if it does not exist yet.
    pub async fn bootstrap(&mut self) -> Result<()> {
        self.store.bootstrap().await
    }

    /// Ledger rows and the scripts still to play.
    pub async fn status(&mut self) -> Result<MigrationStatus> {
        let applied = self.store.applied().await?;
        let local = list_scripts(&self.layout.migrations_dir)?;
        let pending = pending_scripts(&local, applied.iter().map(|r| r.script_name.as_str()));
        debug!(
            "{} local scripts, {} ledger rows, {} pending",
            local.len(),
            applied.len(),
            pending.len()
        );

        Ok(MigrationStatus {
            applied,
            pending,
            local: local.len(),
        })
    }

    /// Play every pending script in order.
    pub async fn run_pending(&mut self) -> Result<RunReport> {
        let status = self.status().await?;
        info!(
            "({}) migration scripts, {} will be played",
            status.local,
            status.pending.len()
        );

        let queue = status
            .pending
            .into_iter()
            .map(|name| self.queued(name))
            .collect();
        self.play(queue, true).await
    }

    /// Play exactly `script`, whether or not it is already applied.
    pub async fn run_one(&mut self, script: &str) -> Result<RunReport> {
        let queue = vec![self.queued(script.to_string())];
        self.play(queue, true).await
    }

    /// Record `script` as applied without running it.
    ///
    /// Returns false for policy artifact names, which are never recorded.
    pub async fn skip(&mut self, script: &str) -> Result<bool> {
        let recorded = self.record(script).await?;
        if recorded {
            info!("Skipped permanently {}", script);
        }
        Ok(recorded)
    }

    /// Forget `script` in the ledger. Its SQL effects stay in place.
    pub async fn revert(&mut self, script: &str) -> Result<u64> {
        let removed = self.store.remove(script).await?;
        if removed == 0 {
            info!("No ledger row for {}, nothing reverted", script);
        } else {
            info!("Reverted migration {} ({} row(s))", script, removed);
        }
        Ok(removed)
    }

    /// Replay the policy artifacts in their fixed order, unrecorded.
    pub async fn sync_policies(&mut self) -> Result<RunReport> {
        let queue = policy_plan(&self.layout)?
            .into_iter()
            .map(|artifact| {
                debug!("Queued {:?} artifact {}", artifact.kind, artifact.name);
                QueuedScript {
                    name: artifact.name,
                    path: artifact.path,
                }
            })
            .collect();
        self.play(queue, false).await
    }

    /// Close the store's connection.
    pub async fn close(mut self) -> Result<()> {
        self.store.close().await
    }

    fn queued(&self, name: String) -> QueuedScript {
        QueuedScript {
            path: self.layout.script_path(&name),
            name,
        }
    }

    async fn record(&mut self, script: &str) -> Result<bool> {
        if is_reserved(script) {
            debug!("{} is a policy artifact, not recorded", script);
            return Ok(false);
        }
        self.store.record(script).await?;
        Ok(true)
    }

    async fn play(&mut self, queue: Vec<QueuedScript>, record: bool) -> Result<RunReport> {
        let mut report = RunReport::default();

        if !self.transactional && !queue.is_empty() {
            warn!("Transactions disabled: only single-statement scripts escape the transaction block");
        }

        for script in queue {
            info!("Starting migration: {}", script.name);

            let sql = std::fs::read_to_string(&script.path)
                .map_err(|e| ShiftError::from(e).in_script(&script.name))?;

            let started = Instant::now();
            let rows_affected = match self.store.execute_script(&sql, self.transactional).await {
                Ok(rows) => rows,
                Err(e) => {
                    let e = e.in_script(&script.name);
                    if self.transactional {
                        error!("Rolled back {}", script.name);
                    } else {
                        error!("{} failed outside an explicit transaction", script.name);
                    }
                    return Err(e);
                }
            };
            let elapsed = started.elapsed();
            debug!("Result for {}: {} row(s) affected", script.name, rows_affected);

            let recorded = if record {
                self.record(&script.name).await?
            } else {
                false
            };
            info!(
                "Committed {} in {:?}{}",
                script.name,
                elapsed,
                if recorded { ", recorded" } else { "" }
            );

            report.executed.push(ScriptRun {
                name: script.name,
                rows_affected,
                elapsed,
                recorded,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn layout(root: &Path) -> ScriptLayout {
        ScriptLayout {
            migrations_dir: root.join("db-migrations"),
            functions_dir: root.join("db-functions"),
            policy_root: root.to_path_buf(),
        }
    }

    fn write_script(root: &Path, name: &str, sql: &str) {
        let dir = root.join("db-migrations");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), sql).unwrap();
    }

    async fn runner_with(
        dir: &TempDir,
        store: &MemoryStore,
    ) -> MigrationRunner<MemoryStore> {
        let mut runner = MigrationRunner::new(store.clone(), layout(dir.path()));
        runner.bootstrap().await.unwrap();
        runner
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let mut runner = runner_with(&dir, &store).await;
        runner.bootstrap().await.unwrap();
        assert_eq!(store.bootstrap_calls(), 2);
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_status_lists_pending_in_order() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "c.sql", "SELECT 3;");
        write_script(dir.path(), "a.sql", "SELECT 1;");
        write_script(dir.path(), "b.sql", "SELECT 2;");

        let store = MemoryStore::new().with_record("b.sql");
        let mut runner = runner_with(&dir, &store).await;

        let status = runner.status().await.unwrap();
        assert_eq!(status.pending, vec!["a.sql", "c.sql"]);
        assert_eq!(status.applied.len(), 1);
        assert_eq!(status.local, 3);
        assert!(store.executed().is_empty());
    }

    #[tokio::test]
    async fn test_run_pending_records_each_script() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "0001-a.sql", "CREATE TABLE a;");
        write_script(dir.path(), "0002-b.sql", "CREATE TABLE b;");

        let store = MemoryStore::new();
        let mut runner = runner_with(&dir, &store).await;

        let report = runner.run_pending().await.unwrap();
        assert_eq!(report.names(), vec!["0001-a.sql", "0002-b.sql"]);
        assert_eq!(store.recorded_names(), vec!["0001-a.sql", "0002-b.sql"]);
        assert_eq!(store.effects(), vec!["CREATE TABLE a", "CREATE TABLE b"]);

        // Nothing left on a second run.
        let report = runner.run_pending().await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_queue_aborts_on_first_failure() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "x.sql", "CREATE TABLE x;\nBROKEN;");
        write_script(dir.path(), "y.sql", "CREATE TABLE y;");

        let store = MemoryStore::new().fail_on("BROKEN");
        let mut runner = runner_with(&dir, &store).await;

        let err = runner.run_pending().await.unwrap_err();
        match err {
            ShiftError::ScriptExecution {
                script,
                diagnostics,
            } => {
                assert_eq!(script, "x.sql");
                assert_eq!(diagnostics.line, Some(2));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert_eq!(store.executed().len(), 1);
        assert!(store.records().is_empty());
        assert!(store.effects().is_empty());
    }

    #[tokio::test]
    async fn test_transactional_failure_commits_nothing() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "t.sql", "UPDATE t SET a = 1;\nBROKEN;");

        let store = MemoryStore::new().fail_on("BROKEN");
        let mut runner = runner_with(&dir, &store).await;

        assert!(runner.run_one("t.sql").await.is_err());
        assert!(store.effects().is_empty());
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_index_needs_transactions_disabled() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "i.sql", "CREATE INDEX CONCURRENTLY i ON t (a);");

        let store = MemoryStore::new();
        let mut runner = runner_with(&dir, &store).await;
        assert!(runner.run_one("i.sql").await.is_err());
        assert!(store.records().is_empty());

        let mut runner = runner.transactional(false);
        runner.run_one("i.sql").await.unwrap();
        assert_eq!(store.effects(), vec!["CREATE INDEX CONCURRENTLY i ON t (a)"]);
        assert_eq!(store.recorded_names(), vec!["i.sql"]);
    }

    #[tokio::test]
    async fn test_non_transactional_failure_keeps_earlier_scripts() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "a.sql", "CREATE TABLE a;");
        write_script(dir.path(), "b.sql", "CREATE TABLE b;\nBROKEN;");

        let store = MemoryStore::new().fail_on("BROKEN");
        let mut runner = runner_with(&dir, &store).await.transactional(false);

        assert!(runner.run_pending().await.is_err());
        assert_eq!(store.effects(), vec!["CREATE TABLE a"]);
        assert_eq!(store.recorded_names(), vec!["a.sql"]);
    }

    #[tokio::test]
    async fn test_run_one_replays_applied_script() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "a.sql", "SELECT 1;");

        let store = MemoryStore::new().with_record("a.sql");
        let mut runner = runner_with(&dir, &store).await;

        let report = runner.run_one("a.sql").await.unwrap();
        assert_eq!(report.names(), vec!["a.sql"]);
        assert_eq!(store.recorded_names(), vec!["a.sql", "a.sql"]);
    }

    #[tokio::test]
    async fn test_run_one_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let mut runner = runner_with(&dir, &store).await;

        let err = runner.run_one("missing.sql").await.unwrap_err();
        assert!(matches!(err, ShiftError::ScriptExecution { ref script, .. } if script == "missing.sql"));
        assert!(store.executed().is_empty());
    }

    #[tokio::test]
    async fn test_skip_records_without_executing() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "a.sql", "ALTER TABLE t ADD COLUMN c TEXT;");

        let store = MemoryStore::new();
        let mut runner = runner_with(&dir, &store).await;

        assert!(runner.skip("a.sql").await.unwrap());
        assert_eq!(store.recorded_names(), vec!["a.sql"]);
        assert!(store.executed().is_empty());
        assert!(runner.status().await.unwrap().pending.is_empty());
    }

    #[tokio::test]
    async fn test_skip_never_records_policy_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let mut runner = runner_with(&dir, &store).await;

        assert!(!runner.skip("policies.sql").await.unwrap());
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_revert_removes_row_once() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new().with_record("a.sql").with_record("b.sql");
        let mut runner = runner_with(&dir, &store).await;

        assert_eq!(runner.revert("a.sql").await.unwrap(), 1);
        assert_eq!(store.recorded_names(), vec!["b.sql"]);
        assert_eq!(runner.revert("a.sql").await.unwrap(), 0);
        assert_eq!(store.recorded_names(), vec!["b.sql"]);
        assert!(store.executed().is_empty());
    }

    #[tokio::test]
    async fn test_sync_policies_order_and_no_ledger() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("db-functions")).unwrap();
        fs::write(root.join("db-functions").join("2-b.sql"), "FN B;").unwrap();
        fs::write(root.join("db-functions").join("1-a.sql"), "FN A;").unwrap();
        for file in ["functions.sql", "triggers.sql", "policies.sql", "cron.sql"] {
            fs::write(root.join(file), format!("RUN {};", file)).unwrap();
        }

        let store = MemoryStore::new();
        let mut runner = runner_with(&dir, &store).await;

        let report = runner.sync_policies().await.unwrap();
        assert_eq!(
            report.names(),
            vec![
                "functions.sql",
                "db-functions/1-a.sql",
                "db-functions/2-b.sql",
                "triggers.sql",
                "policies.sql",
                "cron.sql",
            ]
        );
        assert_eq!(
            store.effects(),
            vec![
                "RUN functions.sql",
                "FN A",
                "FN B",
                "RUN triggers.sql",
                "RUN policies.sql",
                "RUN cron.sql",
            ]
        );
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_sync_policies_missing_artifact_aborts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("functions.sql"), "RUN functions;").unwrap();

        let store = MemoryStore::new();
        let mut runner = runner_with(&dir, &store).await;

        let err = runner.sync_policies().await.unwrap_err();
        assert!(matches!(err, ShiftError::ScriptExecution { ref script, .. } if script == "triggers.sql"));
        assert_eq!(store.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_close_releases_store() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let runner = runner_with(&dir, &store).await;
        runner.close().await.unwrap();
        assert!(store.is_closed());
    }
}
