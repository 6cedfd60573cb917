use std::future::ready;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use shift_core::error::{line_at_position, Diagnostics, Result, ShiftError};
use shift_core::ledger::MigrationRecord;

use crate::ledger::{MigrationStore, StoreFuture};

/// In-memory store.
///
/// Scripts are split on `;` into statements. Each statement is an
/// "effect". A script is one batch: like a PostgreSQL simple query, its
/// effects become visible only when every statement succeeds, whether or
/// not an explicit transaction wraps it. A statement containing a
/// registered failure marker fails the batch. A `CONCURRENTLY` statement
/// fails inside a transaction block, explicit or implicit, the way the
/// server rejects it. Clones share state, so a test can keep a handle while
/// the runner owns another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    bootstrap_calls: usize,
    records: Vec<MigrationRecord>,
    next_id: i32,
    executed: Vec<String>,
    effects: Vec<String>,
    fail_markers: Vec<String>,
    closed: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `script_name` already in the ledger.
    pub fn with_record(self, script_name: &str) -> Self {
        self.lock().insert(script_name);
        self
    }

    /// Fail any statement containing `marker`.
    pub fn fail_on(self, marker: &str) -> Self {
        self.lock().fail_markers.push(marker.to_string());
        self
    }

    pub fn bootstrap_calls(&self) -> usize {
        self.lock().bootstrap_calls
    }

    pub fn records(&self) -> Vec<MigrationRecord> {
        self.lock().records.clone()
    }

    pub fn recorded_names(&self) -> Vec<String> {
        self.lock()
            .records
            .iter()
            .map(|r| r.script_name.clone())
            .collect()
    }

    /// Script texts handed to `execute_script`, successful or not.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Committed statements.
    pub fn effects(&self) -> Vec<String> {
        self.lock().effects.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with_open<T>(&self, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut state = self.lock();
        if state.closed {
            return Err(ShiftError::Connection("connection already closed".into()));
        }
        f(&mut state)
    }
}

impl State {
    fn insert(&mut self, script_name: &str) {
        self.next_id += 1;
        self.records.push(MigrationRecord {
            id: self.next_id,
            script_name: script_name.to_string(),
            created_at: Some(Utc::now().naive_utc()),
        });
    }

    fn execute(&mut self, sql: &str, transactional: bool) -> Result<u64> {
        self.executed.push(sql.to_string());

        let mut statements = Vec::new();
        let mut offset = 0;
        for raw in sql.split(';') {
            let start = offset + (raw.len() - raw.trim_start().len());
            offset += raw.len() + 1;

            let statement = raw.trim();
            if !statement.is_empty() {
                statements.push((start, statement));
            }
        }

        let in_block = transactional || statements.len() > 1;
        let mut pending = Vec::new();
        for (start, statement) in statements {
            let position = sql[..start].chars().count() + 1;

            if self.fail_markers.iter().any(|m| statement.contains(m.as_str())) {
                return Err(ShiftError::Statement(Diagnostics {
                    message: format!("syntax error at or near \"{}\"", statement),
                    code: Some("42601".into()),
                    line: line_at_position(sql, position),
                    ..Default::default()
                }));
            }

            if in_block && statement.contains("CONCURRENTLY") {
                return Err(ShiftError::Statement(Diagnostics {
                    message: "cannot run inside a transaction block".into(),
                    code: Some("25001".into()),
                    line: line_at_position(sql, position),
                    ..Default::default()
                }));
            }

            pending.push(statement.to_string());
        }

        let count = pending.len() as u64;
        self.effects.extend(pending);
        Ok(count)
    }
}

impl MigrationStore for MemoryStore {
    fn bootstrap(&mut self) -> StoreFuture<'_, ()> {
        Box::pin(ready(self.with_open(|state| {
            state.bootstrap_calls += 1;
            Ok(())
        })))
    }

    fn applied(&mut self) -> StoreFuture<'_, Vec<MigrationRecord>> {
        Box::pin(ready(self.with_open(|state| {
            let mut records = state.records.clone();
            records.sort_by(|a, b| a.script_name.cmp(&b.script_name).then(a.id.cmp(&b.id)));
            Ok(records)
        })))
    }

    fn record<'a>(&'a mut self, script_name: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(ready(self.with_open(|state| {
            state.insert(script_name);
            Ok(())
        })))
    }

    fn remove<'a>(&'a mut self, script_name: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(ready(self.with_open(|state| {
            let before = state.records.len();
            state.records.retain(|r| r.script_name != script_name);
            Ok((before - state.records.len()) as u64)
        })))
    }

    fn execute_script<'a>(
        &'a mut self,
        sql: &'a str,
        transactional: bool,
    ) -> StoreFuture<'a, u64> {
        Box::pin(ready(
            self.with_open(|state| state.execute(sql, transactional)),
        ))
    }

    fn close(&mut self) -> StoreFuture<'_, ()> {
        self.lock().closed = true;
        Box::pin(ready(Ok(())))
    }
}
