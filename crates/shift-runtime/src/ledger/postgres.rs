use chrono::NaiveDateTime;
use sqlx::postgres::{PgConnection, PgDatabaseError, PgErrorPosition};
use sqlx::{Connection, Executor};
use tracing::{debug, info, warn};

use shift_core::error::{line_at_position, Diagnostics, Result, ShiftError};
use shift_core::ledger::{is_already_exists, LedgerTable, MigrationRecord};

use super::{MigrationStore, StoreFuture};

/// PostgreSQL-backed store holding the run's single connection.
pub struct PgStore {
    conn: Option<PgConnection>,
    table: LedgerTable,
}

impl PgStore {
    pub fn new(conn: PgConnection, table: LedgerTable) -> Self {
        Self {
            conn: Some(conn),
            table,
        }
    }

    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| ShiftError::Connection("connection already closed".into()))
    }
}

impl MigrationStore for PgStore {
    fn bootstrap(&mut self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let sql = self.table.create_sql();
            let result = self.conn()?.execute(sqlx::raw_sql(&sql)).await;

            match result {
                Ok(_) => {
                    info!("Ledger ready: {}", self.table.qualified());
                    Ok(())
                }
                Err(e) => {
                    let diagnostics = diagnostics(&e, &sql);
                    if is_already_exists(diagnostics.code.as_deref()) {
                        warn!("Ledger already exists, ignoring: {}", diagnostics.message);
                        Ok(())
                    } else {
                        Err(ShiftError::Bootstrap(format!(
                            "Failed to create {}: {}",
                            self.table.qualified(),
                            diagnostics
                        )))
                    }
                }
            }
        })
    }

    fn applied(&mut self) -> StoreFuture<'_, Vec<MigrationRecord>> {
        Box::pin(async move {
            let sql = self.table.select_sql();
            let rows: Vec<(i32, Option<String>, Option<NaiveDateTime>)> =
                sqlx::query_as(&sql).fetch_all(self.conn()?).await?;

            Ok(rows
                .into_iter()
                .filter_map(|(id, script_name, created_at)| {
                    script_name.map(|script_name| MigrationRecord {
                        id,
                        script_name,
                        created_at,
                    })
                })
                .collect())
        })
    }

    fn record<'a>(&'a mut self, script_name: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let sql = self.table.insert_sql();
            debug!("{} <= {}", sql, script_name);
            let id: i32 = sqlx::query_scalar(&sql)
                .bind(script_name)
                .fetch_one(self.conn()?)
                .await?;
            debug!("Recorded {} as ledger row {}", script_name, id);
            Ok(())
        })
    }

    fn remove<'a>(&'a mut self, script_name: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let sql = self.table.delete_sql();
            debug!("{} <= {}", sql, script_name);
            let result = sqlx::query(&sql)
                .bind(script_name)
                .execute(self.conn()?)
                .await?;
            Ok(result.rows_affected())
        })
    }

    fn execute_script<'a>(
        &'a mut self,
        sql: &'a str,
        transactional: bool,
    ) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let conn = self.conn()?;

            if !transactional {
                let result = (&mut *conn)
                    .execute(sqlx::raw_sql(sql))
                    .await
                    .map_err(|e| ShiftError::Statement(diagnostics(&e, sql)))?;
                return Ok(result.rows_affected());
            }

            let mut tx = conn.begin().await?;
            let result = (&mut *tx).execute(sqlx::raw_sql(sql)).await;
            match result {
                Ok(result) => {
                    tx.commit().await?;
                    Ok(result.rows_affected())
                }
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!("Rollback failed: {}", rollback);
                    }
                    Err(ShiftError::Statement(diagnostics(&e, sql)))
                }
            }
        })
    }

    fn close(&mut self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if let Some(conn) = self.conn.take() {
                conn.close().await?;
                debug!("Connection closed");
            }
            Ok(())
        })
    }
}

/// Pull what the driver reported about a failure, locating the error line
/// within `sql` when the server gave a position.
fn diagnostics(err: &sqlx::Error, sql: &str) -> Diagnostics {
    match err {
        sqlx::Error::Database(db) => {
            let mut diagnostics = Diagnostics::message(db.message());
            diagnostics.code = db.code().map(|c| c.into_owned());

            if let Some(pg) = db.try_downcast_ref::<PgDatabaseError>() {
                diagnostics.detail = pg.detail().map(str::to_string);
                diagnostics.hint = pg.hint().map(str::to_string);
                if let Some(PgErrorPosition::Original(position)) = pg.position() {
                    diagnostics.line = line_at_position(sql, position);
                }
            }

            diagnostics
        }
        other => Diagnostics::message(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_error_diagnostics() {
        let d = diagnostics(&sqlx::Error::RowNotFound, "SELECT 1");
        assert!(d.code.is_none());
        assert!(d.line.is_none());
        assert!(!d.message.is_empty());
    }
}
