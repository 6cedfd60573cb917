//! The applied-migrations ledger: row type and the SQL that maintains it.

use chrono::NaiveDateTime;

use crate::error::{Result, ShiftError};

/// A row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub id: i32,
    pub script_name: String,
    /// Filled by the column default; only a hand-written row lacks it.
    pub created_at: Option<NaiveDateTime>,
}

/// Qualified name of the ledger table.
///
/// Both parts are interpolated into SQL, so they are restricted to plain
/// unquoted identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTable {
    schema: String,
    table: String,
}

impl Default for LedgerTable {
    fn default() -> Self {
        Self {
            schema: "migrations_ns".to_string(),
            table: "migrations".to_string(),
        }
    }
}

impl LedgerTable {
    pub fn new(schema: &str, table: &str) -> Result<Self> {
        validate_identifier(schema)?;
        validate_identifier(table)?;
        Ok(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Idempotent schema bootstrap.
    pub fn create_sql(&self) -> String {
        format!(
            r#"CREATE SCHEMA IF NOT EXISTS {schema};
CREATE TABLE IF NOT EXISTS {qualified} (
  id SERIAL PRIMARY KEY,
  script_name VARCHAR(100),
  created_at TIMESTAMP DEFAULT NOW()
);"#,
            schema = self.schema,
            qualified = self.qualified()
        )
    }

    pub fn select_sql(&self) -> String {
        format!(
            "SELECT id, script_name, created_at FROM {} ORDER BY script_name, id",
            self.qualified()
        )
    }

    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {}(script_name) VALUES($1) RETURNING id",
            self.qualified()
        )
    }

    pub fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE script_name = $1", self.qualified())
    }
}

fn validate_identifier(ident: &str) -> Result<()> {
    let valid = regex_lite::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
        .map(|re| re.is_match(ident))
        .unwrap_or(false);

    if valid && ident.len() <= 63 {
        Ok(())
    } else {
        Err(ShiftError::Config(format!(
            "Invalid ledger identifier: {:?}",
            ident
        )))
    }
}

/// SQLSTATE codes meaning a concurrent bootstrap won the race.
const ALREADY_EXISTS_CODES: [&str; 3] = ["42P06", "42P07", "23505"];

/// Whether a bootstrap failure only says the ledger already exists.
pub fn is_already_exists(code: Option<&str>) -> bool {
    code.map(|c| ALREADY_EXISTS_CODES.contains(&c))
        .unwrap_or(false)
}
