//! Scaffolding for new migration and function files.
//!
//! Nothing here touches the database.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{Result, ShiftError};
use crate::template::render;
use crate::template_vars;

const MIGRATION_TEMPLATE: &str = r#"
-- YOUR SQL QUERIES
ALTER TABLE XXX ADD COLUMN IF NOT EXISTS YYY TEXT default '';
COMMENT on column XXX.YYY is 'a comment';
"#;

const FUNCTION_TEMPLATE: &str = r#"
-- Function: {{name}}
-- Description: Add your function description here

CREATE OR REPLACE FUNCTION {{snake}}(
  -- Add your parameters here
  -- param1 TEXT,
  -- param2 INTEGER
)
RETURNS TABLE (
  -- Define your return columns here
  -- column1 TEXT,
  -- column2 INTEGER
) AS $$
BEGIN
  -- Your function logic here

  -- Example:
  -- RETURN QUERY
  --   SELECT column1, column2
  --   FROM some_table
  --   WHERE condition;

END;
$$ LANGUAGE plpgsql;

-- Add comment to function
COMMENT ON FUNCTION {{snake}} IS 'Add your function description here';
"#;

/// Timestamp prefix for scaffolded files, e.g. `2024-01-01_12_30_45_123Z`.
pub fn timestamp_prefix(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d_%H_%M_%S_%3fZ").to_string()
}

/// `<timestamp>-<name>.sql`
pub fn script_file_name(now: DateTime<Utc>, name: &str) -> String {
    format!("{}-{}.sql", timestamp_prefix(now), name)
}

/// Convert a free-form name to snake_case.
///
/// A lowercase letter followed by an uppercase one gets an underscore,
/// runs of whitespace and hyphens collapse to one underscore, and the
/// result is lowercased.
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let mut prev: Option<char> = None;
    let mut in_separator = false;

    for c in s.chars() {
        if c.is_whitespace() || c == '-' {
            if !in_separator {
                result.push('_');
                in_separator = true;
            }
            prev = Some(c);
            continue;
        }
        in_separator = false;

        if c.is_ascii_uppercase() && prev.is_some_and(|p| p.is_ascii_lowercase()) {
            result.push('_');
        }
        result.extend(c.to_lowercase());
        prev = Some(c);
    }

    result
}

pub fn render_migration() -> String {
    MIGRATION_TEMPLATE.to_string()
}

pub fn render_function(name: &str) -> String {
    let snake = to_snake_case(name);
    render(
        FUNCTION_TEMPLATE,
        &template_vars!("name" => name, "snake" => snake.as_str()),
    )
}

/// Write a new migration template into `dir`.
pub fn create_migration(dir: &Path, name: &str, now: DateTime<Utc>) -> Result<PathBuf> {
    let name = validate_name(name)?;
    let path = dir.join(script_file_name(now, name));
    write_new(&path, &render_migration())?;
    info!("Created migration {}", path.display());
    Ok(path)
}

/// Write a new function template into `dir`.
pub fn create_function(dir: &Path, name: &str, now: DateTime<Utc>) -> Result<PathBuf> {
    let name = validate_name(name)?;
    let snake = to_snake_case(name);
    info!("Converting function name to snake_case: {} -> {}", name, snake);

    let path = dir.join(script_file_name(now, &snake));
    write_new(&path, &render_function(name))?;
    info!("Created function template {}", path.display());
    Ok(path)
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ShiftError::Usage("a name is required".into()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(ShiftError::Usage(format!(
            "name must not contain path separators: {}",
            name
        )));
    }
    Ok(name)
}

/// Create `path` with `content`, refusing to overwrite.
fn write_new(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                ShiftError::Usage(format!("File already exists: {}", path.display()))
            } else {
                ShiftError::Io(e)
            }
        })?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    Ok(())
}
