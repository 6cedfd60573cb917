//! Local script discovery and the pending diff.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;
use crate::policy::POLICY_SEQUENCE;

/// Suffix every migration script must carry.
pub const SCRIPT_SUFFIX: &str = ".sql";

/// Where scripts live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLayout {
    pub migrations_dir: PathBuf,
    pub functions_dir: PathBuf,
    /// Directory holding `functions.sql`, `triggers.sql`, `policies.sql`, `cron.sql`.
    pub policy_root: PathBuf,
}

impl ScriptLayout {
    pub fn script_path(&self, name: &str) -> PathBuf {
        self.migrations_dir.join(name)
    }
}

/// List migration script names in `dir`, lexically sorted.
///
/// Timestamp-prefixed names make the lexical order chronological.
/// A missing directory has no scripts.
pub fn list_scripts(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        warn!("Script directory does not exist: {}", dir.display());
        return Ok(Vec::new());
    }

    let (names, skipped) = scan_dir(dir)?;
    for name in &skipped {
        warn!("Skipping {} in {}: not a {} script", name, dir.display(), SCRIPT_SUFFIX);
    }
    debug!("Found {} scripts in {}", names.len(), dir.display());
    Ok(names)
}

/// Sorted script names plus the other regular files found next to them.
fn scan_dir(dir: &Path) -> Result<(Vec<String>, Vec<String>)> {
    let mut names = Vec::new();
    let mut skipped = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) if name.ends_with(SCRIPT_SUFFIX) => names.push(name.to_string()),
            _ => skipped.push(entry.file_name().to_string_lossy().into_owned()),
        }
    }

    names.sort();
    skipped.sort();
    Ok((names, skipped))
}

/// Scripts present locally but absent from the ledger, in local order.
pub fn pending_scripts<'a, I>(local: &[String], applied: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let applied: HashSet<&str> = applied.into_iter().collect();
    local
        .iter()
        .filter(|name| !applied.contains(name.as_str()))
        .cloned()
        .collect()
}

/// Policy artifact names never enter the ledger.
pub fn is_reserved(script_name: &str) -> bool {
    POLICY_SEQUENCE
        .iter()
        .filter_map(|(_, file)| *file)
        .any(|file| file == script_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pending_is_set_difference() {
        let local = names(&["a.sql", "b.sql", "c.sql"]);
        assert_eq!(pending_scripts(&local, ["b.sql"]), names(&["a.sql", "c.sql"]));
    }

    #[test]
    fn test_pending_ignores_unknown_and_duplicate_ledger_rows() {
        let local = names(&["a.sql", "b.sql"]);
        let applied = ["gone.sql", "a.sql", "a.sql"];
        assert_eq!(pending_scripts(&local, applied), names(&["b.sql"]));
        assert!(pending_scripts(&[], applied).is_empty());
    }

    #[test]
    fn test_list_scripts_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("2024-02-01_00_00_00_000Z-b.sql"), "SELECT 2;").unwrap();
        fs::write(dir.path().join("2024-01-01_00_00_00_000Z-a.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("README.md"), "docs").unwrap();
        fs::write(dir.path().join("backup.sql.bak"), "old").unwrap();
        fs::create_dir(dir.path().join("nested.sql")).unwrap();

        let scripts = list_scripts(dir.path()).unwrap();
        assert_eq!(
            scripts,
            names(&[
                "2024-01-01_00_00_00_000Z-a.sql",
                "2024-02-01_00_00_00_000Z-b.sql"
            ])
        );
    }

    #[test]
    fn test_scan_reports_skipped_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("notes.txt"), "docs").unwrap();
        fs::write(dir.path().join("b.SQL"), "SELECT 2;").unwrap();
        fs::create_dir(dir.path().join("drafts")).unwrap();

        let (scripts, skipped) = scan_dir(dir.path()).unwrap();
        assert_eq!(scripts, names(&["a.sql"]));
        assert_eq!(skipped, names(&["b.SQL", "notes.txt"]));
    }

    #[test]
    fn test_list_scripts_missing_dir() {
        let scripts = list_scripts(Path::new("/nonexistent/migrations")).unwrap();
        assert!(scripts.is_empty());
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved("functions.sql"));
        assert!(is_reserved("policies.sql"));
        assert!(is_reserved("triggers.sql"));
        assert!(is_reserved("cron.sql"));
        assert!(!is_reserved("2024-01-01_00_00_00_000Z-cron.sql"));
    }
}
