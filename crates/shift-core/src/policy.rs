//! The fixed policy-sync sequence.
//!
//! Artifacts are replayed in this exact order and never recorded in the
//! ledger, so every artifact must be written to be re-runnable
//! (`CREATE OR REPLACE`, `DROP ... IF EXISTS`).

use std::path::PathBuf;

use crate::error::Result;
use crate::scripts::{list_scripts, ScriptLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Shared helper functions (`functions.sql`).
    Functions,
    /// One file of the functions directory.
    FunctionFile,
    Triggers,
    /// Row-level-security policies.
    Policies,
    Cron,
}

/// Sync order. `FunctionFile` expands to every script of the functions
/// directory.
pub const POLICY_SEQUENCE: [(ArtifactKind, Option<&str>); 5] = [
    (ArtifactKind::Functions, Some("functions.sql")),
    (ArtifactKind::FunctionFile, None),
    (ArtifactKind::Triggers, Some("triggers.sql")),
    (ArtifactKind::Policies, Some("policies.sql")),
    (ArtifactKind::Cron, Some("cron.sql")),
];

/// A concrete file to replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyArtifact {
    pub kind: ArtifactKind,
    /// Name used in logs and errors.
    pub name: String,
    pub path: PathBuf,
}

/// Expand the sequence against the layout on disk.
pub fn policy_plan(layout: &ScriptLayout) -> Result<Vec<PolicyArtifact>> {
    let mut plan = Vec::new();

    for (kind, file) in POLICY_SEQUENCE {
        match file {
            Some(file) => plan.push(PolicyArtifact {
                kind,
                name: file.to_string(),
                path: layout.policy_root.join(file),
            }),
            None => {
                let dir_name = layout
                    .functions_dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("functions");
                for script in list_scripts(&layout.functions_dir)? {
                    plan.push(PolicyArtifact {
                        kind,
                        name: format!("{}/{}", dir_name, script),
                        path: layout.functions_dir.join(&script),
                    });
                }
            }
        }
    }

    Ok(plan)
}
