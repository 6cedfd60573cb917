use std::fmt;

use thiserror::Error;

/// Core error type for shift operations.
#[derive(Error, Debug)]
pub enum ShiftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    #[error("Migration '{script}' can't be played: {diagnostics}")]
    ScriptExecution {
        script: String,
        diagnostics: Diagnostics,
    },

    /// Statement batch failure reported by a store, before the runner
    /// attaches the script name.
    #[error("Statement failed: {0}")]
    Statement(Diagnostics),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

impl ShiftError {
    /// Attach a script name to an execution failure.
    pub fn in_script(self, script: impl Into<String>) -> Self {
        let diagnostics = match self {
            ShiftError::Statement(d) => d,
            ShiftError::ScriptExecution { diagnostics, .. } => diagnostics,
            other => Diagnostics::message(other.to_string()),
        };
        ShiftError::ScriptExecution {
            script: script.into(),
            diagnostics,
        }
    }
}

/// Whatever the driver told us about a failed statement batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub message: String,
    /// SQLSTATE code.
    pub code: Option<String>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// 1-based line within the script text.
    pub line: Option<usize>,
}

impl Diagnostics {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\n  detail: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// Map a 1-based character position (as PostgreSQL reports it) to a
/// 1-based line number in `text`.
pub fn line_at_position(text: &str, position: usize) -> Option<usize> {
    if position == 0 {
        return None;
    }
    let mut line = 1;
    let mut last_line = 1;
    let mut seen = 0;
    for c in text.chars() {
        seen += 1;
        if seen == position {
            return Some(line);
        }
        last_line = line;
        if c == '\n' {
            line += 1;
        }
    }
    // "at end of input" is reported one past the last character.
    if position == seen + 1 {
        return Some(last_line);
    }
    None
}

/// Result type alias using ShiftError.
pub type Result<T> = std::result::Result<T, ShiftError>;
