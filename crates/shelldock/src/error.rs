//! Error taxonomy for the command repository

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Repository errors
#[derive(Error, Debug)]
pub enum ShellDockError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Revision {revision} not found for entry: {entry}")]
    RevisionNotFound { entry: String, revision: u64 },

    #[error("Entry already exists: {0}")]
    DuplicateKey(String),

    #[error("No value for placeholder '{name}' in entry '{entry}' - pass it with --arg {name}=VALUE")]
    PlaceholderMissing { entry: String, name: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Corrupt record in {} at line {line}: {reason}", .path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ShellDockError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Process exit code reported by the CLI for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_) | Self::RevisionNotFound { .. } => 1,
            Self::DuplicateKey(_) => 2,
            Self::PlaceholderMissing { .. } | Self::InvalidInput(_) => 3,
            Self::Corrupt { .. } => 4,
            Self::Io { .. } | Self::Serialization(_) => 5,
            Self::Cancelled => 130,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShellDockError>;
