// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

use crate::unit::UnitId;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A ledger line failed to parse on load. Fatal to start-up.
    #[error("Corrupt ledger entry at {path:?} line {line}: {source}")]
    CorruptLedgerEntry {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The executor for a unit failed.
    #[error("Execution of issue {unit} failed: {message}")]
    ExecutionError { unit: UnitId, message: String },

    /// The working-tree pre-step for a unit failed; only that unit is affected.
    #[error("Repository state error for issue {unit}: {message}")]
    RepositoryStateError { unit: UnitId, message: String },

    /// The unit's child process was terminated on request.
    #[error("Issue {unit} was terminated before completing")]
    Terminated { unit: UnitId },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BatchError {
    /// Identifier of the unit this error belongs to, if it is unit-scoped.
    pub fn unit(&self) -> Option<UnitId> {
        match self {
            BatchError::ExecutionError { unit, .. }
            | BatchError::RepositoryStateError { unit, .. }
            | BatchError::Terminated { unit } => Some(*unit),
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BatchError>;
