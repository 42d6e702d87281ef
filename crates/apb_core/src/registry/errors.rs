//! Registry error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::storage::LockError;

/// Errors from registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Batch not found: {0}")]
    NotFound(String),

    /// An active batch already points at the directory.
    #[error("Directory {directory} is already used by active batch '{existing_id}'")]
    DuplicateBatch {
        directory: PathBuf,
        existing_id: String,
    },

    /// The batch still has pending steps.
    #[error("Batch '{id}' is incomplete; pending steps: {pending:?}")]
    IncompleteBatch { id: String, pending: Vec<u8> },

    #[error("Invalid step number {0} (expected 1-8)")]
    InvalidStep(u8),

    #[error("Registry lock failed: {0}")]
    Lock(#[from] LockError),

    #[error("Registry I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Registry file is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

impl RegistryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
