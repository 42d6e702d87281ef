//! Error types for the orchestrator.
//!
//! Step errors never leave a step run: the lifecycle turns them into a
//! failed [`StepResult`]. Pipeline errors are about the batch itself
//! (lookup, settings, persisting progress).
//!
//! [`StepResult`]: super::types::StepResult

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::embed::ToolError;
use crate::imaging::ImagingError;
use crate::mapping::MappingError;
use crate::registry::RegistryError;

/// Batch-level pipeline error.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Batch settings: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No step is registered for slot {0}")]
    MissingStep(u8),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Error from a pipeline step.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("input validation failed: {0}")]
    InvalidInput(String),

    #[error("output validation failed: {0}")]
    InvalidOutput(String),

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Imaging(#[from] ImagingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl StepError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// I/O error with the operation that failed.
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Result type for step operations.
pub type StepOpResult<T> = Result<T, StepError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
