//! Imaging parameter and error types.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Bounded-resize parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeSpec {
    /// Longest allowed side in pixels.
    pub max_dimension: u32,
}

impl ResizeSpec {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

/// Watermark parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSpec {
    /// Overlay asset, expected to be square.
    pub overlay_path: PathBuf,
    /// Blend coefficient in [0, 1].
    pub opacity: f64,
}

impl WatermarkSpec {
    pub fn new(overlay_path: PathBuf, opacity: f64) -> Self {
        Self {
            overlay_path,
            opacity,
        }
    }

    /// Opacity 0 means the watermark is a no-op.
    pub fn is_noop(&self) -> bool {
        self.opacity <= 0.0
    }
}

/// Errors from image decoding, transformation and encoding.
#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },

    #[error("Failed to read TIFF tags of {path}: {source}")]
    Tags {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("Invalid image parameters: {0}")]
    InvalidSpec(String),
}

impl ImagingError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn decode(path: &Path, source: image::ImageError) -> Self {
        Self::Decode {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn tags(path: &Path, source: tiff::TiffError) -> Self {
        Self::Tags {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn encode(path: &Path, message: impl std::fmt::Display) -> Self {
        Self::Encode {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// Result type for imaging operations.
pub type ImagingResult<T> = Result<T, ImagingError>;
