//! Per-batch configuration.
//!
//! This module provides:
//! - TOML-based settings with logical sections
//! - Lazy loading, with defaults applied to missing keys
//! - Locked, section-level read-modify-write updates
//! - Atomic file writes (write to temp, then rename)
//!
//! # Example
//!
//! ```no_run
//! use apb_core::config::{ConfigSection, ConfigStore};
//!
//! let mut store = ConfigStore::new("/archive/batch_01/config/batch.toml");
//! println!("Max size: {}", store.settings().unwrap().resize.max_dimension);
//!
//! store
//!     .update(ConfigSection::Resize, |s| s.resize.max_dimension = 2048)
//!     .unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigResult, ConfigStore};
pub use settings::{
    step_key, BatchSettings, ConfigSection, EmbeddingSettings, InputSettings, JpegSettings,
    MappingSettings, ResizeSettings, ValidationSettings, WatermarkSettings,
};
