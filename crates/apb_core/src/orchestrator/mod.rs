//! Pipeline orchestrator for running batches through their eight steps.
//!
//! Each batch goes through a fixed sequence of steps. Every step runs
//! through the same lifecycle (setup, input validation, execution, output
//! validation, cleanup), and its completion is persisted before the next
//! one starts, so a run can stop at any point and resume later.
//!
//! # Architecture
//!
//! ```text
//! PipelineOrchestrator
//!     ├── 1 Initialize        stage sources into input/
//!     ├── 2 Map spreadsheet   catalog rows -> metadata.csv
//!     ├── 3 Match images      records <-> scans, match report
//!     ├── 4 Normalize depth   8 bits per channel
//!     ├── 5 Embed metadata    IIM + XMP via exiftool
//!     ├── 6 Convert to JPEG
//!     ├── 7 Resize JPEG
//!     └── 8 Watermark         restricted images only
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use apb_core::orchestrator::{PipelineOrchestrator, RunRequest};
//! use apb_core::registry::BatchRegistry;
//!
//! let registry = Arc::new(BatchRegistry::open("/archive/registry.json"));
//! let mut orchestrator = PipelineOrchestrator::new(registry);
//!
//! let result = orchestrator.run("batch-id", RunRequest::pending(), None)?;
//! println!("{}", result.message);
//! # Ok::<(), apb_core::orchestrator::PipelineError>(())
//! ```

mod errors;
pub mod lifecycle;
mod pipeline;
pub mod step;
pub mod steps;
mod types;

pub use errors::{PipelineError, PipelineResult, StepError, StepOpResult};
pub use lifecycle::{run_step, validate_only};
pub use pipeline::{CancelHandle, PipelineOrchestrator};
pub use step::PipelineStep;
pub use steps::{
    ConvertJpegStep, EmbedMetadataStep, InitializeStep, MapSpreadsheetStep, MatchImagesStep,
    NormalizeDepthStep, ResizeStep, WatermarkStep,
};
pub use types::{
    FailedItem, PipelineRunResult, ProgressCallback, RunRequest, StepContext, StepOutcome,
    StepResult, StepState, StepStats, Validation,
};
