//! Core types for the orchestrator pipeline.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use super::pipeline::CancelHandle;
use crate::config::BatchSettings;
use crate::logging::BatchLogger;
use crate::models::{Batch, BatchLayout};

/// Progress callback type for reporting pipeline progress.
///
/// Arguments: (step_name, percent_complete, message)
pub type ProgressCallback = Box<dyn Fn(&str, u32, &str) + Send + Sync>;

/// Read-only context passed to pipeline steps.
///
/// Built once per run. Steps read the batch snapshot and settings; their
/// outputs go to the batch directory tree.
pub struct StepContext {
    /// Batch snapshot taken when the run started.
    pub batch: Batch,
    /// Directory layout of the batch.
    pub layout: BatchLayout,
    /// Validated batch settings.
    pub settings: BatchSettings,
    /// Per-run logger.
    pub logger: Arc<BatchLogger>,
    cancel: CancelHandle,
    progress_callback: Option<ProgressCallback>,
}

impl StepContext {
    pub fn new(
        batch: Batch,
        settings: BatchSettings,
        logger: Arc<BatchLogger>,
        cancel: CancelHandle,
    ) -> Self {
        let layout = BatchLayout::new(batch.root.clone());
        Self {
            batch,
            layout,
            settings,
            logger,
            cancel,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Report progress to callback (if set).
    pub fn report_progress(&self, step_name: &str, percent: u32, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(step_name, percent, message);
        }
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Lifecycle state of one step run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    #[default]
    Created,
    Setup,
    InputValidated,
    Executed,
    OutputValidated,
    Complete,
    Failed,
}

/// One file that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub item: String,
    pub reason: String,
}

/// Counters collected while a step executes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepStats {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failed_items: Vec<FailedItem>,
    pub warnings: usize,
}

impl StepStats {
    /// Record a per-file failure.
    pub fn fail(&mut self, item: impl Into<String>, reason: impl Into<String>) {
        self.failed += 1;
        self.failed_items.push(FailedItem {
            item: item.into(),
            reason: reason.into(),
        });
    }

    /// Items that were attempted (processed or failed).
    pub fn attempted(&self) -> usize {
        self.processed + self.failed
    }

    /// Short summary for log lines.
    pub fn summary(&self) -> String {
        let mut text = format!("{} processed", self.processed);
        if self.failed > 0 {
            text.push_str(&format!(", {} failed", self.failed));
        }
        if self.skipped > 0 {
            text.push_str(&format!(", {} skipped", self.skipped));
        }
        if self.warnings > 0 {
            text.push_str(&format!(", {} warnings", self.warnings));
        }
        text
    }
}

/// Outcome of a step's execute phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step did its work.
    Success(String),
    /// Nothing to do; counts as success.
    Skipped(String),
}

impl StepOutcome {
    pub fn message(&self) -> &str {
        match self {
            Self::Success(m) | Self::Skipped(m) => m,
        }
    }
}

/// Blocking errors and non-blocking warnings from a validation phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors joined for a result message.
    pub fn error_text(&self) -> String {
        self.errors.join("; ")
    }
}

/// Result of running one step through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub step: u8,
    pub name: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StepStats>,
    pub state: StepState,
}

impl StepResult {
    pub fn failed(step: u8, name: &str, message: impl Into<String>, stats: Option<StepStats>) -> Self {
        Self {
            step,
            name: name.to_string(),
            success: false,
            message: message.into(),
            stats,
            state: StepState::Failed,
        }
    }
}

/// What a caller asks the orchestrator to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Inclusive step range. `None` runs from the next pending step to the end.
    pub range: Option<RangeInclusive<u8>>,
    /// Validate inputs only; nothing is executed or persisted.
    pub dry_run: bool,
    /// Re-run steps already marked complete.
    pub force: bool,
}

impl RunRequest {
    /// Run every pending step.
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn range(from: u8, to: u8) -> Self {
        Self {
            range: Some(from..=to),
            ..Self::default()
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineRunResult {
    pub batch_id: String,
    /// Step results in execution order.
    pub results: Vec<StepResult>,
    /// Steps skipped because they were already complete.
    pub skipped: Vec<u8>,
    /// The step that halted the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<u8>,
    pub message: String,
    pub dry_run: bool,
    pub cancelled: bool,
    /// Whether the batch is now fully complete.
    pub batch_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_path: Option<PathBuf>,
}

impl PipelineRunResult {
    /// True when no step failed and the run was not cancelled.
    pub fn success(&self) -> bool {
        self.failed_step.is_none() && !self.cancelled
    }

    /// Step numbers that ran (or, for dry runs, would run).
    pub fn steps_run(&self) -> Vec<u8> {
        self.results.iter().map(|r| r.step).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_summary_lists_nonzero_counts() {
        let mut stats = StepStats {
            processed: 4,
            ..Default::default()
        };
        assert_eq!(stats.summary(), "4 processed");

        stats.fail("A-002.tif", "file is locked");
        stats.skipped = 1;
        assert_eq!(stats.summary(), "4 processed, 1 failed, 1 skipped");
        assert_eq!(stats.attempted(), 5);
        assert_eq!(stats.failed_items[0].item, "A-002.tif");
    }

    #[test]
    fn validation_joins_errors() {
        let mut v = Validation::ok();
        assert!(v.is_ok());
        v.warn("one column dropped");
        assert!(v.is_ok());
        v.error("no TIFFs");
        v.error("no spreadsheet");
        assert!(!v.is_ok());
        assert_eq!(v.error_text(), "no TIFFs; no spreadsheet");
    }

    #[test]
    fn run_request_builders() {
        let req = RunRequest::range(2, 5).dry_run();
        assert_eq!(req.range, Some(2..=5));
        assert!(req.dry_run);
        assert!(!req.force);
        assert_eq!(RunRequest::pending().range, None);
    }

    #[test]
    fn step_result_serializes_state() {
        let result = StepResult::failed(4, "Normalize depth", "setup failed: x", None);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"state\":\"failed\""));
        assert!(!json.contains("stats"));
    }
}
