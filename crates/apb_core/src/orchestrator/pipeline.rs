//! Pipeline orchestrator that runs a batch's steps in slot order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;

use super::errors::{PipelineError, PipelineResult};
use super::lifecycle::{run_step, validate_only};
use super::step::PipelineStep;
use super::steps::{
    ConvertJpegStep, EmbedMetadataStep, InitializeStep, MapSpreadsheetStep, MatchImagesStep,
    NormalizeDepthStep, ResizeStep, WatermarkStep,
};
use super::types::{PipelineRunResult, ProgressCallback, RunRequest, StepContext};
use crate::config::ConfigStore;
use crate::logging::{BatchLogger, LogConfig};
use crate::models::{Batch, BatchLayout, BatchStatus, STEP_COUNT};
use crate::registry::BatchRegistry;
use crate::storage::atomic_write;

/// Runs the eight steps of a batch.
///
/// Each slot is bound to exactly one step. Steps run strictly in order;
/// the first failure halts the run. Completion is committed to the
/// registry and mirrored into the batch config after every successful
/// step, so an interrupted run resumes at the first pending step.
pub struct PipelineOrchestrator {
    registry: Arc<BatchRegistry>,
    /// Steps ordered by slot number.
    steps: Vec<Box<dyn PipelineStep>>,
    /// Cancellation flag.
    cancelled: Arc<AtomicBool>,
    log_config: LogConfig,
}

impl PipelineOrchestrator {
    /// Orchestrator with the standard steps.
    pub fn new(registry: Arc<BatchRegistry>) -> Self {
        let steps: Vec<Box<dyn PipelineStep>> = vec![
            Box::new(InitializeStep::new()),
            Box::new(MapSpreadsheetStep::new()),
            Box::new(MatchImagesStep::new()),
            Box::new(NormalizeDepthStep::new()),
            Box::new(EmbedMetadataStep::new()),
            Box::new(ConvertJpegStep::new()),
            Box::new(ResizeStep::new()),
            Box::new(WatermarkStep::new()),
        ];
        Self {
            registry,
            steps,
            cancelled: Arc::new(AtomicBool::new(false)),
            log_config: LogConfig::default(),
        }
    }

    /// Orchestrator with custom steps. Every slot must be filled once.
    pub fn with_steps(
        registry: Arc<BatchRegistry>,
        mut steps: Vec<Box<dyn PipelineStep>>,
    ) -> PipelineResult<Self> {
        steps.sort_by_key(|s| s.number());
        for number in 1..=STEP_COUNT {
            if steps.iter().filter(|s| s.number() == number).count() != 1 {
                return Err(PipelineError::MissingStep(number));
            }
        }
        if let Some(extra) = steps.iter().find(|s| !(1..=STEP_COUNT).contains(&s.number())) {
            return Err(PipelineError::MissingStep(extra.number()));
        }
        Ok(Self {
            registry,
            steps,
            cancelled: Arc::new(AtomicBool::new(false)),
            log_config: LogConfig::default(),
        })
    }

    /// Put `step` into its slot, replacing the current one.
    pub fn replace_step(&mut self, step: Box<dyn PipelineStep>) -> PipelineResult<()> {
        let number = step.number();
        let slot = self
            .steps
            .iter_mut()
            .find(|s| s.number() == number)
            .ok_or(PipelineError::MissingStep(number))?;
        *slot = step;
        Ok(())
    }

    /// Set the configuration of per-run log files.
    pub fn with_log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    /// Get a cancellation handle.
    ///
    /// Call `cancel()` on the returned handle to stop the run before the
    /// next step or file. A cancelled orchestrator stays cancelled.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    /// Check if the orchestrator has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Slot numbers with step names.
    pub fn step_names(&self) -> Vec<(u8, &str)> {
        self.steps.iter().map(|s| (s.number(), s.name())).collect()
    }

    /// First step of `batch_id` not yet complete.
    pub fn get_next_pending_step(&self, batch_id: &str) -> PipelineResult<Option<u8>> {
        Ok(self.registry.get(batch_id)?.next_pending_step())
    }

    /// Step numbers a request covers, before skipping completed ones.
    ///
    /// An explicit range is clamped to the valid slots; without one the
    /// plan starts at the first pending step.
    pub fn plan(batch: &Batch, request: &RunRequest) -> Vec<u8> {
        match &request.range {
            Some(range) => {
                let from = (*range.start()).max(1);
                let to = (*range.end()).min(STEP_COUNT);
                (from..=to).collect()
            }
            None => batch
                .next_pending_step()
                .map(|first| (first..=STEP_COUNT).collect())
                .unwrap_or_default(),
        }
    }

    /// Run steps of `batch_id` as described by `request`.
    ///
    /// Step failures are reported in the returned result. Errors are only
    /// returned when the batch cannot be loaded or its progress cannot be
    /// saved.
    pub fn run(
        &mut self,
        batch_id: &str,
        request: RunRequest,
        progress: Option<ProgressCallback>,
    ) -> PipelineResult<PipelineRunResult> {
        let started_at = Local::now();
        let batch = if request.dry_run {
            self.registry.get(batch_id)?
        } else {
            self.registry.touch(batch_id)?
        };
        let layout = BatchLayout::new(batch.root.clone());
        let mut store = ConfigStore::for_layout(&layout);
        let settings = if request.dry_run {
            store.peek_settings()?
        } else {
            store.validated_settings()?
        };

        let run_name = format!("run_{}", started_at.format("%Y%m%d_%H%M%S"));
        let logger = if request.dry_run {
            BatchLogger::detached(run_name.clone(), None)
        } else {
            BatchLogger::new(&run_name, layout.logs(), self.log_config.clone(), None)
                .map_err(|e| PipelineError::io(layout.logs(), e))?
        };
        let logger = Arc::new(logger);

        let mut ctx = StepContext::new(
            batch.clone(),
            settings,
            Arc::clone(&logger),
            self.cancel_handle(),
        );
        if let Some(callback) = progress {
            ctx = ctx.with_progress_callback(callback);
        }

        let planned = Self::plan(&batch, &request);
        logger.info(&format!(
            "Batch '{}' ({}): steps {:?}{}{}",
            batch.name,
            batch.id,
            planned,
            if request.dry_run { ", dry run" } else { "" },
            if request.force { ", forced" } else { "" }
        ));

        let mut result = PipelineRunResult {
            batch_id: batch.id.clone(),
            dry_run: request.dry_run,
            ..Default::default()
        };

        let total = planned.len().max(1);
        for (i, number) in planned.iter().copied().enumerate() {
            if self.is_cancelled() {
                logger.warn(&format!("Run cancelled before step {}", number));
                result.cancelled = true;
                result.message = format!("Cancelled before step {}", number);
                break;
            }

            if batch.is_step_complete(number) && !request.force {
                logger.info(&format!("Step {} already complete, skipping", number));
                result.skipped.push(number);
                continue;
            }

            let step = self
                .steps
                .iter_mut()
                .find(|s| s.number() == number)
                .ok_or(PipelineError::MissingStep(number))?;
            let percent = ((i * 100) / total) as u32;
            ctx.report_progress(step.name(), percent, &format!("Step {}: {}", number, step.name()));

            if request.dry_run {
                let step_result = validate_only(&**step, &ctx);
                if !step_result.success && result.failed_step.is_none() {
                    result.failed_step = Some(number);
                    result.message = format!("Step {} would fail: {}", number, step_result.message);
                }
                result.results.push(step_result);
                continue;
            }

            let step_result = run_step(&mut **step, &ctx);
            if !step_result.success {
                result.cancelled = self.is_cancelled();
                result.failed_step = Some(number);
                result.message = format!(
                    "Step {} ({}) failed: {}",
                    number, step_result.name, step_result.message
                );
                result.results.push(step_result);
                if batch.is_step_complete(number) {
                    // Outputs of the earlier success may be partly overwritten.
                    logger.warn(&format!("Step {} marked pending after failed re-run", number));
                    self.registry.update_step_status(&batch.id, number, false)?;
                    store.set_step_completed(number, false)?;
                }
                break;
            }

            self.registry.update_step_status(&batch.id, number, true)?;
            store.set_step_completed(number, true)?;
            result.results.push(step_result);
        }

        if request.dry_run {
            result.batch_completed = batch.all_steps_complete();
        } else {
            let latest = self.registry.get(&batch.id)?;
            if latest.all_steps_complete() && latest.status == BatchStatus::Active {
                self.registry.mark_complete(&batch.id)?;
                logger.success("All steps complete; batch marked completed");
            }
            result.batch_completed = latest.all_steps_complete();
        }

        if result.message.is_empty() {
            result.message = if result.results.is_empty() && result.skipped.is_empty() {
                "Nothing to run; every step is complete".to_string()
            } else if request.dry_run {
                format!("Dry run: {} steps would run", result.results.len())
            } else {
                format!("Ran {} steps", result.results.len())
            };
        }
        ctx.report_progress("Complete", 100, &result.message);

        if !request.dry_run {
            result.log_path = Some(logger.log_path().to_path_buf());
            let summary_path = layout.reports().join(format!("{}.json", run_name));
            let summary = RunSummary {
                run_name: &run_name,
                started_at,
                finished_at: Local::now(),
                force: request.force,
                result: &result,
            };
            match serde_json::to_vec_pretty(&summary) {
                Ok(json) => match atomic_write(&summary_path, &json) {
                    Ok(()) => result.summary_path = Some(summary_path),
                    Err(e) => logger.warn(&format!("Could not write run summary: {}", e)),
                },
                Err(e) => logger.warn(&format!("Could not serialize run summary: {}", e)),
            }
            let warnings = logger.warning_count();
            if warnings > 0 {
                logger.info(&format!("{} (with {} warnings)", result.message, warnings));
            } else {
                logger.info(&result.message);
            }
        }
        logger.close();

        Ok(result)
    }
}

/// Contents of `reports/run_<timestamp>.json`.
#[derive(Serialize)]
struct RunSummary<'a> {
    run_name: &'a str,
    started_at: DateTime<Local>,
    finished_at: DateTime<Local>,
    force: bool,
    #[serde(flatten)]
    result: &'a PipelineRunResult,
}

/// Handle for cancelling a running pipeline.
#[derive(Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// A handle not tied to any orchestrator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the run.
    ///
    /// The run stops before the next step, or the next file of the
    /// current step.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use parking_lot::Mutex;
    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::models::StatusFilter;
    use crate::orchestrator::step::testing::{FailAt, ScriptedStep};

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Fixture {
        _dir: TempDir,
        registry: Arc<BatchRegistry>,
        batch_id: String,
        journal: Journal,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let registry = Arc::new(BatchRegistry::open(dir.path().join("registry.json")));
            let batch_id = registry
                .register("Spring accession", &dir.path().join("batch"))
                .unwrap();
            Self {
                _dir: dir,
                registry,
                batch_id,
                journal: Arc::default(),
            }
        }

        fn orchestrator(&self, failing: Option<(u8, FailAt)>) -> PipelineOrchestrator {
            let steps: Vec<Box<dyn PipelineStep>> = (1..=STEP_COUNT)
                .map(|n| {
                    let mut step = ScriptedStep::new(n, self.journal.clone());
                    if let Some((at, how)) = failing {
                        if at == n {
                            step = step.failing(how);
                        }
                    }
                    Box::new(step) as Box<dyn PipelineStep>
                })
                .collect();
            PipelineOrchestrator::with_steps(self.registry.clone(), steps).unwrap()
        }

        fn executed(&self) -> Vec<u8> {
            self.journal
                .lock()
                .iter()
                .filter_map(|entry| entry.strip_suffix(":execute"))
                .map(|n| n.parse().unwrap())
                .collect()
        }

        fn root(&self) -> std::path::PathBuf {
            self.registry.get(&self.batch_id).unwrap().root
        }
    }

    #[test]
    fn full_run_completes_the_batch() {
        let fx = Fixture::new();
        let result = fx
            .orchestrator(None)
            .run(&fx.batch_id, RunRequest::pending(), None)
            .unwrap();

        assert!(result.success());
        assert_eq!(result.steps_run(), (1..=8).collect::<Vec<u8>>());
        assert!(result.batch_completed);

        let batch = fx.registry.get(&fx.batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        assert!(batch.all_steps_complete());

        let mut store = ConfigStore::for_layout(&BatchLayout::new(fx.root()));
        let settings = store.settings().unwrap();
        assert!((1..=8).all(|n| settings.step_completed(n)));

        let summary: serde_json::Value =
            serde_json::from_slice(&fs::read(result.summary_path.unwrap()).unwrap()).unwrap();
        assert_eq!(summary["results"].as_array().unwrap().len(), 8);
        assert!(result.log_path.unwrap().is_file());
    }

    #[test]
    fn failure_halts_and_keeps_earlier_steps() {
        let fx = Fixture::new();
        let result = fx
            .orchestrator(Some((3, FailAt::Execute)))
            .run(&fx.batch_id, RunRequest::pending(), None)
            .unwrap();

        assert!(!result.success());
        assert_eq!(result.failed_step, Some(3));
        assert!(result.message.contains("disk full"));
        assert_eq!(fx.executed(), vec![1, 2, 3]);

        let batch = fx.registry.get(&fx.batch_id).unwrap();
        assert!(batch.is_step_complete(2));
        assert!(!batch.is_step_complete(3));
        assert_eq!(batch.status, BatchStatus::Active);
    }

    #[test]
    fn run_without_range_resumes_at_first_pending_step() {
        let fx = Fixture::new();
        for n in 1..=3 {
            fx.registry.update_step_status(&fx.batch_id, n, true).unwrap();
        }
        let mut orchestrator = fx.orchestrator(None);

        assert_eq!(orchestrator.get_next_pending_step(&fx.batch_id).unwrap(), Some(4));
        let result = orchestrator
            .run(&fx.batch_id, RunRequest::pending(), None)
            .unwrap();

        assert_eq!(result.steps_run(), vec![4, 5, 6, 7, 8]);
        assert_eq!(fx.executed(), vec![4, 5, 6, 7, 8]);
        assert_eq!(orchestrator.get_next_pending_step(&fx.batch_id).unwrap(), None);
    }

    #[test]
    fn completed_steps_in_range_are_skipped_unless_forced() {
        let fx = Fixture::new();
        fx.registry.update_step_status(&fx.batch_id, 2, true).unwrap();
        let mut orchestrator = fx.orchestrator(None);

        let result = orchestrator
            .run(&fx.batch_id, RunRequest::range(1, 3), None)
            .unwrap();
        assert_eq!(result.skipped, vec![2]);
        assert_eq!(fx.executed(), vec![1, 3]);

        let forced = orchestrator
            .run(&fx.batch_id, RunRequest::range(2, 2).force(), None)
            .unwrap();
        assert_eq!(forced.steps_run(), vec![2]);
    }

    #[test]
    fn range_is_clamped() {
        let batch = Batch::new("b", "/tmp/b");
        assert_eq!(
            PipelineOrchestrator::plan(&batch, &RunRequest::range(0, 20)),
            (1..=8).collect::<Vec<u8>>()
        );
        assert!(PipelineOrchestrator::plan(&batch, &RunRequest::range(5, 2)).is_empty());
    }

    #[test]
    fn dry_run_only_validates() {
        let fx = Fixture::new();
        let result = fx
            .orchestrator(Some((6, FailAt::Inputs)))
            .run(&fx.batch_id, RunRequest::pending().dry_run(), None)
            .unwrap();

        assert!(result.dry_run);
        assert_eq!(result.results.len(), 8);
        assert_eq!(result.failed_step, Some(6));
        assert!(fx.executed().is_empty());
        assert!(fx.journal.lock().iter().all(|e| e.ends_with(":inputs")));

        let batch = fx.registry.get(&fx.batch_id).unwrap();
        assert_eq!(batch.completed_count(), 0);
        assert!(result.summary_path.is_none());
    }

    #[test]
    fn dry_run_leaves_config_untouched() {
        let fx = Fixture::new();
        let config = BatchLayout::new(fx.root()).config_file();

        let result = fx
            .orchestrator(None)
            .run(&fx.batch_id, RunRequest::pending().dry_run(), None)
            .unwrap();

        assert!(result.success());
        assert!(!config.exists());
    }

    #[test]
    fn failed_forced_rerun_marks_step_pending() {
        let fx = Fixture::new();
        fx.orchestrator(None)
            .run(&fx.batch_id, RunRequest::range(1, 3), None)
            .unwrap();

        let result = fx
            .orchestrator(Some((2, FailAt::Execute)))
            .run(&fx.batch_id, RunRequest::range(2, 2).force(), None)
            .unwrap();
        assert_eq!(result.failed_step, Some(2));

        let batch = fx.registry.get(&fx.batch_id).unwrap();
        assert!(!batch.is_step_complete(2));
        assert!(batch.is_step_complete(3));
        assert_eq!(batch.next_pending_step(), Some(2));

        let mut store = ConfigStore::for_layout(&BatchLayout::new(fx.root()));
        let settings = store.settings().unwrap();
        assert!(!settings.step_completed(2));
        assert!(settings.step_completed(3));
    }

    #[test]
    fn cancelled_run_executes_nothing() {
        let fx = Fixture::new();
        let mut orchestrator = fx.orchestrator(None);
        orchestrator.cancel_handle().cancel();

        let result = orchestrator
            .run(&fx.batch_id, RunRequest::pending(), None)
            .unwrap();

        assert!(result.cancelled);
        assert!(!result.success());
        assert!(fx.executed().is_empty());
    }

    #[test]
    fn progress_is_reported_per_step() {
        let fx = Fixture::new();
        let seen: Journal = Arc::default();
        let sink = seen.clone();
        let callback: ProgressCallback = Box::new(move |step: &str, percent: u32, _msg: &str| {
            sink.lock().push(format!("{}@{}", step, percent));
        });

        fx.orchestrator(None)
            .run(&fx.batch_id, RunRequest::range(1, 2), Some(callback))
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.first().unwrap(), "Scripted@0");
        assert_eq!(seen.last().unwrap(), "Complete@100");
    }

    #[test]
    fn unknown_batch_is_an_error() {
        let fx = Fixture::new();
        let err = fx
            .orchestrator(None)
            .run("missing", RunRequest::pending(), None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Registry(_)));
    }

    #[test]
    fn replaced_step_runs_in_its_slot() {
        let fx = Fixture::new();
        let mut orchestrator = fx.orchestrator(None);
        orchestrator
            .replace_step(Box::new(
                ScriptedStep::new(3, fx.journal.clone()).failing(FailAt::Execute),
            ))
            .unwrap();

        let result = orchestrator
            .run(&fx.batch_id, RunRequest::pending(), None)
            .unwrap();
        assert_eq!(result.failed_step, Some(3));
        assert_eq!(fx.executed(), vec![1, 2, 3]);
    }

    #[test]
    fn slots_must_all_be_filled() {
        let fx = Fixture::new();
        let steps: Vec<Box<dyn PipelineStep>> =
            vec![Box::new(ScriptedStep::new(1, fx.journal.clone()))];
        let err = PipelineOrchestrator::with_steps(fx.registry.clone(), steps).err().unwrap();
        assert!(matches!(err, PipelineError::MissingStep(2)));
        assert_eq!(
            fx.registry.list(StatusFilter::All).unwrap().len(),
            1,
            "registry untouched"
        );
    }
}
