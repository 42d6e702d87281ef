//! Step lifecycle runner.
//!
//! Drives one step through
//! `Created -> Setup -> InputValidated -> Executed -> OutputValidated -> Complete`,
//! short-circuiting to `Failed` on the first problem. Errors and panics
//! from any phase become a failed [`StepResult`]; cleanup runs on every
//! exit path.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::errors::StepError;
use super::step::PipelineStep;
use super::types::{StepContext, StepOutcome, StepResult, StepState, StepStats, Validation};

/// Calls `cleanup` when dropped, so early returns cannot skip it.
struct CleanupGuard<'a> {
    step: &'a mut dyn PipelineStep,
    ctx: &'a StepContext,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        let step = &mut *self.step;
        let ctx = self.ctx;
        if let Err(panic) = guarded(|| step.cleanup(ctx)) {
            tracing::warn!("Cleanup of step {} panicked: {}", step.number(), panic);
            ctx.logger
                .warn(&format!("cleanup of step {} panicked: {}", step.number(), panic));
        }
    }
}

/// Run `f`, turning a panic into its message.
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Log warnings and turn errors into a step error built by `reject`.
fn check(
    ctx: &StepContext,
    validation: &Validation,
    reject: fn(String) -> StepError,
) -> Result<(), StepError> {
    for warning in &validation.warnings {
        ctx.logger.warn(warning);
    }
    if validation.is_ok() {
        Ok(())
    } else {
        for error in &validation.errors {
            ctx.logger.validation(error);
        }
        Err(reject(validation.error_text()))
    }
}

/// Run only the input validation of `step`, for dry runs.
pub fn validate_only(step: &dyn PipelineStep, ctx: &StepContext) -> StepResult {
    let name = step.name().to_string();
    let number = step.number();
    match guarded(|| step.validate_inputs(ctx)) {
        Ok(validation) => match check(ctx, &validation, StepError::InvalidInput) {
            Ok(()) => StepResult {
                step: number,
                name,
                success: true,
                message: "inputs valid".to_string(),
                stats: None,
                state: StepState::InputValidated,
            },
            Err(e) => StepResult::failed(number, &name, e.to_string(), None),
        },
        Err(panic) => StepResult::failed(
            number,
            &name,
            format!("input validation panicked: {}", panic),
            None,
        ),
    }
}

/// Run `step` through its full lifecycle.
pub fn run_step(step: &mut dyn PipelineStep, ctx: &StepContext) -> StepResult {
    let number = step.number();
    let name = step.name().to_string();
    ctx.logger.step(number, &name);

    let mut state = StepState::Created;
    let mut guard = CleanupGuard { step, ctx };

    let fail = |state: StepState, message: String, stats: Option<StepStats>| {
        tracing::debug!(step = number, ?state, "Step failed");
        ctx.logger.error(&format!("Step {} failed: {}", number, message));
        StepResult::failed(number, &name, message, stats)
    };

    match guarded(|| guard.step.setup(ctx)) {
        Ok(Ok(())) => state = StepState::Setup,
        Ok(Err(e)) => return fail(state, format!("setup failed: {}", e), None),
        Err(panic) => return fail(state, format!("setup panicked: {}", panic), None),
    }

    match guarded(|| guard.step.validate_inputs(ctx)) {
        Ok(validation) => {
            if let Err(e) = check(ctx, &validation, StepError::InvalidInput) {
                return fail(state, e.to_string(), None);
            }
            state = StepState::InputValidated;
        }
        Err(panic) => {
            return fail(state, format!("input validation panicked: {}", panic), None)
        }
    }

    let mut stats = StepStats::default();
    let outcome = match guarded(|| guard.step.execute(ctx, &mut stats)) {
        Ok(Ok(outcome)) => {
            state = StepState::Executed;
            outcome
        }
        Ok(Err(e)) => {
            return fail(state, format!("execution failed: {}", e), Some(stats));
        }
        Err(panic) => {
            return fail(state, format!("execution panicked: {}", panic), Some(stats));
        }
    };

    match guarded(|| guard.step.validate_outputs(ctx, &stats)) {
        Ok(validation) => {
            if let Err(e) = check(ctx, &validation, StepError::InvalidOutput) {
                return fail(state, e.to_string(), Some(stats));
            }
            state = StepState::OutputValidated;
        }
        Err(panic) => {
            return fail(
                state,
                format!("output validation panicked: {}", panic),
                Some(stats),
            )
        }
    }

    drop(guard);
    tracing::debug!(step = number, from = ?state, "Step complete");

    let message = match &outcome {
        StepOutcome::Success(m) => m.clone(),
        StepOutcome::Skipped(m) => format!("skipped: {}", m),
    };
    ctx.logger
        .success(&format!("Step {} complete: {}", number, message));

    StepResult {
        step: number,
        name,
        success: true,
        message,
        stats: Some(stats),
        state: StepState::Complete,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::config::BatchSettings;
    use crate::logging::BatchLogger;
    use crate::models::Batch;
    use crate::orchestrator::pipeline::CancelHandle;
    use crate::orchestrator::step::testing::{FailAt, ScriptedStep};

    fn context() -> StepContext {
        StepContext::new(
            Batch::new("t", "/tmp/apb-lifecycle"),
            BatchSettings::default(),
            Arc::new(BatchLogger::detached("test", None)),
            CancelHandle::new(),
        )
    }

    fn run(fail_at: FailAt) -> (StepResult, Vec<String>) {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut step = ScriptedStep::new(4, journal.clone()).failing(fail_at);
        let result = run_step(&mut step, &context());
        let calls = journal.lock().clone();
        (result, calls)
    }

    #[test]
    fn successful_run_visits_every_phase() {
        let (result, calls) = run(FailAt::Nowhere);

        assert!(result.success);
        assert_eq!(result.state, StepState::Complete);
        assert_eq!(result.message, "done");
        assert_eq!(result.stats.unwrap().processed, 2);
        assert_eq!(
            calls,
            vec!["4:setup", "4:inputs", "4:execute", "4:outputs", "4:cleanup"]
        );
    }

    #[test]
    fn setup_failure_short_circuits() {
        let (result, calls) = run(FailAt::Setup);

        assert!(!result.success);
        assert_eq!(result.state, StepState::Failed);
        assert!(result.message.starts_with("setup failed:"));
        assert!(result.message.contains("tool missing"));
        assert_eq!(calls, vec!["4:setup", "4:cleanup"]);
    }

    #[test]
    fn input_errors_block_execution() {
        let (result, calls) = run(FailAt::Inputs);

        assert!(!result.success);
        assert_eq!(result.message, "input validation failed: input missing");
        assert!(!calls.contains(&"4:execute".to_string()));
        assert_eq!(calls.last().unwrap(), "4:cleanup");
    }

    #[test]
    fn execution_error_is_reported_with_stats() {
        let (result, calls) = run(FailAt::Execute);

        assert!(!result.success);
        assert!(result.message.contains("disk full"));
        assert!(result.stats.is_some());
        assert_eq!(calls.last().unwrap(), "4:cleanup");
    }

    #[test]
    fn panic_in_execute_is_caught() {
        let (result, calls) = run(FailAt::Panic);

        assert!(!result.success);
        assert_eq!(result.state, StepState::Failed);
        assert_eq!(result.message, "execution panicked: index out of bounds");
        assert_eq!(calls.last().unwrap(), "4:cleanup");
    }

    #[test]
    fn output_failure_equals_execution_failure() {
        let (result, calls) = run(FailAt::Outputs);

        assert!(!result.success);
        assert_eq!(result.message, "output validation failed: output missing");
        assert_eq!(calls.last().unwrap(), "4:cleanup");
    }

    #[test]
    fn validate_only_never_executes() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let step = ScriptedStep::new(2, journal.clone());
        let result = validate_only(&step, &context());

        assert!(result.success);
        assert_eq!(result.state, StepState::InputValidated);
        assert_eq!(*journal.lock(), vec!["2:inputs".to_string()]);
    }
}
