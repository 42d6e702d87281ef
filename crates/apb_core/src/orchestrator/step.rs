//! Pipeline step trait definition.
//!
//! All eight stages implement this trait, providing a consistent
//! lifecycle for setup, validation, execution and cleanup.

use super::errors::StepOpResult;
use super::types::{StepContext, StepOutcome, StepStats, Validation};

/// Trait for pipeline steps.
///
/// [`run_step`](super::lifecycle::run_step) calls these methods in order:
///
/// 1. `setup` - Acquire tools and resources
/// 2. `validate_inputs` - Check preconditions before execution
/// 3. `execute` - Perform the step's work, recording per-file results
/// 4. `validate_outputs` - Verify the step produced valid output
/// 5. `cleanup` - Always called, whatever happened before
///
/// # Example
///
/// ```ignore
/// struct ResizeStep;
///
/// impl PipelineStep for ResizeStep {
///     fn number(&self) -> u8 { 7 }
///     fn name(&self) -> &str { "Resize JPEG" }
///
///     fn validate_inputs(&self, ctx: &StepContext) -> Validation {
///         let mut v = Validation::ok();
///         if !ctx.layout.jpeg().is_dir() {
///             v.error("no JPEG folder");
///         }
///         v
///     }
///
///     fn execute(&mut self, ctx: &StepContext, stats: &mut StepStats) -> StepOpResult<StepOutcome> {
///         // Resize each file, counting into stats...
///         Ok(StepOutcome::Success(stats.summary()))
///     }
///
///     fn validate_outputs(&self, _ctx: &StepContext, stats: &StepStats) -> Validation {
///         Validation::ok()
///     }
/// }
/// ```
pub trait PipelineStep: Send {
    /// Slot number (1-8).
    fn number(&self) -> u8;

    /// Get the step name (for logging and results).
    fn name(&self) -> &str;

    /// Human-readable description of what this step does.
    fn description(&self) -> &str {
        self.name()
    }

    /// Prepare resources (locate tools, load assets).
    ///
    /// An error here is a configuration problem and fails the step before
    /// anything is validated or written.
    fn setup(&mut self, _ctx: &StepContext) -> StepOpResult<()> {
        Ok(())
    }

    /// Validate inputs before execution.
    ///
    /// Also used on its own for dry runs, so it must not write anything.
    fn validate_inputs(&self, ctx: &StepContext) -> Validation;

    /// Execute the step's main work.
    ///
    /// Per-file problems go into `stats`; only errors that stop the whole
    /// step are returned.
    fn execute(&mut self, ctx: &StepContext, stats: &mut StepStats) -> StepOpResult<StepOutcome>;

    /// Validate outputs after execution.
    fn validate_outputs(&self, ctx: &StepContext, stats: &StepStats) -> Validation;

    /// Release resources. Called on every exit path.
    fn cleanup(&mut self, _ctx: &StepContext) {}
}
