//! Normalize step - reduces scans to 8 bits per channel.
//!
//! Deeper scans are re-encoded as 8-bit TIFF keeping their resolution
//! tags; 8-bit scans are copied unchanged into `output/tiff_processed`.

use super::common::{
    check_item_failures, check_output_count, list_inputs, output_path, process_files,
    require_files, ItemOutcome,
};
use crate::imaging::{normalize_file, DepthOutcome};
use crate::models::TIFF_EXTENSIONS;
use crate::orchestrator::errors::StepOpResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{StepContext, StepOutcome, StepStats, Validation};

pub struct NormalizeDepthStep;

impl NormalizeDepthStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NormalizeDepthStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for NormalizeDepthStep {
    fn number(&self) -> u8 {
        4
    }

    fn name(&self) -> &str {
        "Normalize depth"
    }

    fn description(&self) -> &str {
        "Convert scans to 8 bits per channel"
    }

    fn validate_inputs(&self, ctx: &StepContext) -> Validation {
        let mut v = Validation::ok();
        require_files(&mut v, &ctx.layout.input_tiff(), TIFF_EXTENSIONS, "TIFF files");
        v
    }

    fn execute(&mut self, ctx: &StepContext, stats: &mut StepStats) -> StepOpResult<StepOutcome> {
        let files = list_inputs(&ctx.layout.input_tiff(), TIFF_EXTENSIONS)?;
        let out_dir = ctx.layout.tiff_processed();
        let mut converted = 0usize;

        process_files(ctx, self.name(), &files, stats, |src| {
            let dst = output_path(&out_dir, src, None);
            match normalize_file(src, &dst).map_err(|e| e.to_string())? {
                DepthOutcome::Copied => {}
                DepthOutcome::Converted {
                    from_bits,
                    resolution,
                } => {
                    converted += 1;
                    let dpi = resolution
                        .map(|r| format!("{:.0}x{:.0}", r.x_value(), r.y_value()))
                        .unwrap_or_else(|| "no resolution tags".to_string());
                    ctx.logger.debug(&format!(
                        "{}: {}-bit -> 8-bit ({})",
                        dst.display(),
                        from_bits,
                        dpi
                    ));
                }
            }
            Ok(ItemOutcome::Done)
        })?;

        Ok(StepOutcome::Success(format!(
            "Normalized {} files ({} converted from deeper than 8 bits)",
            stats.processed, converted
        )))
    }

    fn validate_outputs(&self, ctx: &StepContext, stats: &StepStats) -> Validation {
        let mut v = Validation::ok();
        check_item_failures(ctx, stats, &mut v);
        check_output_count(&mut v, &ctx.layout.tiff_processed(), TIFF_EXTENSIONS, stats.processed);
        v
    }
}
