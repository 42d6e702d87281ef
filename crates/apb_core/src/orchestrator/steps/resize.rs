//! Resize step - bounds JPEG deliverables to the configured size.
//!
//! Images already within bounds are copied byte for byte. Resized images
//! get their metadata copied from the source JPEG.

use super::common::{
    check_item_failures, check_output_count, list_inputs, locate_embedder, output_path, prepared,
    process_files, remove_partial, require_files, ItemOutcome,
};
use crate::embed::{MetadataEmbedder, MetadataWriter};
use crate::imaging::{resize_file, ResizeOutcome};
use crate::models::JPEG_EXTENSIONS;
use crate::orchestrator::errors::StepOpResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{StepContext, StepOutcome, StepStats, Validation};

pub struct ResizeStep {
    embedder: Option<MetadataEmbedder>,
}

impl ResizeStep {
    pub fn new() -> Self {
        Self { embedder: None }
    }

    /// Use `writer` instead of locating ExifTool.
    pub fn with_writer(writer: Box<dyn MetadataWriter>) -> Self {
        Self {
            embedder: Some(MetadataEmbedder::new(writer)),
        }
    }
}

impl Default for ResizeStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ResizeStep {
    fn number(&self) -> u8 {
        7
    }

    fn name(&self) -> &str {
        "Resize JPEG"
    }

    fn setup(&mut self, ctx: &StepContext) -> StepOpResult<()> {
        if self.embedder.is_none() {
            self.embedder = Some(locate_embedder(ctx)?);
        }
        Ok(())
    }

    fn validate_inputs(&self, ctx: &StepContext) -> Validation {
        let mut v = Validation::ok();
        require_files(&mut v, &ctx.layout.jpeg(), JPEG_EXTENSIONS, "JPEG files");
        v
    }

    fn execute(&mut self, ctx: &StepContext, stats: &mut StepStats) -> StepOpResult<StepOutcome> {
        let embedder = prepared(&self.embedder)?;
        let files = list_inputs(&ctx.layout.jpeg(), JPEG_EXTENSIONS)?;
        let out_dir = ctx.layout.jpeg_resized();
        let spec = ctx.settings.resize_spec();
        let quality = ctx.settings.jpeg.quality;
        let mut resized = 0usize;

        process_files(ctx, "Resize JPEG", &files, stats, |src| {
            let dst = output_path(&out_dir, src, None);
            match resize_file(src, &dst, spec, quality).map_err(|e| e.to_string())? {
                ResizeOutcome::Unchanged { .. } => {}
                ResizeOutcome::Resized { from, to } => {
                    resized += 1;
                    ctx.logger.debug(&format!(
                        "{}: {}x{} -> {}x{}",
                        dst.display(),
                        from.0,
                        from.1,
                        to.0,
                        to.1
                    ));
                    if let Err(e) = embedder.copy_metadata(src, &dst) {
                        remove_partial(&dst);
                        return Err(format!("metadata copy failed: {}", e));
                    }
                }
            }
            Ok(ItemOutcome::Done)
        })?;

        Ok(StepOutcome::Success(format!(
            "{} of {} images resized to at most {} px",
            resized, stats.processed, spec.max_dimension
        )))
    }

    fn validate_outputs(&self, ctx: &StepContext, stats: &StepStats) -> Validation {
        let mut v = Validation::ok();
        check_item_failures(ctx, stats, &mut v);
        check_output_count(
            &mut v,
            &ctx.layout.jpeg_resized(),
            JPEG_EXTENSIONS,
            stats.processed,
        );
        v
    }
}
