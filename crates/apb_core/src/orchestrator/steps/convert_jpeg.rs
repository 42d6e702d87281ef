//! JPEG step - converts processed TIFFs to JPEG deliverables.
//!
//! The encoder drops the embedded metadata, so it is copied over from the
//! source TIFF afterwards. A JPEG whose metadata copy fails is removed.

use super::common::{
    check_item_failures, check_output_count, list_inputs, locate_embedder, output_path, prepared,
    process_files, remove_partial, require_files, ItemOutcome,
};
use crate::embed::{MetadataEmbedder, MetadataWriter};
use crate::imaging::convert_to_jpeg;
use crate::models::{JPEG_EXTENSIONS, TIFF_EXTENSIONS};
use crate::orchestrator::errors::StepOpResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{StepContext, StepOutcome, StepStats, Validation};

pub struct ConvertJpegStep {
    embedder: Option<MetadataEmbedder>,
}

impl ConvertJpegStep {
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

impl Default for ConvertJpegStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ConvertJpegStep {
    fn number(&self) -> u8 {
        6
    }

    fn name(&self) -> &str {
        "Convert to JPEG"
    }

    fn setup(&mut self, ctx: &StepContext) -> StepOpResult<()> {
        if self.embedder.is_none() {
            self.embedder = Some(locate_embedder(ctx)?);
        }
        Ok(())
    }

    fn validate_inputs(&self, ctx: &StepContext) -> Validation {
        let mut v = Validation::ok();
        require_files(
            &mut v,
            &ctx.layout.tiff_processed(),
            TIFF_EXTENSIONS,
            "processed TIFF files",
        );
        v
    }

    fn execute(&mut self, ctx: &StepContext, stats: &mut StepStats) -> StepOpResult<StepOutcome> {
        let embedder = prepared(&self.embedder)?;
        let files = list_inputs(&ctx.layout.tiff_processed(), TIFF_EXTENSIONS)?;
        let out_dir = ctx.layout.jpeg();
        let quality = ctx.settings.jpeg.quality;

        process_files(ctx, "Convert to JPEG", &files, stats, |src| {
            let dst = output_path(&out_dir, src, Some("jpg"));
            convert_to_jpeg(src, &dst, quality).map_err(|e| e.to_string())?;
            if let Err(e) = embedder.copy_metadata(src, &dst) {
                remove_partial(&dst);
                return Err(format!("metadata copy failed: {}", e));
            }
            Ok(ItemOutcome::Done)
        })?;

        Ok(StepOutcome::Success(format!(
            "Converted {} files at quality {}",
            stats.processed, quality
        )))
    }

    fn validate_outputs(&self, ctx: &StepContext, stats: &StepStats) -> Validation {
        let mut v = Validation::ok();
        check_item_failures(ctx, stats, &mut v);
        check_output_count(&mut v, &ctx.layout.jpeg(), JPEG_EXTENSIONS, stats.processed);
        v
    }
}
