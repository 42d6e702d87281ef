//! Watermark step - marks restricted images.
//!
//! An image is restricted when its record's CopyrightNotice contains the
//! word "restricted". Restricted images get the overlay composited over
//! their full frame and their metadata copied back; the rest are copied
//! unchanged when `watermark.copy_unrestricted` is set.

use image::RgbaImage;

use super::common::{
    check_item_failures, list_inputs, load_records, locate_embedder, output_path, process_files,
    remove_partial, require_files, require_metadata_csv, ItemOutcome,
};
use crate::embed::{match_records, MetadataEmbedder, MetadataWriter};
use crate::imaging::{copy_unchanged, is_restricted, load_overlay, watermark_file};
use crate::models::{IptcField, JPEG_EXTENSIONS};
use crate::orchestrator::errors::{StepError, StepOpResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{StepContext, StepOutcome, StepStats, Validation};

pub struct WatermarkStep {
    embedder: Option<MetadataEmbedder>,
    overlay: Option<RgbaImage>,
}

impl WatermarkStep {
    pub fn new() -> Self {
        Self {
            embedder: None,
            overlay: None,
        }
    }

    /// Use `writer` instead of locating ExifTool.
    pub fn with_writer(writer: Box<dyn MetadataWriter>) -> Self {
        Self {
            embedder: Some(MetadataEmbedder::new(writer)),
            overlay: None,
        }
    }
}

impl Default for WatermarkStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for WatermarkStep {
    fn number(&self) -> u8 {
        8
    }

    fn name(&self) -> &str {
        "Watermark"
    }

    fn description(&self) -> &str {
        "Watermark images whose records are restricted"
    }

    /// Loads the overlay. Nothing is needed when opacity is 0.
    fn setup(&mut self, ctx: &StepContext) -> StepOpResult<()> {
        let spec = ctx.settings.watermark_spec();
        if spec.is_noop() {
            ctx.logger
                .info("Watermark opacity is 0; restricted images are copied unchanged");
            return Ok(());
        }
        if spec.overlay_path.as_os_str().is_empty() {
            return Err(StepError::config("watermark.overlay_path is not set"));
        }
        self.overlay = Some(load_overlay(&spec.overlay_path)?);
        if self.embedder.is_none() {
            self.embedder = Some(locate_embedder(ctx)?);
        }
        Ok(())
    }

    fn validate_inputs(&self, ctx: &StepContext) -> Validation {
        let mut v = Validation::ok();
        require_metadata_csv(&mut v, ctx);
        require_files(
            &mut v,
            &ctx.layout.jpeg_resized(),
            JPEG_EXTENSIONS,
            "resized JPEG files",
        );
        if let Some(overlay) = &self.overlay {
            if overlay.width() != overlay.height() {
                v.warn(format!(
                    "overlay is {}x{}, not square; it is cropped to fit",
                    overlay.width(),
                    overlay.height()
                ));
            }
        }
        v
    }

    fn execute(&mut self, ctx: &StepContext, stats: &mut StepStats) -> StepOpResult<StepOutcome> {
        let records = load_records(ctx)?;
        let files = list_inputs(&ctx.layout.jpeg_resized(), JPEG_EXTENSIONS)?;
        let matches = match_records(&records, &files);
        let out_dir = ctx.layout.jpeg_watermarked();
        let spec = ctx.settings.watermark_spec();
        let quality = ctx.settings.jpeg.quality;
        let copy_unrestricted = ctx.settings.watermark.copy_unrestricted;
        let embedder = self.embedder.as_ref();
        let overlay = self.overlay.as_ref();
        let mut marked = 0usize;

        process_files(ctx, "Watermark", &files, stats, |src| {
            let dst = output_path(&out_dir, src, None);
            let record = matches.record_for(&records, src);
            if record.is_none() {
                ctx.logger
                    .warn(&format!("{}: no matching record, treated as unrestricted", src.display()));
            }
            let restricted =
                is_restricted(record.and_then(|r| r.get(IptcField::CopyrightNotice)));

            if !restricted {
                if !copy_unrestricted {
                    return Ok(ItemOutcome::Skipped);
                }
                copy_unchanged(src, &dst).map_err(|e| e.to_string())?;
                return Ok(ItemOutcome::Done);
            }

            marked += 1;
            if spec.is_noop() {
                copy_unchanged(src, &dst).map_err(|e| e.to_string())?;
                return Ok(ItemOutcome::Done);
            }

            let (Some(overlay), Some(embedder)) = (overlay, embedder) else {
                return Err("watermark overlay was not set up".to_string());
            };
            watermark_file(src, &dst, &spec, overlay, quality).map_err(|e| e.to_string())?;
            if let Err(e) = embedder.copy_metadata(src, &dst) {
                remove_partial(&dst);
                return Err(format!("metadata copy failed: {}", e));
            }
            Ok(ItemOutcome::Done)
        })?;

        if marked == 0 {
            return Ok(StepOutcome::Skipped(format!(
                "no restricted images among {}",
                files.len()
            )));
        }
        Ok(StepOutcome::Success(format!(
            "Watermarked {} of {} images",
            marked,
            files.len()
        )))
    }

    fn validate_outputs(&self, ctx: &StepContext, stats: &StepStats) -> Validation {
        let mut v = Validation::ok();
        check_item_failures(ctx, stats, &mut v);
        v
    }

    fn cleanup(&mut self, _ctx: &StepContext) {
        self.overlay = None;
    }
}
