//! Embed step - writes each record into its processed TIFF.
//!
//! Every non-empty field goes in twice: the IIM copy within its byte
//! limit and the XMP copy with the full value. A file that cannot be
//! written is reported and the step moves on.

use super::common::{
    check_item_failures, list_inputs, load_records, locate_embedder, prepared, process_files,
    require_files, require_metadata_csv, ItemOutcome,
};
use crate::embed::{match_records, MetadataEmbedder, MetadataWriter, ToolError, ToolOutput};
use crate::models::TIFF_EXTENSIONS;
use crate::orchestrator::errors::StepOpResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{StepContext, StepOutcome, StepStats, Validation};

pub struct EmbedMetadataStep {
    embedder: Option<MetadataEmbedder>,
}

impl EmbedMetadataStep {
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

impl Default for EmbedMetadataStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for EmbedMetadataStep {
    fn number(&self) -> u8 {
        5
    }

    fn name(&self) -> &str {
        "Embed metadata"
    }

    fn description(&self) -> &str {
        "Write IPTC and XMP metadata into processed TIFFs"
    }

    fn setup(&mut self, ctx: &StepContext) -> StepOpResult<()> {
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
            &ctx.layout.tiff_processed(),
            TIFF_EXTENSIONS,
            "processed TIFF files",
        );
        v
    }

    fn execute(&mut self, ctx: &StepContext, stats: &mut StepStats) -> StepOpResult<StepOutcome> {
        let embedder = prepared(&self.embedder)?;
        let records = load_records(ctx)?;
        let files = list_inputs(&ctx.layout.tiff_processed(), TIFF_EXTENSIONS)?;
        let matches = match_records(&records, &files);
        let mut overflows = 0usize;

        ctx.logger.section("Embedding");
        process_files(ctx, "Embed metadata", &files, stats, |file| {
            let Some(record) = matches.record_for(&records, file) else {
                ctx.logger
                    .warn(&format!("{}: no matching record, left as is", file.display()));
                return Ok(ItemOutcome::Skipped);
            };

            ctx.logger.clear_tail();
            match embedder.embed(file, record) {
                Ok(report) => {
                    log_tool_output(ctx, &report.output);
                    for overflow in &report.overflows {
                        ctx.logger.warn(&format!("{}: {}", file.display(), overflow));
                    }
                    overflows += report.overflows.len();
                    Ok(ItemOutcome::Done)
                }
                Err(e) => {
                    if let ToolError::Failed { output, .. } = &e {
                        log_tool_output(ctx, output);
                    }
                    ctx.logger.show_tail("exiftool");
                    Err(e.to_string())
                }
            }
        })?;
        stats.warnings += overflows;

        Ok(StepOutcome::Success(format!(
            "Embedded metadata in {} files ({} legacy fields truncated)",
            stats.processed, overflows
        )))
    }

    fn validate_outputs(&self, ctx: &StepContext, stats: &StepStats) -> Validation {
        let mut v = Validation::ok();
        if stats.attempted() == 0 {
            v.error("no processed TIFF matches a record");
        }
        check_item_failures(ctx, stats, &mut v);
        v
    }
}

/// Record a tool run in the log: the command, then its output (kept in
/// the tail, written out in verbose mode).
fn log_tool_output(ctx: &StepContext, output: &ToolOutput) {
    if !output.command.is_empty() {
        ctx.logger.command(&output.command);
    }
    for (line, is_stderr) in output.lines() {
        ctx.logger.output_line(line, is_stderr);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::config::BatchSettings;
    use crate::embed::testing::FakeWriter;
    use crate::logging::BatchLogger;
    use crate::orchestrator::lifecycle::run_step;
    use crate::orchestrator::steps::common::testing::{batch_context, record, write_catalog, write_rgb};
    use tempfile::tempdir;

    fn prepare(settings: BatchSettings) -> (tempfile::TempDir, StepContext) {
        let dir = tempdir().unwrap();
        let ctx = batch_context(dir.path(), settings);
        write_catalog(&ctx, &[record("A-001", ""), record("A-002", "Restricted")]);
        for name in ["A-001.tif", "A-002.tif", "extra.tif"] {
            write_rgb(&ctx.layout.tiff_processed().join(name), 2, 2, [0, 0, 0]);
        }
        (dir, ctx)
    }

    #[test]
    fn embeds_matched_files_and_skips_orphans() {
        let (_dir, ctx) = prepare(BatchSettings::default());
        let writer = FakeWriter::default();

        let result = run_step(&mut EmbedMetadataStep::with_writer(Box::new(writer.clone())), &ctx);

        assert!(result.success, "{}", result.message);
        let stats = result.stats.unwrap();
        assert_eq!((stats.processed, stats.skipped), (2, 1));

        let log = writer.log.lock();
        assert_eq!(log.writes.len(), 2);
        let (target, args) = &log.writes[1];
        assert!(target.ends_with("A-002.tif"));
        assert!(args.contains(&"-IPTC:CopyrightNotice=Restricted".to_string()));
        assert!(args.contains(&"-XMP-dc:Rights=Restricted".to_string()));
    }

    #[test]
    fn locked_file_is_reported_and_step_continues() {
        let (_dir, mut ctx) = prepare(BatchSettings::default());
        let lines: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = lines.clone();
        ctx.logger = Arc::new(BatchLogger::detached(
            "test",
            Some(Box::new(move |line: &str| sink.lock().push(line.to_string()))),
        ));
        let writer = FakeWriter::failing_on(&["A-001.tif"]);

        let result = run_step(&mut EmbedMetadataStep::with_writer(Box::new(writer)), &ctx);

        assert!(result.success, "{}", result.message);
        let stats = result.stats.unwrap();
        assert_eq!((stats.processed, stats.failed), (1, 1));
        assert!(stats.failed_items[0].reason.contains("file is locked"));

        let lines = lines.lock();
        let tail = lines
            .iter()
            .position(|l| l.ends_with("[exiftool/tail]"))
            .expect("tail shown");
        assert!(lines[tail + 1].ends_with("[stderr] Error: file is locked"));
    }

    #[test]
    fn strict_policy_fails_on_any_file() {
        let mut settings = BatchSettings::default();
        settings.validation.fail_on_item_errors = true;
        let (_dir, ctx) = prepare(settings);
        let writer = FakeWriter::failing_on(&["A-001.tif"]);

        let result = run_step(&mut EmbedMetadataStep::with_writer(Box::new(writer)), &ctx);

        assert!(!result.success);
        assert_eq!(result.message, "output validation failed: 1 of 2 files failed");
    }

    #[test]
    fn missing_tool_fails_setup() {
        let dir = tempdir().unwrap();
        let mut settings = BatchSettings::default();
        settings.embedding.exiftool_path = dir.path().join("no/exiftool").display().to_string();
        let ctx = batch_context(dir.path(), settings);

        let result = run_step(&mut EmbedMetadataStep::new(), &ctx);

        assert!(!result.success);
        assert!(result.message.starts_with("setup failed:"));
    }
}
