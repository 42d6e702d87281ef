//! Match step - pairs records with scans and writes the match report.

use chrono::{DateTime, Local};
use serde::Serialize;

use super::common::{file_label, list_inputs, load_records, require_files, require_metadata_csv};
use crate::embed::{match_records, RecordMatch};
use crate::models::TIFF_EXTENSIONS;
use crate::orchestrator::errors::{StepError, StepOpResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{StepContext, StepOutcome, StepStats, Validation};
use crate::storage::atomic_write;

/// Shown in messages before the list is cut short.
const LIST_PREVIEW: usize = 5;

/// Contents of `reports/match_report.json`.
#[derive(Debug, Serialize)]
struct MatchReport<'a> {
    generated_at: DateTime<Local>,
    records: usize,
    images: usize,
    #[serde(flatten)]
    result: &'a RecordMatch,
}

fn preview(items: &[String]) -> String {
    let mut text = items
        .iter()
        .take(LIST_PREVIEW)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if items.len() > LIST_PREVIEW {
        text.push_str(&format!(" and {} more", items.len() - LIST_PREVIEW));
    }
    text
}

pub struct MatchImagesStep {
    last_match: Option<RecordMatch>,
}

impl MatchImagesStep {
    pub fn new() -> Self {
        Self { last_match: None }
    }
}

impl Default for MatchImagesStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for MatchImagesStep {
    fn number(&self) -> u8 {
        3
    }

    fn name(&self) -> &str {
        "Match images"
    }

    fn description(&self) -> &str {
        "Pair records with scans by Accession Number"
    }

    fn validate_inputs(&self, ctx: &StepContext) -> Validation {
        let mut v = Validation::ok();
        require_metadata_csv(&mut v, ctx);
        require_files(&mut v, &ctx.layout.input_tiff(), TIFF_EXTENSIONS, "TIFF files");
        v
    }

    fn execute(&mut self, ctx: &StepContext, stats: &mut StepStats) -> StepOpResult<StepOutcome> {
        let records = load_records(ctx)?;
        let files = list_inputs(&ctx.layout.input_tiff(), TIFF_EXTENSIONS)?;
        let result = match_records(&records, &files);

        if !result.records_without_images.is_empty() {
            ctx.logger.warn(&format!(
                "{} records have no image: {}",
                result.records_without_images.len(),
                preview(&result.records_without_images)
            ));
        }
        if !result.images_without_records.is_empty() {
            let names: Vec<String> = result
                .images_without_records
                .iter()
                .map(|p| file_label(p))
                .collect();
            ctx.logger.warn(&format!(
                "{} images have no record: {}",
                names.len(),
                preview(&names)
            ));
        }
        if !result.duplicate_identifiers.is_empty() {
            ctx.logger.warn(&format!(
                "Duplicate Accession Numbers (first record used): {}",
                preview(&result.duplicate_identifiers)
            ));
        }

        let report = MatchReport {
            generated_at: Local::now(),
            records: records.len(),
            images: files.len(),
            result: &result,
        };
        let json = serde_json::to_vec_pretty(&report)
            .map_err(|e| StepError::other(format!("serializing match report: {}", e)))?;
        let path = ctx.layout.match_report();
        atomic_write(&path, &json).map_err(|e| StepError::io("writing match report", e))?;
        ctx.logger.info(&format!("Match report written to {}", path.display()));

        stats.processed = result.matched.len();
        stats.skipped = result.images_without_records.len();
        stats.warnings = result.records_without_images.len() + result.duplicate_identifiers.len();

        let message = format!(
            "Matched {} of {} images to {} records",
            result.matched.len(),
            files.len(),
            records.len()
        );
        self.last_match = Some(result);
        Ok(StepOutcome::Success(message))
    }

    fn validate_outputs(&self, ctx: &StepContext, _stats: &StepStats) -> Validation {
        let mut v = Validation::ok();
        if !ctx.layout.match_report().is_file() {
            v.error("match report was not written");
        }

        let Some(result) = &self.last_match else {
            v.error("no match result recorded");
            return v;
        };
        if result.matched.is_empty() {
            v.error("no image matches any record");
        }
        if ctx.settings.validation.require_all_records_matched
            && !result.records_without_images.is_empty()
        {
            v.error(format!(
                "records without images: {}",
                preview(&result.records_without_images)
            ));
        }
        v
    }

    fn cleanup(&mut self, _ctx: &StepContext) {
        self.last_match = None;
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::BatchSettings;
    use crate::orchestrator::lifecycle::run_step;
    use crate::orchestrator::steps::common::testing::{batch_context, record, write_catalog, write_rgb};
    use tempfile::tempdir;

    fn prepare(settings: BatchSettings) -> (tempfile::TempDir, StepContext) {
        let dir = tempdir().unwrap();
        let ctx = batch_context(dir.path(), settings);
        write_catalog(
            &ctx,
            &[record("A-001", ""), record("A-002", ""), record("A-003", "")],
        );
        write_rgb(&ctx.layout.input_tiff().join("a-001.tif"), 2, 2, [0, 0, 0]);
        write_rgb(&ctx.layout.input_tiff().join("A-002.TIF"), 2, 2, [0, 0, 0]);
        write_rgb(&ctx.layout.input_tiff().join("stray.tif"), 2, 2, [0, 0, 0]);
        (dir, ctx)
    }

    #[test]
    fn writes_report_with_orphans() {
        let (_dir, ctx) = prepare(BatchSettings::default());

        let result = run_step(&mut MatchImagesStep::new(), &ctx);

        assert!(result.success, "{}", result.message);
        let stats = result.stats.unwrap();
        assert_eq!((stats.processed, stats.skipped), (2, 1));

        let report: serde_json::Value =
            serde_json::from_slice(&fs::read(ctx.layout.match_report()).unwrap()).unwrap();
        assert_eq!(report["records"], 3);
        assert_eq!(report["images"], 3);
        assert_eq!(report["records_without_images"][0], "A-003");
        assert_eq!(report["matched"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn unmatched_records_can_fail_the_step() {
        let mut settings = BatchSettings::default();
        settings.validation.require_all_records_matched = true;
        let (_dir, ctx) = prepare(settings);

        let result = run_step(&mut MatchImagesStep::new(), &ctx);

        assert!(!result.success);
        assert!(result.message.contains("A-003"));
    }

    #[test]
    fn preview_truncates_long_lists() {
        let items: Vec<String> = (1..=7).map(|i| format!("A-{}", i)).collect();
        assert_eq!(preview(&items), "A-1, A-2, A-3, A-4, A-5 and 2 more");
    }
}
