//! Initialize step - creates the batch folders and stages source files.
//!
//! Copies the configured spreadsheet and TIFF scans into `input/`. Files
//! already staged with the same size are skipped when
//! `inputs.skip_existing` is set. Sources can also be placed into `input/`
//! by hand, in which case no source paths need configuring.

use std::fs;
use std::path::{Path, PathBuf};

use super::common::{
    check_item_failures, file_label, list_inputs, process_files, require_files, ItemOutcome,
};
use crate::models::{list_files, SPREADSHEET_EXTENSIONS, TIFF_EXTENSIONS};
use crate::orchestrator::errors::{StepError, StepOpResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{StepContext, StepOutcome, StepStats, Validation};

pub struct InitializeStep;

impl InitializeStep {
    pub fn new() -> Self {
        Self
    }

    fn configured(value: &str) -> Option<PathBuf> {
        let value = value.trim();
        (!value.is_empty()).then(|| PathBuf::from(value))
    }
}

impl Default for InitializeStep {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy `src` into `dest_dir` unless an identical-size copy is there.
fn stage(src: &Path, dest_dir: &Path, skip_existing: bool) -> Result<ItemOutcome, String> {
    let dst = dest_dir.join(src.file_name().unwrap_or_default());
    if skip_existing {
        if let (Ok(have), Ok(want)) = (fs::metadata(&dst), fs::metadata(src)) {
            if have.len() == want.len() {
                return Ok(ItemOutcome::Skipped);
            }
        }
    }
    fs::copy(src, &dst)
        .map(|_| ItemOutcome::Done)
        .map_err(|e| format!("copy to {} failed: {}", dst.display(), e))
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

impl PipelineStep for InitializeStep {
    fn number(&self) -> u8 {
        1
    }

    fn name(&self) -> &str {
        "Initialize"
    }

    fn description(&self) -> &str {
        "Create batch folders and stage source files"
    }

    fn validate_inputs(&self, ctx: &StepContext) -> Validation {
        let mut v = Validation::ok();
        let inputs = &ctx.settings.inputs;

        match Self::configured(&inputs.spreadsheet_path) {
            Some(sheet) if !sheet.is_file() => {
                v.error(format!("spreadsheet {} does not exist", sheet.display()))
            }
            Some(sheet) if !has_extension(&sheet, SPREADSHEET_EXTENSIONS) => v.error(format!(
                "spreadsheet {} is not a CSV or TSV file",
                sheet.display()
            )),
            Some(_) => {}
            None => {
                let staged = list_files(&ctx.layout.input_spreadsheet(), SPREADSHEET_EXTENSIONS)
                    .unwrap_or_default();
                if staged.is_empty() {
                    v.error("no spreadsheet configured (inputs.spreadsheet_path) or staged");
                }
            }
        }

        match Self::configured(&inputs.tiff_dir) {
            Some(dir) if !dir.is_dir() => {
                v.error(format!("TIFF folder {} does not exist", dir.display()))
            }
            Some(dir) => {
                require_files(&mut v, &dir, TIFF_EXTENSIONS, "TIFF files");
            }
            None => {
                let staged =
                    list_files(&ctx.layout.input_tiff(), TIFF_EXTENSIONS).unwrap_or_default();
                if staged.is_empty() {
                    v.error("no TIFF folder configured (inputs.tiff_dir) or staged");
                }
            }
        }

        v
    }

    fn execute(&mut self, ctx: &StepContext, stats: &mut StepStats) -> StepOpResult<StepOutcome> {
        ctx.layout
            .ensure_dirs()
            .map_err(|e| StepError::io("creating batch folders", e))?;
        ctx.logger
            .info(&format!("Batch folders ready under {}", ctx.layout.root().display()));

        let skip_existing = ctx.settings.inputs.skip_existing;
        let mut sources = Vec::new();
        if let Some(sheet) = Self::configured(&ctx.settings.inputs.spreadsheet_path) {
            sources.push((sheet, ctx.layout.input_spreadsheet()));
        }
        if let Some(dir) = Self::configured(&ctx.settings.inputs.tiff_dir) {
            for tiff in list_inputs(&dir, TIFF_EXTENSIONS)? {
                sources.push((tiff, ctx.layout.input_tiff()));
            }
        }

        if sources.is_empty() {
            return Ok(StepOutcome::Skipped(
                "sources already staged by hand".to_string(),
            ));
        }

        let files: Vec<PathBuf> = sources.iter().map(|(src, _)| src.clone()).collect();
        process_files(ctx, self.name(), &files, stats, |src| {
            let dest = sources
                .iter()
                .find(|(s, _)| s == src)
                .map(|(_, d)| d.as_path())
                .ok_or_else(|| format!("{} is not a staged source", file_label(src)))?;
            stage(src, dest, skip_existing)
        })?;

        Ok(StepOutcome::Success(format!(
            "Staged {} files ({} already present)",
            stats.processed, stats.skipped
        )))
    }

    fn validate_outputs(&self, ctx: &StepContext, stats: &StepStats) -> Validation {
        let mut v = Validation::ok();
        require_files(
            &mut v,
            &ctx.layout.input_spreadsheet(),
            SPREADSHEET_EXTENSIONS,
            "spreadsheet",
        );
        require_files(&mut v, &ctx.layout.input_tiff(), TIFF_EXTENSIONS, "TIFF files");
        if let Ok(sheets) = list_files(&ctx.layout.input_spreadsheet(), SPREADSHEET_EXTENSIONS) {
            if sheets.len() > 1 {
                v.warn(format!(
                    "{} spreadsheets staged; the first is used",
                    sheets.len()
                ));
            }
        }
        check_item_failures(ctx, stats, &mut v);
        v
    }
}
