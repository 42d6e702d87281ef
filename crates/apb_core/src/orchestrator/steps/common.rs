//! Helpers shared by the step implementations.

use std::fs;
use std::path::{Path, PathBuf};

use crate::embed::{ExifTool, MetadataEmbedder};
use crate::mapping::read_metadata_csv;
use crate::models::{list_files, MetadataRecord};
use crate::orchestrator::errors::{StepError, StepOpResult};
use crate::orchestrator::types::{StepContext, StepStats, Validation};

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Done,
    Skipped,
}

/// Run `work` over `files`, counting results into `stats`.
///
/// A failing file is logged and recorded; the loop moves on. Cancellation
/// is checked before every file.
pub fn process_files<F>(
    ctx: &StepContext,
    step_name: &str,
    files: &[PathBuf],
    stats: &mut StepStats,
    mut work: F,
) -> StepOpResult<()>
where
    F: FnMut(&Path) -> Result<ItemOutcome, String>,
{
    let total = files.len().max(1);
    for (i, file) in files.iter().enumerate() {
        if ctx.is_cancelled() {
            ctx.logger
                .warn(&format!("{} cancelled after {} of {} files", step_name, i, files.len()));
            return Err(StepError::Cancelled);
        }

        let label = file_label(file);
        match work(file) {
            Ok(ItemOutcome::Done) => stats.processed += 1,
            Ok(ItemOutcome::Skipped) => stats.skipped += 1,
            Err(reason) => {
                ctx.logger.item_failure(&label, &reason);
                stats.fail(label.clone(), reason);
            }
        }

        let percent = (((i + 1) * 100) / total) as u32;
        ctx.report_progress(step_name, percent, &label);
        ctx.logger.progress(percent);
    }
    Ok(())
}

/// File name for logs and failure lists.
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// `dir/<name of src>`, optionally with a new extension.
pub fn output_path(dir: &Path, src: &Path, extension: Option<&str>) -> PathBuf {
    let target = dir.join(src.file_name().unwrap_or_default());
    match extension {
        Some(ext) => target.with_extension(ext),
        None => target,
    }
}

/// Best-effort removal of a half-written output.
pub fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove partial output {}: {}", path.display(), e);
        }
    }
}

/// List input files, recording an error when there are none.
pub fn require_files(v: &mut Validation, dir: &Path, extensions: &[&str], what: &str) -> Vec<PathBuf> {
    match list_files(dir, extensions) {
        Ok(files) if files.is_empty() => {
            v.error(format!("no {} found in {}", what, dir.display()));
            files
        }
        Ok(files) => files,
        Err(e) => {
            v.error(format!("cannot list {}: {}", dir.display(), e));
            Vec::new()
        }
    }
}

/// List files for execution, turning I/O errors into step errors.
pub fn list_inputs(dir: &Path, extensions: &[&str]) -> StepOpResult<Vec<PathBuf>> {
    list_files(dir, extensions)
        .map_err(|e| StepError::io(format!("listing {}", dir.display()), e))
}

/// Require the metadata export written by the mapping step.
pub fn require_metadata_csv(v: &mut Validation, ctx: &StepContext) {
    let path = ctx.layout.metadata_csv();
    if !path.is_file() {
        v.error(format!(
            "metadata export {} is missing; run the mapping step first",
            path.display()
        ));
    }
}

/// Records from the metadata export.
pub fn load_records(ctx: &StepContext) -> StepOpResult<Vec<MetadataRecord>> {
    Ok(read_metadata_csv(&ctx.layout.metadata_csv())?)
}

/// Locate ExifTool per settings and wrap it in an embedder.
pub fn locate_embedder(ctx: &StepContext) -> StepOpResult<MetadataEmbedder> {
    let embedding = &ctx.settings.embedding;
    let tool = ExifTool::locate(&embedding.exiftool_path, &embedding.min_version)?;
    let embedder = MetadataEmbedder::new(Box::new(tool));
    ctx.logger.info(&format!("Using {}", embedder.describe()));
    Ok(embedder)
}

/// The embedder prepared during setup.
pub fn prepared(embedder: &Option<MetadataEmbedder>) -> StepOpResult<&MetadataEmbedder> {
    embedder
        .as_ref()
        .ok_or_else(|| StepError::other("metadata tool was not set up"))
}

/// Apply the per-file failure policy.
///
/// A step where every attempted file failed always fails. Otherwise
/// failures are warnings unless `validation.fail_on_item_errors` is set.
pub fn check_item_failures(ctx: &StepContext, stats: &StepStats, v: &mut Validation) {
    if stats.failed == 0 {
        return;
    }
    if stats.processed == 0 {
        v.error(format!("all {} files failed", stats.failed));
    } else if ctx.settings.validation.fail_on_item_errors {
        v.error(format!(
            "{} of {} files failed",
            stats.failed,
            stats.attempted()
        ));
    } else {
        v.warn(format!(
            "{} of {} files failed and were left out",
            stats.failed,
            stats.attempted()
        ));
    }
}

/// Require at least `expected` files in an output folder.
pub fn check_output_count(v: &mut Validation, dir: &Path, extensions: &[&str], expected: usize) {
    match list_files(dir, extensions) {
        Ok(files) if files.len() < expected => v.error(format!(
            "expected {} files in {}, found {}",
            expected,
            dir.display(),
            files.len()
        )),
        Ok(_) => {}
        Err(e) => v.error(format!("cannot list {}: {}", dir.display(), e)),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::batch_context;
    use super::*;
    use crate::config::BatchSettings;
    use crate::orchestrator::pipeline::CancelHandle;
    use tempfile::tempdir;

    fn files(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/in").join(n)).collect()
    }

    #[test]
    fn process_files_counts_and_records_failures() {
        let dir = tempdir().unwrap();
        let ctx = batch_context(dir.path(), BatchSettings::default());
        let mut stats = StepStats::default();

        process_files(&ctx, "Test", &files(&["a.tif", "b.tif", "c.tif"]), &mut stats, |f| {
            match file_label(f).as_str() {
                "a.tif" => Ok(ItemOutcome::Done),
                "b.tif" => Err("file is locked".to_string()),
                _ => Ok(ItemOutcome::Skipped),
            }
        })
        .unwrap();

        assert_eq!((stats.processed, stats.failed, stats.skipped), (1, 1, 1));
        assert_eq!(stats.failed_items[0].item, "b.tif");
        assert_eq!(stats.failed_items[0].reason, "file is locked");
    }

    #[test]
    fn process_files_stops_when_cancelled() {
        let dir = tempdir().unwrap();
        let cancel = CancelHandle::new();
        let ctx = StepContext::new(
            crate::models::Batch::new("b", dir.path()),
            BatchSettings::default(),
            std::sync::Arc::new(crate::logging::BatchLogger::detached("t", None)),
            cancel.clone(),
        );
        cancel.cancel();

        let mut stats = StepStats::default();
        let err = process_files(&ctx, "Test", &files(&["a.tif"]), &mut stats, |_| {
            Ok(ItemOutcome::Done)
        })
        .unwrap_err();
        assert!(matches!(err, StepError::Cancelled));
        assert_eq!(stats.processed, 0);
    }

    #[test]
    fn failure_policy() {
        let dir = tempdir().unwrap();
        let mut ctx = batch_context(dir.path(), BatchSettings::default());
        let mut stats = StepStats {
            processed: 3,
            ..Default::default()
        };
        stats.fail("x.tif", "bad");

        let mut v = Validation::ok();
        check_item_failures(&ctx, &stats, &mut v);
        assert!(v.is_ok());
        assert_eq!(v.warnings.len(), 1);

        ctx.settings.validation.fail_on_item_errors = true;
        let mut v = Validation::ok();
        check_item_failures(&ctx, &stats, &mut v);
        assert_eq!(v.error_text(), "1 of 4 files failed");

        let all_failed = StepStats {
            failed: 2,
            ..Default::default()
        };
        ctx.settings.validation.fail_on_item_errors = false;
        let mut v = Validation::ok();
        check_item_failures(&ctx, &all_failed, &mut v);
        assert!(!v.is_ok());
    }

    #[test]
    fn output_path_swaps_extension() {
        let out = output_path(Path::new("/b/jpeg"), Path::new("/b/tiff/A-1.tif"), Some("jpg"));
        assert_eq!(out, PathBuf::from("/b/jpeg/A-1.jpg"));
        let same = output_path(Path::new("/b/out"), Path::new("/b/in/A-1.jpg"), None);
        assert_eq!(same, PathBuf::from("/b/out/A-1.jpg"));
    }
}
