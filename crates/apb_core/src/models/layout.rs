//! On-disk directory layout of a batch.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Resolves every well-known path inside a batch root.
///
/// ```text
/// <root>/
///   input/{tiff,spreadsheet}
///   output/{csv,tiff_processed,jpeg,jpeg_resized,jpeg_watermarked}
///   reports/  logs/  config/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    root: PathBuf,
}

impl BatchLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_tiff(&self) -> PathBuf {
        self.root.join("input").join("tiff")
    }

    pub fn input_spreadsheet(&self) -> PathBuf {
        self.root.join("input").join("spreadsheet")
    }

    pub fn output_csv(&self) -> PathBuf {
        self.root.join("output").join("csv")
    }

    pub fn tiff_processed(&self) -> PathBuf {
        self.root.join("output").join("tiff_processed")
    }

    pub fn jpeg(&self) -> PathBuf {
        self.root.join("output").join("jpeg")
    }

    pub fn jpeg_resized(&self) -> PathBuf {
        self.root.join("output").join("jpeg_resized")
    }

    pub fn jpeg_watermarked(&self) -> PathBuf {
        self.root.join("output").join("jpeg_watermarked")
    }

    pub fn reports(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub fn logs(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    /// Per-batch settings file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("batch.toml")
    }

    /// Normalized metadata export written by the mapping step.
    pub fn metadata_csv(&self) -> PathBuf {
        self.output_csv().join("metadata.csv")
    }

    /// Record/image matching report.
    pub fn match_report(&self) -> PathBuf {
        self.reports().join("match_report.json")
    }

    /// Every directory of the layout.
    pub fn all_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.input_tiff(),
            self.input_spreadsheet(),
            self.output_csv(),
            self.tiff_processed(),
            self.jpeg(),
            self.jpeg_resized(),
            self.jpeg_watermarked(),
            self.reports(),
            self.logs(),
            self.config_dir(),
        ]
    }

    /// Create any missing directories. Existing content is never touched.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in self.all_dirs() {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Whether every layout directory exists.
    pub fn is_complete(&self) -> bool {
        self.all_dirs().iter().all(|d| d.is_dir())
    }
}

/// Regular files in `dir` whose extension matches one of `extensions`
/// (case-insensitive), sorted by file name. A missing directory yields an
/// empty list.
pub fn list_files(dir: &Path, extensions: &[&str]) -> io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// File stem as an owned string, or empty.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
