//! Per-batch settings with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::imaging::{ResizeSpec, WatermarkSpec};

/// Root settings structure for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Source files selected for the batch.
    #[serde(default)]
    pub inputs: InputSettings,

    /// Spreadsheet layout.
    #[serde(default)]
    pub mapping: MappingSettings,

    /// Validation toggles.
    #[serde(default)]
    pub validation: ValidationSettings,

    /// Metadata tool settings.
    #[serde(default)]
    pub embedding: EmbeddingSettings,

    /// JPEG conversion.
    #[serde(default)]
    pub jpeg: JpegSettings,

    /// Bounded resize.
    #[serde(default)]
    pub resize: ResizeSettings,

    /// Watermarking of restricted images.
    #[serde(default)]
    pub watermark: WatermarkSettings,

    /// Mirror of step completion (`step_N = true`).
    #[serde(default)]
    pub steps: BTreeMap<String, bool>,

    /// Step-specific extension data.
    #[serde(default)]
    pub extensions: toml::Table,
}

impl BatchSettings {
    /// Check value ranges. Returns one message per problem.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.mapping.label_row == 0 {
            problems.push("mapping.label_row must be at least 1".to_string());
        }
        if self.mapping.data_start_row <= self.mapping.label_row {
            problems.push(format!(
                "mapping.data_start_row ({}) must come after label_row ({})",
                self.mapping.data_start_row, self.mapping.label_row
            ));
        }
        if !(1..=100).contains(&self.jpeg.quality) {
            problems.push(format!("jpeg.quality {} is outside 1-100", self.jpeg.quality));
        }
        if self.resize.max_dimension == 0 {
            problems.push("resize.max_dimension must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.watermark.opacity) {
            problems.push(format!(
                "watermark.opacity {} is outside 0.0-1.0",
                self.watermark.opacity
            ));
        }

        problems
    }

    /// Completion flag mirrored for `step`.
    pub fn step_completed(&self, step: u8) -> bool {
        self.steps.get(&step_key(step)).copied().unwrap_or(false)
    }

    /// Resize parameters as an immutable spec.
    pub fn resize_spec(&self) -> ResizeSpec {
        ResizeSpec::new(self.resize.max_dimension)
    }

    /// Watermark parameters as an immutable spec.
    pub fn watermark_spec(&self) -> WatermarkSpec {
        WatermarkSpec::new(PathBuf::from(&self.watermark.overlay_path), self.watermark.opacity)
    }
}

/// Key used in the `[steps]` table.
pub fn step_key(step: u8) -> String {
    format!("step_{}", step)
}

/// Source file selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSettings {
    /// Catalog spreadsheet (CSV, TSV or workbook) to stage into the batch.
    #[serde(default)]
    pub spreadsheet_path: String,

    /// Directory of scanned TIFFs to stage into the batch.
    #[serde(default)]
    pub tiff_dir: String,

    /// Skip copying a file already staged with the same size.
    #[serde(default = "default_true")]
    pub skip_existing: bool,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            spreadsheet_path: String::new(),
            tiff_dir: String::new(),
            skip_existing: true,
        }
    }
}

/// Spreadsheet layout (1-based rows).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSettings {
    /// Row holding the semantic field labels.
    #[serde(default = "default_label_row")]
    pub label_row: usize,

    /// First data row.
    #[serde(default = "default_data_start_row")]
    pub data_start_row: usize,
}

fn default_label_row() -> usize {
    3
}

fn default_data_start_row() -> usize {
    4
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            label_row: default_label_row(),
            data_start_row: default_data_start_row(),
        }
    }
}

/// Validation toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Treat any per-file failure as a failed step.
    #[serde(default)]
    pub fail_on_item_errors: bool,

    /// Fail the matching step when any record has no image.
    #[serde(default)]
    pub require_all_records_matched: bool,

    /// Fail the mapping step when the spreadsheet has no ObjectName column.
    #[serde(default = "default_true")]
    pub require_identifier_column: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            fail_on_item_errors: false,
            require_all_records_matched: false,
            require_identifier_column: true,
        }
    }
}

/// Metadata tool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Path to exiftool (empty = search PATH).
    #[serde(default)]
    pub exiftool_path: String,

    /// Minimum accepted exiftool version.
    #[serde(default = "default_min_version")]
    pub min_version: String,
}

fn default_min_version() -> String {
    "10.80".to_string()
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            exiftool_path: String::new(),
            min_version: default_min_version(),
        }
    }
}

/// JPEG conversion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JpegSettings {
    /// Encoder quality (1-100).
    #[serde(default = "default_quality")]
    pub quality: u8,
}

fn default_quality() -> u8 {
    95
}

impl Default for JpegSettings {
    fn default() -> Self {
        Self {
            quality: default_quality(),
        }
    }
}

/// Bounded resize settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResizeSettings {
    /// Longest allowed side in pixels.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
}

fn default_max_dimension() -> u32 {
    1600
}

impl Default for ResizeSettings {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
        }
    }
}

/// Watermark settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSettings {
    /// Square overlay image (PNG with alpha recommended).
    #[serde(default)]
    pub overlay_path: String,

    /// Blend coefficient in [0, 1]; 0 leaves images untouched.
    #[serde(default = "default_opacity")]
    pub opacity: f64,

    /// Copy unrestricted images into the watermarked folder unchanged.
    #[serde(default = "default_true")]
    pub copy_unrestricted: bool,
}

fn default_opacity() -> f64 {
    0.35
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            overlay_path: String::new(),
            opacity: default_opacity(),
            copy_unrestricted: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Configuration sections that can be updated independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Inputs,
    Mapping,
    Validation,
    Embedding,
    Jpeg,
    Resize,
    Watermark,
    Steps,
    Extensions,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 9] = [
        ConfigSection::Inputs,
        ConfigSection::Mapping,
        ConfigSection::Validation,
        ConfigSection::Embedding,
        ConfigSection::Jpeg,
        ConfigSection::Resize,
        ConfigSection::Watermark,
        ConfigSection::Steps,
        ConfigSection::Extensions,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Inputs => "inputs",
            ConfigSection::Mapping => "mapping",
            ConfigSection::Validation => "validation",
            ConfigSection::Embedding => "embedding",
            ConfigSection::Jpeg => "jpeg",
            ConfigSection::Resize => "resize",
            ConfigSection::Watermark => "watermark",
            ConfigSection::Steps => "steps",
            ConfigSection::Extensions => "extensions",
        }
    }

    /// Look up a section by table name.
    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.table_name() == name)
    }

    /// Comment written above the table.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Inputs => "Source spreadsheet and TIFF directory",
            ConfigSection::Mapping => "Spreadsheet layout (1-based rows)",
            ConfigSection::Validation => "Validation toggles",
            ConfigSection::Embedding => "Metadata tool (exiftool)",
            ConfigSection::Jpeg => "JPEG conversion",
            ConfigSection::Resize => "Bounded resize",
            ConfigSection::Watermark => "Watermark for restricted images",
            ConfigSection::Steps => "Step completion (mirrors the batch registry)",
            ConfigSection::Extensions => "Step-specific extension data",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = BatchSettings::default();
        assert!(settings.validate().is_empty());
        assert_eq!(settings.mapping.label_row, 3);
        assert_eq!(settings.mapping.data_start_row, 4);
    }

    #[test]
    fn validate_reports_each_problem() {
        let mut settings = BatchSettings::default();
        settings.watermark.opacity = 1.5;
        settings.jpeg.quality = 0;
        settings.mapping.data_start_row = 2;

        let problems = settings.validate();
        assert_eq!(problems.len(), 3);
        assert!(problems.iter().any(|p| p.contains("opacity")));
    }

    #[test]
    fn partial_toml_gets_defaults() {
        let settings: BatchSettings = toml::from_str("[resize]\nmax_dimension = 800\n").unwrap();
        assert_eq!(settings.resize.max_dimension, 800);
        assert_eq!(settings.jpeg.quality, 95);
        assert!(settings.inputs.skip_existing);
    }

    #[test]
    fn step_mirror_lookup() {
        let mut settings = BatchSettings::default();
        settings.steps.insert(step_key(2), true);
        assert!(settings.step_completed(2));
        assert!(!settings.step_completed(3));
    }
}
