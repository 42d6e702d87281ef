//! Core data model shared by every component.

mod batch;
mod layout;
mod record;

pub use batch::{Batch, BatchStatus, StatusFilter, StepStatus, STEP_COUNT};
pub use layout::{file_stem, list_files, BatchLayout};
pub use record::{IptcField, MetadataRecord};

/// Extensions accepted as source/processed TIFF files.
pub const TIFF_EXTENSIONS: &[&str] = &["tif", "tiff"];

/// Extensions accepted as JPEG deliverables.
pub const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Extensions accepted as catalog spreadsheets.
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["csv", "tsv", "xlsx", "xlsm", "xls", "ods"];

/// Spreadsheet extensions read as workbooks rather than delimited text.
pub const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];
