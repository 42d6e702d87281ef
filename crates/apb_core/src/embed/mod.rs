//! Metadata embedding.
//!
//! Records are written into image files through an external tool
//! (ExifTool). Each field goes in twice: as legacy IIM, cut to the IIM byte
//! ceiling, and as XMP with the full value. `IPTC:CodedCharacterSet` is
//! always set to UTF-8.

mod embedder;
mod exiftool;
mod field_limits;
mod matching;

pub use embedder::{date_forms, plan_embed, EmbedPlan, EmbedReport, MetadataEmbedder, CODED_CHARACTER_SET_ARG};
pub use exiftool::{compare_versions, find_in_path, ExifTool, MetadataWriter, ToolError, ToolOutput};
pub use field_limits::{apply_limit, field_spec, truncate_to_bytes, FieldLengthOverflow, FieldSpec};
pub use matching::{match_records, MatchedImage, RecordMatch};

#[cfg(test)]
pub(crate) use embedder::testing;
