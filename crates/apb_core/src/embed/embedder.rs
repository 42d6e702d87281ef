//! Dual-encoding metadata embedder.

use std::path::Path;

use super::exiftool::{MetadataWriter, ToolError, ToolOutput};
use super::field_limits::{apply_limit, field_spec, FieldLengthOverflow};
use crate::mapping::UNKNOWN_DATE;
use crate::models::{IptcField, MetadataRecord};

/// Always written so readers decode IIM strings as UTF-8.
pub const CODED_CHARACTER_SET_ARG: &str = "-IPTC:CodedCharacterSet=UTF8";

/// Tag arguments for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedPlan {
    pub tag_args: Vec<String>,
    /// Fields whose IIM copy was truncated.
    pub overflows: Vec<FieldLengthOverflow>,
    /// Number of fields written (each as IIM and XMP).
    pub fields: usize,
}

/// Result of embedding one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedReport {
    pub fields: usize,
    pub overflows: Vec<FieldLengthOverflow>,
    pub output: ToolOutput,
}

/// IIM date (`YYYY:MM:DD`) and XMP date (`YYYY`, `YYYY-MM` or
/// `YYYY-MM-DD`) for a synthesized `DateCreated`.
///
/// Dates without a year carry nothing XMP can express and are not written.
pub fn date_forms(value: &str) -> Option<(String, String)> {
    let value = value.trim();
    if value == UNKNOWN_DATE || value.len() != 10 || !value.is_ascii() {
        return None;
    }
    let (year, month, day) = (&value[0..4], &value[5..7], &value[8..10]);
    if year == "0000" {
        return None;
    }

    let iim = format!("{}:{}:{}", year, month, day);
    let xmp = match (month, day) {
        ("00", _) => year.to_string(),
        (_, "00") => format!("{}-{}", year, month),
        _ => value.to_string(),
    };
    Some((iim, xmp))
}

/// Build the tag arguments for `record`.
///
/// Every non-empty field is written twice: the IIM copy within its byte
/// ceiling and the XMP copy with the full value.
pub fn plan_embed(record: &MetadataRecord) -> EmbedPlan {
    let mut plan = EmbedPlan {
        tag_args: vec![CODED_CHARACTER_SET_ARG.to_string()],
        ..Default::default()
    };

    for (field, value) in record.non_empty() {
        let spec = field_spec(field);

        if field == IptcField::DateCreated {
            if let Some((iim, xmp)) = date_forms(value) {
                plan.tag_args.push(format!("-{}={}", spec.iim_tag, iim));
                plan.tag_args.push(format!("-{}={}", spec.xmp_tag, xmp));
                plan.fields += 1;
            }
            continue;
        }

        let (legacy, overflow) = apply_limit(field, value);
        plan.tag_args.push(format!("-{}={}", spec.iim_tag, legacy));
        plan.tag_args.push(format!("-{}={}", spec.xmp_tag, value));
        plan.fields += 1;
        if let Some(overflow) = overflow {
            plan.overflows.push(overflow);
        }
    }

    plan
}

/// Writes records into image files through a [`MetadataWriter`].
pub struct MetadataEmbedder {
    writer: Box<dyn MetadataWriter>,
}

impl MetadataEmbedder {
    pub fn new(writer: Box<dyn MetadataWriter>) -> Self {
        Self { writer }
    }

    /// Description of the underlying tool, for logs.
    pub fn describe(&self) -> String {
        self.writer.describe()
    }

    /// Embed `record` into `file` in place. All-or-nothing per file.
    pub fn embed(&self, file: &Path, record: &MetadataRecord) -> Result<EmbedReport, ToolError> {
        let plan = plan_embed(record);
        for overflow in &plan.overflows {
            tracing::warn!(file = %file.display(), "{}", overflow);
        }

        let output = self.writer.write_tags(file, &plan.tag_args)?;
        Ok(EmbedReport {
            fields: plan.fields,
            overflows: plan.overflows,
            output,
        })
    }

    /// Carry every tag from `source` to a re-encoded `target`.
    pub fn copy_metadata(&self, source: &Path, target: &Path) -> Result<ToolOutput, ToolError> {
        self.writer.copy_tags(source, target)
    }
}
