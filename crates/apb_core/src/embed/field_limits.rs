//! Legacy IIM byte ceilings and their XMP equivalents.
//!
//! IIM (the legacy IPTC encoding) caps each dataset at a fixed number of
//! bytes. Values over the cap are truncated for the IIM copy only; the XMP
//! copy always carries the full value.

use thiserror::Error;

use crate::models::IptcField;

/// How one field is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: IptcField,
    /// ExifTool tag for the IIM dataset.
    pub iim_tag: &'static str,
    /// IIM byte ceiling.
    pub max_bytes: usize,
    /// ExifTool tag for the unlimited XMP equivalent.
    pub xmp_tag: &'static str,
}

/// Look up the write policy of a field.
pub fn field_spec(field: IptcField) -> FieldSpec {
    let (iim_tag, max_bytes, xmp_tag) = match field {
        IptcField::ObjectName => ("IPTC:ObjectName", 64, "XMP-dc:Title"),
        IptcField::Headline => ("IPTC:Headline", 256, "XMP-photoshop:Headline"),
        IptcField::CaptionAbstract => ("IPTC:Caption-Abstract", 2000, "XMP-dc:Description"),
        IptcField::ByLine => ("IPTC:By-line", 32, "XMP-dc:Creator"),
        IptcField::ByLineTitle => ("IPTC:By-lineTitle", 32, "XMP-photoshop:AuthorsPosition"),
        IptcField::CopyrightNotice => ("IPTC:CopyrightNotice", 128, "XMP-dc:Rights"),
        IptcField::Source => ("IPTC:Source", 32, "XMP-photoshop:Source"),
        IptcField::Credit => ("IPTC:Credit", 32, "XMP-photoshop:Credit"),
        IptcField::City => ("IPTC:City", 32, "XMP-photoshop:City"),
        IptcField::ProvinceState => ("IPTC:Province-State", 32, "XMP-photoshop:State"),
        IptcField::Country => (
            "IPTC:Country-PrimaryLocationName",
            64,
            "XMP-photoshop:Country",
        ),
        IptcField::SubLocation => ("IPTC:Sub-location", 32, "XMP-iptcCore:Location"),
        IptcField::DateCreated => ("IPTC:DateCreated", 8, "XMP-photoshop:DateCreated"),
    };
    FieldSpec {
        field,
        iim_tag,
        max_bytes,
        xmp_tag,
    }
}

/// A value exceeded its IIM ceiling and was truncated in the IIM copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field} is {actual} bytes; IIM limit is {limit}, legacy copy truncated")]
pub struct FieldLengthOverflow {
    pub field: IptcField,
    pub limit: usize,
    pub actual: usize,
}

/// Longest prefix of `value` that fits in `max_bytes` without splitting a
/// UTF-8 sequence.
pub fn truncate_to_bytes(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Apply the IIM ceiling of `field` to `value`.
pub fn apply_limit(field: IptcField, value: &str) -> (&str, Option<FieldLengthOverflow>) {
    let spec = field_spec(field);
    let truncated = truncate_to_bytes(value, spec.max_bytes);
    let overflow = (truncated.len() < value.len()).then(|| FieldLengthOverflow {
        field,
        limit: spec.max_bytes,
        actual: value.len(),
    });
    (truncated, overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_field_has_a_policy() {
        for field in IptcField::ALL {
            let spec = field_spec(field);
            assert!(spec.max_bytes > 0);
            assert!(spec.iim_tag.starts_with("IPTC:"));
            assert!(spec.xmp_tag.starts_with("XMP-"));
            assert_eq!(spec.iim_tag.trim_start_matches("IPTC:"), field.name());
        }
    }

    #[test]
    fn known_ceilings() {
        assert_eq!(field_spec(IptcField::ByLine).max_bytes, 32);
        assert_eq!(field_spec(IptcField::Headline).max_bytes, 256);
        assert_eq!(field_spec(IptcField::CaptionAbstract).max_bytes, 2000);
    }

    #[test]
    fn short_values_pass_through() {
        let (value, overflow) = apply_limit(IptcField::Source, "Harbor Collection");
        assert_eq!(value, "Harbor Collection");
        assert!(overflow.is_none());
    }

    #[test]
    fn long_values_are_cut_on_char_boundary() {
        // 31 ASCII bytes + 'é' (2 bytes) = 33 bytes; the cut must not split 'é'.
        let value = format!("{}é", "a".repeat(31));
        let (truncated, overflow) = apply_limit(IptcField::ByLine, &value);
        assert_eq!(truncated, "a".repeat(31));
        assert_eq!(
            overflow,
            Some(FieldLengthOverflow {
                field: IptcField::ByLine,
                limit: 32,
                actual: 33
            })
        );
    }
}
