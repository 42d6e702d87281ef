//! Normalized metadata records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// IPTC fields produced by the spreadsheet mapping.
///
/// Declaration order is the canonical column order of the CSV export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IptcField {
    ObjectName,
    Headline,
    #[serde(rename = "Caption-Abstract")]
    CaptionAbstract,
    #[serde(rename = "By-line")]
    ByLine,
    #[serde(rename = "By-lineTitle")]
    ByLineTitle,
    CopyrightNotice,
    Source,
    Credit,
    City,
    #[serde(rename = "Province-State")]
    ProvinceState,
    #[serde(rename = "Country-PrimaryLocationName")]
    Country,
    #[serde(rename = "Sub-location")]
    SubLocation,
    DateCreated,
}

impl IptcField {
    /// Every field, in canonical order.
    pub const ALL: [IptcField; 13] = [
        IptcField::ObjectName,
        IptcField::Headline,
        IptcField::CaptionAbstract,
        IptcField::ByLine,
        IptcField::ByLineTitle,
        IptcField::CopyrightNotice,
        IptcField::Source,
        IptcField::Credit,
        IptcField::City,
        IptcField::ProvinceState,
        IptcField::Country,
        IptcField::SubLocation,
        IptcField::DateCreated,
    ];

    /// IPTC field name, as used in CSV headers and IIM tag names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ObjectName => "ObjectName",
            Self::Headline => "Headline",
            Self::CaptionAbstract => "Caption-Abstract",
            Self::ByLine => "By-line",
            Self::ByLineTitle => "By-lineTitle",
            Self::CopyrightNotice => "CopyrightNotice",
            Self::Source => "Source",
            Self::Credit => "Credit",
            Self::City => "City",
            Self::ProvinceState => "Province-State",
            Self::Country => "Country-PrimaryLocationName",
            Self::SubLocation => "Sub-location",
            Self::DateCreated => "DateCreated",
        }
    }

    /// Look up a field by its IPTC name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for IptcField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One normalized row of output metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    fields: BTreeMap<IptcField, String>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: IptcField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn set(&mut self, field: IptcField, value: impl Into<String>) {
        self.fields.insert(field, value.into());
    }

    /// Builder-style setter.
    pub fn with(mut self, field: IptcField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Identifier used to match the record to image files (ObjectName).
    pub fn identifier(&self) -> Option<&str> {
        self.get(IptcField::ObjectName)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Synthesized creation date.
    pub fn date_created(&self) -> &str {
        self.get(IptcField::DateCreated).unwrap_or("")
    }

    /// Non-empty fields in canonical order.
    pub fn non_empty(&self) -> impl Iterator<Item = (IptcField, &str)> {
        self.fields
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (*k, v.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (IptcField, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|v| v.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_resolve_both_ways() {
        for field in IptcField::ALL {
            assert_eq!(IptcField::from_name(field.name()), Some(field));
        }
        assert_eq!(IptcField::from_name("caption-abstract"), Some(IptcField::CaptionAbstract));
        assert_eq!(IptcField::from_name("Nope"), None);
    }

    #[test]
    fn identifier_ignores_blank_object_name() {
        let record = MetadataRecord::new().with(IptcField::ObjectName, "   ");
        assert_eq!(record.identifier(), None);

        let record = MetadataRecord::new().with(IptcField::ObjectName, " 1998.004.12 ");
        assert_eq!(record.identifier(), Some("1998.004.12"));
    }

    #[test]
    fn non_empty_follows_canonical_order() {
        let record = MetadataRecord::new()
            .with(IptcField::DateCreated, "1947-00-00")
            .with(IptcField::Headline, "Harbor at dusk")
            .with(IptcField::Source, "")
            .with(IptcField::ObjectName, "A-1");

        let fields: Vec<_> = record.non_empty().map(|(f, _)| f).collect();
        assert_eq!(
            fields,
            vec![IptcField::ObjectName, IptcField::Headline, IptcField::DateCreated]
        );
    }
}
