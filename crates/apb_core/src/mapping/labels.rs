//! Column label recognition.
//!
//! The label row names what each column holds. Labels are matched exactly
//! first; remaining columns are matched by case-insensitive containment,
//! trying longer labels before shorter ones so "Start Year" is never taken
//! for "Year".

use std::collections::HashSet;

use crate::models::IptcField;

/// Which date source a column feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateSource {
    /// The item's own date.
    Primary,
    /// Coverage start date, used when the item's date is blank.
    CoverageStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateComponent {
    Year,
    Month,
    Day,
}

/// What a column contributes to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    Field(IptcField),
    Date(DateSource, DateComponent),
}

/// Known labels and the role each one maps to.
pub const LABELS: &[(&str, ColumnRole)] = &[
    ("Accession Number", ColumnRole::Field(IptcField::ObjectName)),
    ("Title", ColumnRole::Field(IptcField::Headline)),
    ("Scopenote", ColumnRole::Field(IptcField::CaptionAbstract)),
    ("Source Photographer", ColumnRole::Field(IptcField::ByLine)),
    ("Institutional Creator", ColumnRole::Field(IptcField::ByLineTitle)),
    ("Restrictions", ColumnRole::Field(IptcField::CopyrightNotice)),
    ("Related Collection", ColumnRole::Field(IptcField::Source)),
    ("Credit Line", ColumnRole::Field(IptcField::Credit)),
    ("City", ColumnRole::Field(IptcField::City)),
    ("State", ColumnRole::Field(IptcField::ProvinceState)),
    ("Country", ColumnRole::Field(IptcField::Country)),
    ("Location", ColumnRole::Field(IptcField::SubLocation)),
    ("Year", ColumnRole::Date(DateSource::Primary, DateComponent::Year)),
    ("Month", ColumnRole::Date(DateSource::Primary, DateComponent::Month)),
    ("Day", ColumnRole::Date(DateSource::Primary, DateComponent::Day)),
    (
        "Start Year",
        ColumnRole::Date(DateSource::CoverageStart, DateComponent::Year),
    ),
    (
        "Start Month",
        ColumnRole::Date(DateSource::CoverageStart, DateComponent::Month),
    ),
    (
        "Start Day",
        ColumnRole::Date(DateSource::CoverageStart, DateComponent::Day),
    ),
];

/// Column roles inferred from a label row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaMapping {
    /// `(column index, role)` in column order.
    pub columns: Vec<(usize, ColumnRole)>,
    /// Non-empty labels that matched nothing.
    pub unmatched: Vec<String>,
    /// Labels whose role was already claimed by an earlier column.
    pub duplicates: Vec<String>,
}

impl SchemaMapping {
    /// Column index feeding `role`, if any.
    pub fn column_for(&self, role: ColumnRole) -> Option<usize> {
        self.columns
            .iter()
            .find(|(_, r)| *r == role)
            .map(|(idx, _)| *idx)
    }

    /// Mapped IPTC fields, canonical order, always including DateCreated.
    pub fn output_fields(&self) -> Vec<IptcField> {
        IptcField::ALL
            .into_iter()
            .filter(|field| {
                *field == IptcField::DateCreated
                    || self.column_for(ColumnRole::Field(*field)).is_some()
            })
            .collect()
    }

    pub fn has_identifier(&self) -> bool {
        self.column_for(ColumnRole::Field(IptcField::ObjectName))
            .is_some()
    }
}

/// Exact lookup of a single label.
pub fn exact_role(label: &str) -> Option<ColumnRole> {
    let label = label.trim();
    LABELS
        .iter()
        .find(|(known, _)| *known == label)
        .or_else(|| LABELS.iter().find(|(known, _)| known.eq_ignore_ascii_case(label)))
        .map(|(_, role)| *role)
}

/// Terms shorter than this only match as whole words.
const WORD_MATCH_BELOW: usize = 6;

/// Containment lookup: the first (longest) known label found inside
/// `label`, or a known label that contains `label`.
pub fn fuzzy_role(label: &str) -> Option<ColumnRole> {
    let needle = label.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    let mut by_length: Vec<&(&str, ColumnRole)> = LABELS.iter().collect();
    by_length.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    by_length
        .into_iter()
        .find(|(known, _)| {
            let known = known.to_lowercase();
            contains_term(&needle, &known)
                || (needle.len() >= 4 && contains_term(&known, &needle))
        })
        .map(|(_, role)| *role)
}

/// Whether `haystack` contains `term`. Short terms must line up with word
/// boundaries so "day" is not found in "holiday".
fn contains_term(haystack: &str, term: &str) -> bool {
    if term.len() >= WORD_MATCH_BELOW {
        return haystack.contains(term);
    }
    let words = |s: &str| -> Vec<String> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    };
    let term_words = words(term);
    if term_words.is_empty() {
        return false;
    }
    words(haystack)
        .windows(term_words.len())
        .any(|window| window == term_words.as_slice())
}

/// Infer column roles from the label row.
///
/// Exact matches are assigned in a first pass so that a fuzzy match on an
/// earlier column cannot steal a role another column names exactly. Within
/// each pass the first column wins.
pub fn infer_schema(labels: &[String]) -> SchemaMapping {
    let mut assigned: Vec<Option<ColumnRole>> = vec![None; labels.len()];
    let mut claimed: HashSet<ColumnRole> = HashSet::new();
    let mut duplicates = Vec::new();

    for (idx, label) in labels.iter().enumerate() {
        if let Some(role) = exact_role(label) {
            if claimed.insert(role) {
                assigned[idx] = Some(role);
            } else {
                duplicates.push(label.trim().to_string());
            }
        }
    }

    let mut unmatched = Vec::new();
    for (idx, label) in labels.iter().enumerate() {
        if assigned[idx].is_some() || exact_role(label).is_some() {
            continue;
        }
        let trimmed = label.trim();
        if trimmed.is_empty() {
            continue;
        }
        match fuzzy_role(trimmed) {
            Some(role) if claimed.insert(role) => assigned[idx] = Some(role),
            Some(_) => duplicates.push(trimmed.to_string()),
            None => unmatched.push(trimmed.to_string()),
        }
    }

    SchemaMapping {
        columns: assigned
            .into_iter()
            .enumerate()
            .filter_map(|(idx, role)| role.map(|r| (idx, r)))
            .collect(),
        unmatched,
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_labels_map() {
        assert_eq!(
            exact_role("Accession Number"),
            Some(ColumnRole::Field(IptcField::ObjectName))
        );
        assert_eq!(
            exact_role(" Scopenote "),
            Some(ColumnRole::Field(IptcField::CaptionAbstract))
        );
        assert_eq!(exact_role("Notes"), None);
    }

    #[test]
    fn fuzzy_prefers_longer_labels() {
        assert_eq!(
            fuzzy_role("Related collections"),
            Some(ColumnRole::Field(IptcField::Source))
        );
        assert_eq!(
            fuzzy_role("Coverage Start Year"),
            Some(ColumnRole::Date(DateSource::CoverageStart, DateComponent::Year))
        );
        assert_eq!(
            fuzzy_role("restrictions / rights"),
            Some(ColumnRole::Field(IptcField::CopyrightNotice))
        );
        assert_eq!(fuzzy_role("Box"), None);
    }

    #[test]
    fn short_labels_match_whole_words_only() {
        assert_eq!(fuzzy_role("Holiday"), None);
        assert_eq!(fuzzy_role("Ethnicity"), None);
        assert_eq!(fuzzy_role("Restriction Statement"), None);
        assert_eq!(
            fuzzy_role("City / Town"),
            Some(ColumnRole::Field(IptcField::City))
        );
        assert_eq!(
            fuzzy_role("Day (approx.)"),
            Some(ColumnRole::Date(DateSource::Primary, DateComponent::Day))
        );
        assert_eq!(
            fuzzy_role("Photographer"),
            Some(ColumnRole::Field(IptcField::ByLine))
        );
    }

    #[test]
    fn first_column_claims_a_field() {
        let schema = infer_schema(&labels(&["Title", "Accession Number", "Title"]));
        assert_eq!(
            schema.columns,
            vec![
                (0, ColumnRole::Field(IptcField::Headline)),
                (1, ColumnRole::Field(IptcField::ObjectName)),
            ]
        );
        assert_eq!(schema.duplicates, vec!["Title".to_string()]);
    }

    #[test]
    fn exact_match_beats_earlier_fuzzy_match() {
        let schema = infer_schema(&labels(&["Related collections", "Related Collection"]));
        assert_eq!(schema.column_for(ColumnRole::Field(IptcField::Source)), Some(1));
    }

    #[test]
    fn unmatched_columns_are_reported() {
        let schema = infer_schema(&labels(&["Accession Number", "Box", "", "Folder"]));
        assert_eq!(schema.unmatched, vec!["Box".to_string(), "Folder".to_string()]);
        assert!(schema.has_identifier());
    }

    #[test]
    fn output_fields_always_include_date() {
        let schema = infer_schema(&labels(&["Title", "Accession Number"]));
        assert_eq!(
            schema.output_fields(),
            vec![
                IptcField::ObjectName,
                IptcField::Headline,
                IptcField::DateCreated
            ]
        );
    }
}
