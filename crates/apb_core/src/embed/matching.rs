//! Record to image matching by identifier.
//!
//! A record matches an image when its ObjectName equals the image file
//! stem, ignoring case and surrounding whitespace.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::models::{file_stem, MetadataRecord};

/// One record paired with one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedImage {
    pub identifier: String,
    /// Index into the record slice given to [`match_records`].
    pub record_index: usize,
    pub file: PathBuf,
}

/// Outcome of matching a record set against a directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordMatch {
    pub matched: Vec<MatchedImage>,
    pub records_without_images: Vec<String>,
    pub images_without_records: Vec<PathBuf>,
    /// Identifiers used by more than one record; the first record wins.
    pub duplicate_identifiers: Vec<String>,
    /// Records with a blank ObjectName (cannot be matched).
    pub records_without_identifier: usize,
}

impl RecordMatch {
    /// Record matched to `file`, if any.
    pub fn record_for<'a>(
        &self,
        records: &'a [MetadataRecord],
        file: &Path,
    ) -> Option<&'a MetadataRecord> {
        self.matched
            .iter()
            .find(|m| m.file == file)
            .and_then(|m| records.get(m.record_index))
    }
}

fn match_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Pair records with image files.
pub fn match_records(records: &[MetadataRecord], files: &[PathBuf]) -> RecordMatch {
    let mut result = RecordMatch::default();
    let mut by_id: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        let Some(id) = record.identifier() else {
            result.records_without_identifier += 1;
            continue;
        };
        let key = match_key(id);
        if by_id.contains_key(&key) {
            if !result.duplicate_identifiers.contains(&id.to_string()) {
                result.duplicate_identifiers.push(id.to_string());
            }
            continue;
        }
        by_id.insert(key.clone(), idx);
        order.push(key);
    }

    let mut claimed: HashSet<String> = HashSet::new();
    for file in files {
        let key = match_key(&file_stem(file));
        match by_id.get(&key) {
            Some(&record_index) if !claimed.contains(&key) => {
                claimed.insert(key);
                result.matched.push(MatchedImage {
                    identifier: records[record_index]
                        .identifier()
                        .unwrap_or_default()
                        .to_string(),
                    record_index,
                    file: file.clone(),
                });
            }
            _ => result.images_without_records.push(file.clone()),
        }
    }

    for key in order {
        if !claimed.contains(&key) {
            if let Some(id) = by_id.get(&key).and_then(|&i| records[i].identifier()) {
                result.records_without_images.push(id.to_string());
            }
        }
    }

    result
}
