//! Normalized metadata CSV written by the mapping step and read back by
//! the later steps.

use std::fs;
use std::path::Path;

use super::mapper::{MappingError, MappingResult};
use crate::models::{IptcField, MetadataRecord};
use crate::storage::atomic_write;

/// Write `records` as UTF-8 CSV with one column per field in `fields`.
///
/// DateCreated is always written, even if absent from `fields`.
pub fn write_metadata_csv(
    path: &Path,
    fields: &[IptcField],
    records: &[MetadataRecord],
) -> MappingResult<()> {
    let mut columns: Vec<IptcField> = fields.to_vec();
    if !columns.contains(&IptcField::DateCreated) {
        columns.push(IptcField::DateCreated);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns.iter().map(|f| f.name()))?;
    for record in records {
        writer.write_record(columns.iter().map(|f| record.get(*f).unwrap_or("")))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| MappingError::Io {
            path: path.to_path_buf(),
            source: e.into_error(),
        })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| MappingError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    atomic_write(path, &bytes).map_err(|e| MappingError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read the normalized CSV. Columns that are not IPTC field names are
/// ignored.
pub fn read_metadata_csv(path: &Path) -> MappingResult<Vec<MetadataRecord>> {
    let bytes = fs::read(path).map_err(|e| MappingError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes.as_slice());

    let columns: Vec<Option<IptcField>> = reader
        .headers()?
        .iter()
        .map(IptcField::from_name)
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = MetadataRecord::new();
        for (value, field) in row.iter().zip(&columns) {
            if let Some(field) = field {
                if !value.is_empty() {
                    record.set(*field, value);
                }
            }
        }
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn header_uses_field_names_and_keeps_date() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("csv").join("metadata.csv");
        let records = vec![MetadataRecord::new()
            .with(IptcField::ObjectName, "A-1")
            .with(IptcField::CaptionAbstract, "Line one, with comma\nline two")
            .with(IptcField::DateCreated, "1947-00-00")];

        write_metadata_csv(
            &path,
            &[IptcField::ObjectName, IptcField::CaptionAbstract],
            &records,
        )
        .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ObjectName,Caption-Abstract,DateCreated\n"));

        let back = read_metadata_csv(&path).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn unknown_columns_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.csv");
        fs::write(&path, "ObjectName,Notes,DateCreated\nA-1,ignored,0000-00-00\n").unwrap();

        let records = read_metadata_csv(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier(), Some("A-1"));
        assert_eq!(records[0].date_created(), "0000-00-00");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = read_metadata_csv(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, MappingError::Io { .. }));
    }
}
