//! Spreadsheet to metadata record mapping.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use thiserror::Error;

use super::dates::{resolve_date_created, synthesize, DateOutcome, DateParts};
use super::encoding::{decode_input, repair_text, EncodingError};
use super::labels::{infer_schema, ColumnRole, DateComponent, DateSource, SchemaMapping};
use crate::models::{IptcField, MetadataRecord, WORKBOOK_EXTENSIONS};

/// Errors from reading or mapping a spreadsheet.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed spreadsheet: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unreadable workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Spreadsheet has {rows} rows; label row {label_row} is missing")]
    MissingLabelRow { label_row: usize, rows: usize },

    #[error("No column in label row {0} matches a known field")]
    NoMappedColumns(usize),

    #[error("No identifier column (Accession Number) in label row {0}")]
    MissingIdentifier(usize),
}

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Raw table read from disk.
#[derive(Debug, Clone, Default)]
pub struct SpreadsheetTable {
    pub rows: Vec<Vec<String>>,
    /// Set when the file was not valid UTF-8.
    pub encoding_warning: Option<EncodingError>,
}

/// Result of mapping a whole table.
#[derive(Debug, Clone, Default)]
pub struct MappingOutput {
    pub records: Vec<MetadataRecord>,
    pub schema: SchemaMapping,
    /// Human-readable notes (unmatched columns, bad dates, ...).
    pub warnings: Vec<String>,
    /// Data rows skipped because every cell was blank.
    pub blank_rows: usize,
}

impl MappingOutput {
    /// CSV columns: mapped fields in canonical order plus DateCreated.
    pub fn output_fields(&self) -> Vec<IptcField> {
        self.schema.output_fields()
    }
}

/// Reads catalog spreadsheets and maps rows to [`MetadataRecord`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpreadsheetMapper {
    /// 1-based row holding the labels.
    label_row: usize,
    /// 1-based first data row.
    data_start_row: usize,
}

impl Default for SpreadsheetMapper {
    fn default() -> Self {
        Self::new(3, 4)
    }
}

impl SpreadsheetMapper {
    pub fn new(label_row: usize, data_start_row: usize) -> Self {
        Self {
            label_row: label_row.max(1),
            data_start_row: data_start_row.max(label_row + 1),
        }
    }

    /// Read a spreadsheet file. Workbooks go through calamine; anything
    /// else is delimited text with the delimiter chosen by extension.
    pub fn read_table(&self, path: &Path) -> MappingResult<SpreadsheetTable> {
        if is_workbook(path) {
            return self.read_workbook(path);
        }
        let bytes = fs::read(path).map_err(|e| MappingError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let decoded = decode_input(&bytes);
        if let Some(ref warning) = decoded.warning {
            tracing::warn!(path = %path.display(), "{}", warning);
        }

        let text = decoded.text.as_str();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter_for(path))
            .from_reader(text.as_bytes());

        // The csv reader skips empty lines; re-insert them so row numbers
        // keep matching what the user sees in a spreadsheet program. A
        // quoted cell spanning lines still counts as one row.
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut next_line = 1usize;
        for record in reader.records() {
            let record = record?;
            if let Some(pos) = record.position() {
                let line = record_line(text, pos.byte() as usize);
                for _ in next_line..line {
                    rows.push(Vec::new());
                }
                let embedded_newlines: usize =
                    record.iter().map(|field| field.matches('\n').count()).sum();
                next_line = line + 1 + embedded_newlines;
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(SpreadsheetTable {
            rows,
            encoding_warning: decoded.warning,
        })
    }

    /// Read the first sheet of an Excel or OpenDocument workbook.
    ///
    /// Rows and columns before the sheet's used range are padded with
    /// blanks so row numbers match the sheet.
    fn read_workbook(&self, path: &Path) -> MappingResult<SpreadsheetTable> {
        let mut workbook = open_workbook_auto(path)?;
        let Some(sheet) = workbook.sheet_names().first().cloned() else {
            return Ok(SpreadsheetTable::default());
        };
        let range = workbook.worksheet_range(&sheet)?;
        let (first_row, first_col) = range.start().unwrap_or((0, 0));

        let mut rows: Vec<Vec<String>> = vec![Vec::new(); first_row as usize];
        for cells in range.rows() {
            let mut row = vec![String::new(); first_col as usize];
            row.extend(cells.iter().map(|cell| match cell {
                Data::Empty => String::new(),
                other => other.to_string(),
            }));
            rows.push(row);
        }

        tracing::debug!(path = %path.display(), sheet = %sheet, rows = rows.len(), "Read workbook");
        Ok(SpreadsheetTable {
            rows,
            encoding_warning: None,
        })
    }

    /// Read and map a spreadsheet file.
    pub fn map_file(&self, path: &Path) -> MappingResult<MappingOutput> {
        let table = self.read_table(path)?;
        let mut output = self.map_rows(&table.rows)?;
        if let Some(warning) = table.encoding_warning {
            output.warnings.insert(0, warning.to_string());
        }
        Ok(output)
    }

    /// Map already-read rows.
    pub fn map_rows(&self, rows: &[Vec<String>]) -> MappingResult<MappingOutput> {
        let labels = rows
            .get(self.label_row - 1)
            .ok_or(MappingError::MissingLabelRow {
                label_row: self.label_row,
                rows: rows.len(),
            })?;

        let repaired_labels: Vec<String> = labels.iter().map(|l| repair_text(l)).collect();
        let schema = infer_schema(&repaired_labels);
        if schema.columns.is_empty() {
            return Err(MappingError::NoMappedColumns(self.label_row));
        }

        let mut warnings = Vec::new();
        for label in &schema.unmatched {
            warnings.push(format!("Column '{}' matches no field and is dropped", label));
        }
        for label in &schema.duplicates {
            warnings.push(format!(
                "Column '{}' maps to a field already claimed by an earlier column",
                label
            ));
        }

        let mut records = Vec::new();
        let mut blank_rows = 0;
        for (offset, row) in rows.iter().skip(self.data_start_row - 1).enumerate() {
            let row_number = self.data_start_row + offset;
            if row.iter().all(|cell| cell.trim().is_empty()) {
                blank_rows += 1;
                continue;
            }
            let (record, date_warning) = map_row(&schema, row);
            if let Some(reason) = date_warning {
                warnings.push(format!("Row {}: {}", row_number, reason));
            }
            records.push(record);
        }

        tracing::debug!(
            records = records.len(),
            columns = schema.columns.len(),
            "Mapped spreadsheet"
        );

        Ok(MappingOutput {
            records,
            schema,
            warnings,
            blank_rows,
        })
    }
}

/// Map one data row. Returns a note when a date source was invalid.
fn map_row(schema: &SchemaMapping, row: &[String]) -> (MetadataRecord, Option<String>) {
    let mut record = MetadataRecord::new();
    let cells: Vec<String> = row.iter().map(|c| repair_text(c).trim().to_string()).collect();

    for (idx, role) in &schema.columns {
        if let ColumnRole::Field(field) = role {
            let value = cells.get(*idx).map(String::as_str).unwrap_or("");
            if !value.is_empty() {
                record.set(*field, value);
            }
        }
    }

    let primary = synthesize(date_parts(schema, &cells, DateSource::Primary));
    let fallback = synthesize(date_parts(schema, &cells, DateSource::CoverageStart));
    let date = resolve_date_created(&primary, &fallback);

    let warning = match (&primary, &fallback) {
        (DateOutcome::Invalid(reason), _) => Some(format!("invalid date ({})", reason)),
        (DateOutcome::Blank, DateOutcome::Invalid(reason)) => {
            Some(format!("invalid coverage start date ({})", reason))
        }
        _ => None,
    };

    record.set(IptcField::DateCreated, date);
    (record, warning)
}

fn date_parts<'a>(schema: &SchemaMapping, cells: &'a [String], source: DateSource) -> DateParts<'a> {
    let cell = move |component: DateComponent| {
        schema
            .column_for(ColumnRole::Date(source, component))
            .and_then(|idx| cells.get(idx))
            .map(String::as_str)
    };
    DateParts::new(
        cell(DateComponent::Year),
        cell(DateComponent::Month),
        cell(DateComponent::Day),
    )
}

/// 1-based line on which the record starting at `byte` has its text.
///
/// The csv reader may report the position of the terminators it skipped
/// before a record, so those are stepped over first.
fn record_line(text: &str, byte: usize) -> usize {
    let bytes = text.as_bytes();
    let mut start = byte.min(bytes.len());
    while matches!(bytes.get(start), Some(b'\r' | b'\n')) {
        start += 1;
    }
    bytes[..start].iter().filter(|b| **b == b'\n').count() + 1
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn is_workbook(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| WORKBOOK_EXTENSIONS.contains(&ext.as_str()))
}

fn delimiter_for(path: &Path) -> u8 {
    match extension_of(path).as_deref() {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rows(lines: &[&[&str]]) -> Vec<Vec<String>> {
        lines
            .iter()
            .map(|l| l.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn sample() -> Vec<Vec<String>> {
        rows(&[
            &["Collection export", "", "", "", "", ""],
            &["", "", "", "", "", ""],
            &["Accession Number", "Title", "Year", "Month", "Start Year", "Box"],
            &["A-001", "Harbor at dawn", "1947", "6", "", "1"],
            &["A-002", "Caf\u{00C3}\u{00A9} interior", "", "", "1950", "1"],
            &["", "", "", "", "", ""],
            &["A-003", "Street", "", "", "", "2"],
            &["A-004", "Bad date", "1947", "13", "1950", "2"],
        ])
    }

    #[test]
    fn maps_records_with_dates() {
        let output = SpreadsheetMapper::default().map_rows(&sample()).unwrap();

        assert_eq!(output.records.len(), 4);
        assert_eq!(output.blank_rows, 1);

        let first = &output.records[0];
        assert_eq!(first.identifier(), Some("A-001"));
        assert_eq!(first.get(IptcField::Headline), Some("Harbor at dawn"));
        assert_eq!(first.date_created(), "1947-06-00");
    }

    #[test]
    fn fallback_and_placeholder_dates() {
        let output = SpreadsheetMapper::default().map_rows(&sample()).unwrap();
        assert_eq!(output.records[1].date_created(), "1950-00-00");
        assert_eq!(output.records[2].date_created(), "0000-00-00");
    }

    #[test]
    fn invalid_primary_date_uses_fallback_and_warns() {
        let output = SpreadsheetMapper::default().map_rows(&sample()).unwrap();
        assert_eq!(output.records[3].date_created(), "1950-00-00");
        assert!(output.warnings.iter().any(|w| w.starts_with("Row 8: invalid date")));
    }

    #[test]
    fn cells_are_repaired() {
        let output = SpreadsheetMapper::default().map_rows(&sample()).unwrap();
        assert_eq!(
            output.records[1].get(IptcField::Headline),
            Some("Café interior")
        );
    }

    #[test]
    fn unmatched_columns_are_dropped_with_warning() {
        let output = SpreadsheetMapper::default().map_rows(&sample()).unwrap();
        assert!(output.warnings.iter().any(|w| w.contains("'Box'")));
        assert_eq!(
            output.output_fields(),
            vec![
                IptcField::ObjectName,
                IptcField::Headline,
                IptcField::DateCreated
            ]
        );
    }

    #[test]
    fn short_table_is_an_error() {
        let err = SpreadsheetMapper::default()
            .map_rows(&rows(&[&["only one row"]]))
            .unwrap_err();
        assert!(matches!(
            err,
            MappingError::MissingLabelRow {
                label_row: 3,
                rows: 1
            }
        ));
    }

    #[test]
    fn custom_rows_are_honored() {
        let table = rows(&[&["Accession Number", "Title"], &["X-1", "First"]]);
        let output = SpreadsheetMapper::new(1, 2).map_rows(&table).unwrap();
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].identifier(), Some("X-1"));
    }

    #[test]
    fn reads_tsv_and_cp1252_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.tsv");
        let mut bytes = b"export\n\nAccession Number\tTitle\n".to_vec();
        bytes.extend_from_slice(b"B-1\tEspa\xF1a\n");
        fs::write(&path, bytes).unwrap();

        let output = SpreadsheetMapper::default().map_file(&path).unwrap();
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].get(IptcField::Headline), Some("España"));
        assert!(output.warnings[0].contains("Windows-1252"));
    }

    #[test]
    fn blank_line_before_labels_keeps_row_numbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        fs::write(&path, "export\n\nAccession Number,Title\nA-1,Harbor\n").unwrap();

        let table = SpreadsheetMapper::default().read_table(&path).unwrap();
        assert_eq!(
            table.rows,
            rows(&[
                &["export"],
                &[],
                &["Accession Number", "Title"],
                &["A-1", "Harbor"],
            ])
        );
    }

    #[test]
    fn multiline_cell_and_crlf_keep_row_numbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        fs::write(
            &path,
            "\"export\nline two\"\r\n\r\nAccession Number,Title\r\n\r\nA-1,Harbor\r\n",
        )
        .unwrap();

        let table = SpreadsheetMapper::default().read_table(&path).unwrap();
        assert_eq!(table.rows.len(), 5);
        assert_eq!(table.rows[0], vec!["export\nline two".to_string()]);
        assert!(table.rows[1].is_empty());
        assert_eq!(table.rows[2][0], "Accession Number");
        assert!(table.rows[3].is_empty());
        assert_eq!(table.rows[4][0], "A-1");
    }

    #[test]
    fn reads_first_workbook_sheet() {
        use rust_xlsxwriter::Workbook;

        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Collection export").unwrap();
        sheet.write_string(2, 0, "Accession Number").unwrap();
        sheet.write_string(2, 1, "Title").unwrap();
        sheet.write_string(2, 2, "Year").unwrap();
        sheet.write_string(3, 0, "X-7").unwrap();
        sheet.write_string(3, 1, "Pier").unwrap();
        sheet.write_number(3, 2, 1952).unwrap();
        workbook.save(&path).unwrap();

        let output = SpreadsheetMapper::default().map_file(&path).unwrap();
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].identifier(), Some("X-7"));
        assert_eq!(output.records[0].get(IptcField::Headline), Some("Pier"));
        assert_eq!(output.records[0].date_created(), "1952-00-00");
    }

    #[test]
    fn corrupt_workbook_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.xlsx");
        fs::write(&path, "not a zip archive").unwrap();

        let err = SpreadsheetMapper::default().read_table(&path).unwrap_err();
        assert!(matches!(err, MappingError::Workbook(_)));
    }
}
