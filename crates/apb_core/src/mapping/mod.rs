//! Spreadsheet mapping.
//!
//! Turns a self-describing catalog spreadsheet (labels in one row, data
//! below) into normalized [`MetadataRecord`]s:
//! - column labels are matched to IPTC fields ([`labels`])
//! - every cell is repaired for mojibake ([`encoding`])
//! - year/month/day cells are combined into `DateCreated` ([`dates`])
//!
//! [`MetadataRecord`]: crate::models::MetadataRecord

mod csv_export;
pub mod dates;
pub mod encoding;
pub mod labels;
mod mapper;

pub use csv_export::{read_metadata_csv, write_metadata_csv};
pub use dates::{resolve_date_created, synthesize_date, DateOutcome, DateParts, UNKNOWN_DATE};
pub use encoding::{decode_input, repair_text, EncodingError};
pub use labels::{ColumnRole, SchemaMapping};
pub use mapper::{MappingError, MappingOutput, MappingResult, SpreadsheetMapper, SpreadsheetTable};
