//! Map step - turns the staged spreadsheet into the metadata export.
//!
//! Reads the label row, maps every data row to a [`MetadataRecord`]
//! (repairing text and synthesizing `DateCreated`) and writes
//! `output/csv/metadata.csv`.
//!
//! [`MetadataRecord`]: crate::models::MetadataRecord

use std::path::PathBuf;

use super::common::require_files;
use crate::mapping::{read_metadata_csv, write_metadata_csv, MappingError, SpreadsheetMapper};
use crate::models::{list_files, SPREADSHEET_EXTENSIONS};
use crate::orchestrator::errors::{StepError, StepOpResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{StepContext, StepOutcome, StepStats, Validation};

pub struct MapSpreadsheetStep;

impl MapSpreadsheetStep {
    pub fn new() -> Self {
        Self
    }

    fn spreadsheet(ctx: &StepContext) -> StepOpResult<PathBuf> {
        let dir = ctx.layout.input_spreadsheet();
        list_files(&dir, SPREADSHEET_EXTENSIONS)
            .map_err(|e| StepError::io("listing spreadsheets", e))?
            .into_iter()
            .next()
            .ok_or_else(|| StepError::invalid_input(format!("no spreadsheet in {}", dir.display())))
    }
}

impl Default for MapSpreadsheetStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for MapSpreadsheetStep {
    fn number(&self) -> u8 {
        2
    }

    fn name(&self) -> &str {
        "Map spreadsheet"
    }

    fn description(&self) -> &str {
        "Map catalog rows to IPTC records and export metadata.csv"
    }

    fn validate_inputs(&self, ctx: &StepContext) -> Validation {
        let mut v = Validation::ok();
        let sheets = require_files(
            &mut v,
            &ctx.layout.input_spreadsheet(),
            SPREADSHEET_EXTENSIONS,
            "spreadsheet",
        );
        if sheets.len() > 1 {
            v.warn(format!(
                "{} spreadsheets staged; using {}",
                sheets.len(),
                sheets[0].display()
            ));
        }
        v
    }

    fn execute(&mut self, ctx: &StepContext, stats: &mut StepStats) -> StepOpResult<StepOutcome> {
        let sheet = Self::spreadsheet(ctx)?;
        let mapping = &ctx.settings.mapping;
        let mapper = SpreadsheetMapper::new(mapping.label_row, mapping.data_start_row);

        ctx.logger.section("Mapping");
        ctx.logger.info(&format!(
            "Reading {} (labels in row {}, data from row {})",
            sheet.display(),
            mapping.label_row,
            mapping.data_start_row
        ));
        let output = mapper.map_file(&sheet)?;

        if ctx.settings.validation.require_identifier_column && !output.schema.has_identifier() {
            return Err(MappingError::MissingIdentifier(mapping.label_row).into());
        }

        for warning in &output.warnings {
            ctx.logger.warn(warning);
        }
        stats.warnings = output.warnings.len();

        let fields = output.output_fields();
        let names: Vec<&str> = fields.iter().map(|f| f.name()).collect();
        ctx.logger.info(&format!("Mapped columns: {}", names.join(", ")));

        let unidentified = output
            .records
            .iter()
            .filter(|r| r.identifier().is_none())
            .count();
        if unidentified > 0 {
            ctx.logger.warn(&format!(
                "{} records have no Accession Number and cannot be matched to images",
                unidentified
            ));
            stats.warnings += 1;
        }

        write_metadata_csv(&ctx.layout.metadata_csv(), &fields, &output.records)?;
        stats.processed = output.records.len();
        stats.skipped = output.blank_rows;

        Ok(StepOutcome::Success(format!(
            "Mapped {} records ({} blank rows skipped)",
            stats.processed, stats.skipped
        )))
    }

    fn validate_outputs(&self, ctx: &StepContext, stats: &StepStats) -> Validation {
        let mut v = Validation::ok();
        let path = ctx.layout.metadata_csv();

        let records = match read_metadata_csv(&path) {
            Ok(records) => records,
            Err(e) => {
                v.error(format!("cannot read back {}: {}", path.display(), e));
                return v;
            }
        };

        if records.len() != stats.processed {
            v.error(format!(
                "{} has {} records, expected {}",
                path.display(),
                records.len(),
                stats.processed
            ));
        }
        if records.is_empty() {
            v.warn("spreadsheet has no data rows");
        }

        let malformed = records
            .iter()
            .filter(|r| {
                let date = r.date_created();
                !date.is_empty() && date.len() != 10
            })
            .count();
        if malformed > 0 {
            v.error(format!("{} records have a malformed DateCreated", malformed));
        }
        v
    }
}
