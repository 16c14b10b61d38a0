// Normalization pipeline: one raw sheet in, one canonical table out.
//
// Stages run in a fixed order and stop at the first failure:
//
//   validate → sanitize → normalize names → infer + coerce
//     → drop rows without measures → drop noise columns → dedup → validate
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{error, info};

use crate::coerce::{coerce_date, coerce_number};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::inference::{SchemaInference, SchemaInferencer};
use crate::sanitize::{sanitize, validate_sheet, validate_table};
use crate::table::{CanonicalColumn, CanonicalTable, ColumnData};
use crate::types::RawSheet;
use crate::util::{normalize_name, unique_name};

/// Fixed name given to the detected date column.
pub const DATE_COLUMN: &str = "data";

#[derive(Debug, Clone, Default)]
pub struct NormalizationPipeline {
    config: PipelineConfig,
}

impl NormalizationPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage over `sheet`.
    ///
    /// A panic inside a stage is reported as [`PipelineError::Processing`]
    /// instead of unwinding into the caller.
    pub fn run(&self, sheet: RawSheet) -> Result<CanonicalTable, PipelineError> {
        let sheet_name = sheet.name.clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.run_stages(sheet)))
            .unwrap_or_else(|panic| {
                let message = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                Err(PipelineError::Processing(message))
            });

        match &outcome {
            Ok(table) => info!(
                sheet = %sheet_name,
                rows = table.len(),
                columns = table.width(),
                "processed sheet"
            ),
            Err(e) => error!(sheet = %sheet_name, "{e}"),
        }
        outcome
    }

    fn run_stages(&self, sheet: RawSheet) -> Result<CanonicalTable, PipelineError> {
        validate_sheet(&sheet).map_err(PipelineError::EmptyInput)?;

        let mut sheet = sanitize(sheet, self.config.max_text_len);
        sheet.headers = normalize_headers(&sheet.headers);

        let inference = SchemaInferencer::new(&self.config.inference).infer(&sheet);
        let table = self.coerce_columns(&sheet, &inference)?;

        let mut table = drop_unmeasured_rows(&table);
        for noise in &self.config.noise_columns {
            if table.column(noise).is_some() {
                table = table.without_column(noise);
                info!(column = %noise, "dropped noise column");
            }
        }

        let table = table.dedup_rows();
        validate_table(&table).map_err(PipelineError::PostProcessingEmpty)?;
        Ok(table)
    }

    /// Build typed columns: the date column (renamed to [`DATE_COLUMN`]),
    /// the numeric columns, and text for everything else.
    fn coerce_columns(
        &self,
        sheet: &RawSheet,
        inference: &SchemaInference,
    ) -> Result<CanonicalTable, PipelineError> {
        let names = final_names(&sheet.headers, inference.date_column);
        let formats = self.config.inference.date_formats.as_slice();

        let columns = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let values = sheet.column_values(idx);
                let data = if Some(idx) == inference.date_column {
                    ColumnData::Date(values.map(|v| coerce_date(v, formats)).collect())
                } else if inference.numeric_columns.contains(&idx) {
                    ColumnData::Numeric(values.map(coerce_number).collect())
                } else {
                    ColumnData::Text(values.map(|v| v.to_text()).collect())
                };
                CanonicalColumn::new(name, data)
            })
            .collect();

        CanonicalTable::new(columns).map_err(|e| PipelineError::Processing(e.to_string()))
    }
}

/// Keep rows with at least one non-null numeric value. Tables without
/// numeric columns are returned as they are.
fn drop_unmeasured_rows(table: &CanonicalTable) -> CanonicalTable {
    let numeric: Vec<&CanonicalColumn> = table.numeric_columns().collect();
    if numeric.is_empty() {
        return table.clone();
    }
    table.filter_rows(|i| numeric.iter().any(|c| !c.data.is_null(i)))
}

/// Normalize every header, suffixing repeats so names stay unique.
pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    let mut taken = HashSet::new();
    headers
        .iter()
        .map(|h| {
            let name = unique_name(&normalize_name(h), &taken);
            taken.insert(name.clone());
            name
        })
        .collect()
}

/// Names after the date column takes [`DATE_COLUMN`]; any other column
/// already called that is moved out of the way.
fn final_names(headers: &[String], date_column: Option<usize>) -> Vec<String> {
    let Some(date_idx) = date_column else {
        return headers.to_vec();
    };
    let mut names = headers.to_vec();
    if names[date_idx] == DATE_COLUMN {
        return names;
    }
    if let Some(clash) = names.iter().position(|n| n == DATE_COLUMN) {
        let taken: HashSet<String> = names.iter().cloned().collect();
        names[clash] = unique_name(DATE_COLUMN, &taken);
    }
    names[date_idx] = DATE_COLUMN.to_string();
    names
}
