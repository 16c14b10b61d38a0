// Input hardening and structural checks that bracket the pipeline.
use chrono::NaiveDate;
use tracing::debug;

use crate::error::ValidationError;
use crate::table::CanonicalTable;
use crate::types::{CellValue, RawSheet};

/// Drop rows where every cell is empty and cut every text cell to at most
/// `max_text_len` characters.
pub fn sanitize(sheet: RawSheet, max_text_len: usize) -> RawSheet {
    let before = sheet.len();
    let RawSheet {
        name,
        headers,
        rows,
    } = sheet;

    let mut truncated = 0usize;
    let rows: Vec<Vec<CellValue>> = rows
        .into_iter()
        .filter(|row| !row.iter().all(CellValue::is_empty))
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    CellValue::Text(s) if s.chars().count() > max_text_len => {
                        truncated += 1;
                        CellValue::Text(s.chars().take(max_text_len).collect())
                    }
                    other => other,
                })
                .collect()
        })
        .collect();

    debug!(
        sheet = %name,
        dropped_rows = before - rows.len(),
        truncated_cells = truncated,
        "sanitized sheet"
    );
    RawSheet {
        name,
        headers,
        rows,
    }
}

/// Structural check on raw input: at least one row and one column.
pub fn validate_sheet(sheet: &RawSheet) -> Result<(), ValidationError> {
    let subject = || format!("sheet '{}'", sheet.name);
    if sheet.width() == 0 {
        return Err(ValidationError::NoColumns(subject()));
    }
    if sheet.is_empty() {
        return Err(ValidationError::NoRows(subject()));
    }
    Ok(())
}

/// Same check on a processed table.
pub fn validate_table(table: &CanonicalTable) -> Result<(), ValidationError> {
    if table.width() == 0 {
        return Err(ValidationError::NoColumns("table".into()));
    }
    if table.is_empty() {
        return Err(ValidationError::NoRows("table".into()));
    }
    Ok(())
}

pub fn validate_date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => {
            Err(ValidationError::InvertedDateRange { start, end })
        }
        _ => Ok(()),
    }
}

/// A column exists and holds at least one numeric value.
pub fn validate_numeric_column(table: &CanonicalTable, column: &str) -> Result<(), ValidationError> {
    let col = table
        .column(column)
        .ok_or_else(|| ValidationError::UnknownColumn(column.to_string()))?;
    if col.numeric_values().is_empty() {
        return Err(ValidationError::NoNumericValues(column.to_string()));
    }
    Ok(())
}
