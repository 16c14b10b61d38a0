use std::path::Path;

use serde::Serialize;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

use crate::error::OutputError;
use crate::table::CanonicalTable;

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), OutputError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush().map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Header row plus every record of `table`; nulls are written as empty fields.
pub fn write_table_csv(path: &Path, table: &CanonicalTable) -> Result<(), OutputError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for record in table.to_records() {
        wtr.write_record(&record)?;
    }
    wtr.flush().map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), OutputError> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Markdown rendering of the first `max_rows` rows.
pub fn render_rows<T>(rows: &[T], max_rows: usize) -> String
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(slice).with(Style::markdown()).to_string()
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{}\n", render_rows(rows, max_rows));
}

/// Markdown rendering of a canonical table, cut to `max_rows` rows.
pub fn render_canonical(table: &CanonicalTable, max_rows: usize) -> String {
    let mut records = table.to_records().into_iter();
    let Some(header) = records.next() else {
        return "(no rows)".to_string();
    };
    let mut builder = Builder::default();
    builder.push_record(header);
    for record in records.take(max_rows) {
        builder.push_record(record);
    }
    builder.build().with(Style::markdown()).to_string()
}
