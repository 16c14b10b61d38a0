use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::TableError;
use crate::types::{CellValue, RawSheet};

/// Semantic role of a canonical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnRole {
    Date,
    Numeric,
    Text,
}

/// Typed, homogeneous column storage. `None` is a missing or unconvertible value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Date(Vec<Option<NaiveDateTime>>),
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Date(v) => v.len(),
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn role(&self) -> ColumnRole {
        match self {
            ColumnData::Date(_) => ColumnRole::Date,
            ColumnData::Numeric(_) => ColumnRole::Numeric,
            ColumnData::Text(_) => ColumnRole::Text,
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnData::Date(v) => v[row].is_none(),
            ColumnData::Numeric(v) => v[row].is_none(),
            ColumnData::Text(v) => v[row].is_none(),
        }
    }

    fn take(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Date(v) => ColumnData::Date(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Text(v) => ColumnData::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    fn key(&self, row: usize) -> CellKey {
        match self {
            ColumnData::Date(v) => v[row].map(CellKey::Date).unwrap_or(CellKey::Null),
            // +0.0 so that -0.0 and 0.0 hash alike
            ColumnData::Numeric(v) => v[row]
                .map(|f| CellKey::Number((f + 0.0).to_bits()))
                .unwrap_or(CellKey::Null),
            ColumnData::Text(v) => v[row].clone().map(CellKey::Text).unwrap_or(CellKey::Null),
        }
    }

    /// Value rendered as a string, used for grouping and export.
    pub fn display_value(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Date(v) => v[row].map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()),
            ColumnData::Numeric(v) => v[row].map(|f| f.to_string()),
            ColumnData::Text(v) => v[row].clone(),
        }
    }

    fn to_cell(&self, row: usize) -> CellValue {
        match self {
            ColumnData::Date(v) => v[row].into(),
            ColumnData::Numeric(v) => v[row].into(),
            ColumnData::Text(v) => v[row].clone().into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CellKey {
    Null,
    Date(NaiveDateTime),
    Number(u64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalColumn {
    pub name: String,
    pub data: ColumnData,
}

impl CanonicalColumn {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn role(&self) -> ColumnRole {
        self.data.role()
    }

    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_dates(&self) -> Option<&[Option<NaiveDateTime>]> {
        match &self.data {
            ColumnData::Date(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[Option<String>]> {
        match &self.data {
            ColumnData::Text(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Non-null numeric values; empty for non-numeric columns.
    pub fn numeric_values(&self) -> Vec<f64> {
        self.as_numeric()
            .map(|v| v.iter().flatten().copied().collect())
            .unwrap_or_default()
    }
}

/// Immutable, typed table produced by the normalization pipeline.
///
/// Columns share one length, names are unique and at most one column
/// holds the date role. Every transformation returns a new table.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTable {
    columns: Vec<CanonicalColumn>,
    rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub min: NaiveDateTime,
    pub max: NaiveDateTime,
}

/// Shape description handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub row_count: usize,
    pub column_count: usize,
    pub column_names: Vec<String>,
    pub date_range: Option<DateRange>,
    pub numeric_column_names: Vec<String>,
}

impl CanonicalTable {
    pub fn new(columns: Vec<CanonicalColumn>) -> Result<Self, TableError> {
        let rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        let mut names = HashSet::new();
        let mut date_column: Option<&str> = None;
        for col in &columns {
            if col.data.len() != rows {
                return Err(TableError::LengthMismatch {
                    name: col.name.clone(),
                    expected: rows,
                    actual: col.data.len(),
                });
            }
            if !names.insert(col.name.as_str()) {
                return Err(TableError::DuplicateColumn(col.name.clone()));
            }
            if col.role() == ColumnRole::Date {
                if let Some(existing) = date_column {
                    return Err(TableError::SecondDateColumn {
                        existing: existing.to_string(),
                        added: col.name.clone(),
                    });
                }
                date_column = Some(col.name.as_str());
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[CanonicalColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&CanonicalColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn date_column(&self) -> Option<&CanonicalColumn> {
        self.columns.iter().find(|c| c.role() == ColumnRole::Date)
    }

    pub fn numeric_columns(&self) -> impl Iterator<Item = &CanonicalColumn> + '_ {
        self.columns.iter().filter(|c| c.role() == ColumnRole::Numeric)
    }

    pub fn date_range(&self) -> Option<DateRange> {
        let dates = self.date_column()?.as_dates()?;
        let min = dates.iter().flatten().min()?;
        let max = dates.iter().flatten().max()?;
        Some(DateRange {
            min: *min,
            max: *max,
        })
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary {
            row_count: self.rows,
            column_count: self.columns.len(),
            column_names: self.column_names(),
            date_range: self.date_range(),
            numeric_column_names: self.numeric_columns().map(|c| c.name.clone()).collect(),
        }
    }

    /// New table holding the given rows, in the given order.
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| CanonicalColumn::new(c.name.clone(), c.data.take(rows)))
                .collect(),
            rows: rows.len(),
        }
    }

    /// New table with the rows for which `keep(row_index)` holds.
    pub fn filter_rows<F>(&self, keep: F) -> Self
    where
        F: Fn(usize) -> bool,
    {
        let rows: Vec<usize> = (0..self.rows).filter(|&i| keep(i)).collect();
        self.take_rows(&rows)
    }

    /// Drop rows identical across every column, keeping the first copy.
    pub fn dedup_rows(&self) -> Self {
        let mut seen: HashSet<Vec<CellKey>> = HashSet::with_capacity(self.rows);
        let rows: Vec<usize> = (0..self.rows)
            .filter(|&i| seen.insert(self.columns.iter().map(|c| c.data.key(i)).collect()))
            .collect();
        self.take_rows(&rows)
    }

    pub fn without_column(&self, name: &str) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .filter(|c| c.name != name)
                .cloned()
                .collect(),
            rows: self.rows,
        }
    }

    /// New table with `column` appended, or replacing the column of the same name.
    pub fn with_column(&self, column: CanonicalColumn) -> Result<Self, TableError> {
        let mut columns = self.columns.clone();
        match columns.iter().position(|c| c.name == column.name) {
            Some(idx) => columns[idx] = column,
            None => columns.push(column),
        }
        // A table without columns adopts the length of its first column.
        Self::new(columns)
    }

    /// Stable sort by the date column, nulls last. Unchanged without a date column.
    pub fn sorted_by_date(&self) -> Self {
        let Some(dates) = self.date_column().and_then(|c| c.as_dates()) else {
            return self.clone();
        };
        let mut order: Vec<usize> = (0..self.rows).collect();
        order.sort_by(|&a, &b| match (dates[a], dates[b]) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        self.take_rows(&order)
    }

    /// Row indices whose date falls inside the inclusive day range.
    /// Rows without a date never match a bounded range.
    pub fn rows_in_date_range(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<usize> {
        let Some(dates) = self.date_column().and_then(|c| c.as_dates()) else {
            return (0..self.rows).collect();
        };
        (0..self.rows)
            .filter(|&i| {
                if start.is_none() && end.is_none() {
                    return true;
                }
                match dates[i] {
                    Some(dt) => {
                        let day = dt.date();
                        start.map_or(true, |s| day >= s) && end.map_or(true, |e| day <= e)
                    }
                    None => false,
                }
            })
            .collect()
    }

    /// Render the table back into an untyped sheet.
    pub fn to_raw_sheet(&self, name: &str) -> RawSheet {
        let rows = (0..self.rows)
            .map(|i| self.columns.iter().map(|c| c.data.to_cell(i)).collect())
            .collect();
        RawSheet::new(name, self.column_names(), rows)
    }

    /// Header plus one string record per row, for CSV export.
    pub fn to_records(&self) -> Vec<Vec<String>> {
        let mut out = Vec::with_capacity(self.rows + 1);
        out.push(self.column_names());
        for i in 0..self.rows {
            out.push(
                self.columns
                    .iter()
                    .map(|c| c.data.display_value(i).unwrap_or_default())
                    .collect(),
            );
        }
        out
    }
}
