use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tabled::Tabled;

use crate::util::format_number;

/// A single untyped spreadsheet cell, as read from the source file.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Missing, blank text, or NaN.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Natively numeric storage (not numeric-looking text).
    pub fn is_number(&self) -> bool {
        match self {
            CellValue::Int(_) => true,
            CellValue::Float(f) => !f.is_nan(),
            _ => false,
        }
    }

    /// Render the cell as text for category/text columns.
    pub fn to_text(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Int(i) => Some(i.to_string()),
            CellValue::Float(f) => Some(f.to_string()),
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(v: NaiveDateTime) -> Self {
        CellValue::DateTime(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

/// One sheet of a workbook: a header row plus data rows aligned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawSheet {
    /// Build a sheet, padding short rows with `Empty` and cutting long ones
    /// to the header width.
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Empty);
                row
            })
            .collect();
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }
}

fn fmt2(v: &f64) -> String {
    format_number(*v, 2)
}

fn fmt2_opt(v: &Option<f64>) -> String {
    match v {
        Some(v) => format_number(*v, 2),
        None => "-".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct SummaryKpis {
    #[tabled(rename = "Total", display_with = "fmt2")]
    pub total: f64,
    #[tabled(rename = "Average", display_with = "fmt2")]
    pub average: f64,
    #[tabled(rename = "Median", display_with = "fmt2")]
    pub median: f64,
    #[tabled(rename = "Min", display_with = "fmt2")]
    pub min: f64,
    #[tabled(rename = "Max", display_with = "fmt2")]
    pub max: f64,
    #[tabled(rename = "Count")]
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct PeriodComparison {
    #[tabled(rename = "CurrentStart")]
    pub current_start: NaiveDate,
    #[tabled(rename = "CurrentEnd")]
    pub current_end: NaiveDate,
    #[tabled(rename = "PreviousStart")]
    pub previous_start: NaiveDate,
    #[tabled(rename = "PreviousEnd")]
    pub previous_end: NaiveDate,
    #[tabled(rename = "CurrentTotal", display_with = "fmt2")]
    pub current_total: f64,
    #[tabled(rename = "PreviousTotal", display_with = "fmt2")]
    pub previous_total: f64,
    #[tabled(rename = "Change", display_with = "fmt2")]
    pub change: f64,
    /// `None` when the previous total is zero.
    #[tabled(rename = "ChangePct", display_with = "fmt2_opt")]
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct TemporalBucket {
    /// First calendar day of the bucket.
    #[tabled(rename = "Period")]
    pub bucket: NaiveDate,
    #[tabled(rename = "Total", display_with = "fmt2")]
    pub sum: f64,
    #[tabled(rename = "Mean", display_with = "fmt2_opt")]
    pub mean: Option<f64>,
    #[tabled(rename = "Count")]
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct CategoryBreakdownRow {
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "Total", display_with = "fmt2")]
    pub sum: f64,
    #[tabled(rename = "Mean", display_with = "fmt2_opt")]
    pub mean: Option<f64>,
    #[tabled(rename = "Count")]
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct OutlierRow {
    #[tabled(rename = "Row")]
    pub row: usize,
    #[tabled(rename = "Value", display_with = "fmt2")]
    pub value: f64,
}
