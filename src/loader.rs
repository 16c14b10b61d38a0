// Workbook ingestion: file precondition, format dispatch, per-sheet isolation.
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use tracing::{info, warn};

use crate::error::{FileAccessError, LoadError};
use crate::types::{CellValue, RawSheet};

const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total_sheets: usize,
    pub loaded_sheets: usize,
    pub skipped_sheets: usize,
}

/// Sheets that held at least one data row, in workbook order.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<RawSheet>,
}

impl Workbook {
    /// The sheet called `name`, or the first sheet when the name is absent
    /// or unknown.
    pub fn sheet(&self, name: Option<&str>) -> Option<&RawSheet> {
        name.and_then(|n| self.sheets.iter().find(|s| s.name == n))
            .or_else(|| self.sheets.first())
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Reject paths that do not exist, are not regular files, or exceed
/// `max_size_mb`.
pub fn validate_file_path(path: &Path, max_size_mb: u64) -> Result<(), FileAccessError> {
    if !path.exists() {
        return Err(FileAccessError::NotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(FileAccessError::NotAFile(path.to_path_buf()));
    }
    let size_mb = path.metadata()?.len() as f64 / (1024.0 * 1024.0);
    if size_mb > max_size_mb as f64 {
        return Err(FileAccessError::TooLarge {
            size_mb,
            max_mb: max_size_mb,
        });
    }
    Ok(())
}

/// Check the file, then read every sheet. A sheet that cannot be read is
/// logged and skipped; the load fails only when nothing usable remains.
pub fn load_workbook(path: &Path, max_size_mb: u64) -> Result<(Workbook, LoadReport), LoadError> {
    validate_file_path(path, max_size_mb)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let (sheets, report) = if extension == "csv" {
        load_csv(path)?
    } else if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
        load_spreadsheet(path)?
    } else {
        return Err(LoadError::UnsupportedFormat(extension));
    };

    info!(
        file = %path.display(),
        total = report.total_sheets,
        loaded = report.loaded_sheets,
        skipped = report.skipped_sheets,
        "loaded workbook"
    );
    if sheets.is_empty() {
        return Err(LoadError::NoSheets(PathBuf::from(path)));
    }
    Ok((Workbook { sheets }, report))
}

fn load_spreadsheet(path: &Path) -> Result<(Vec<RawSheet>, LoadReport), LoadError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| LoadError::Workbook(e.to_string()))?;
    let names: Vec<String> = workbook.sheet_names().to_vec();

    let mut report = LoadReport {
        total_sheets: names.len(),
        ..LoadReport::default()
    };
    let mut sheets = Vec::new();
    for name in names {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                warn!(sheet = %name, error = %e, "skipping unreadable sheet");
                report.skipped_sheets += 1;
                continue;
            }
        };

        let mut rows = range.rows();
        let Some(header_row) = rows.next() else {
            warn!(sheet = %name, "skipping empty sheet");
            report.skipped_sheets += 1;
            continue;
        };
        let headers = header_names(header_row.iter().map(header_text));
        let body: Vec<Vec<CellValue>> = rows
            .map(|row| row.iter().map(cell_from_data).collect())
            .collect();

        push_sheet(&mut sheets, &mut report, RawSheet::new(name, headers, body));
    }
    Ok((sheets, report))
}

fn load_csv(path: &Path) -> Result<(Vec<RawSheet>, LoadReport), LoadError> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = header_names(rdr.headers()?.iter().map(|h| h.trim().to_string()));

    let mut body = Vec::new();
    let mut bad_records = 0usize;
    for result in rdr.records() {
        match result {
            Ok(record) => body.push(record.iter().map(cell_from_field).collect()),
            Err(_) => bad_records += 1,
        }
    }
    if bad_records > 0 {
        warn!(file = %path.display(), bad_records, "skipped malformed CSV records");
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("csv")
        .to_string();
    let mut report = LoadReport {
        total_sheets: 1,
        ..LoadReport::default()
    };
    let mut sheets = Vec::new();
    push_sheet(&mut sheets, &mut report, RawSheet::new(name, headers, body));
    Ok((sheets, report))
}

fn push_sheet(sheets: &mut Vec<RawSheet>, report: &mut LoadReport, sheet: RawSheet) {
    if sheet.is_empty() {
        warn!(sheet = %sheet.name, "skipping sheet without data rows");
        report.skipped_sheets += 1;
        return;
    }
    info!(sheet = %sheet.name, rows = sheet.len(), columns = sheet.width(), "read sheet");
    report.loaded_sheets += 1;
    sheets.push(sheet);
}

/// Blank headers are named after their position.
fn header_names(raw: impl Iterator<Item = String>) -> Vec<String> {
    raw.enumerate()
        .map(|(idx, h)| {
            if h.is_empty() {
                format!("Unnamed: {idx}")
            } else {
                h
            }
        })
        .collect()
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}

fn cell_from_data(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(dt) => CellValue::DateTime(dt),
            None => CellValue::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// CSV fields carry no type; plain integers and decimals become numbers,
/// everything else stays text.
fn cell_from_field(field: &str) -> CellValue {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return CellValue::Int(i);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => CellValue::Float(f),
        _ => CellValue::Text(field.to_string()),
    }
}
