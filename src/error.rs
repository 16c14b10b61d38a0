use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Rejections raised by the file precondition check, before any parsing.
#[derive(Debug, Error)]
pub enum FileAccessError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("path is not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("file too large: {size_mb:.2}MB (max {max_mb}MB)")]
    TooLarge { size_mb: f64, max_mb: u64 },

    #[error("could not inspect file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    FileAccess(#[from] FileAccessError),

    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),

    #[error("workbook error: {0}")]
    Workbook(String),

    #[error("no usable sheet found in {}", .0.display())]
    NoSheets(PathBuf),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Structural and argument checks run before and after normalization.
/// The subject is the thing checked, e.g. `sheet 'Vendas'` or `table`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} has no columns")]
    NoColumns(String),

    #[error("{0} is empty")]
    NoRows(String),

    #[error("start date {start} is after end date {end}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },

    #[error("column '{0}' not found")]
    UnknownColumn(String),

    #[error("column '{0}' has no valid numeric values")]
    NoNumericValues(String),
}

/// Failure of the normalization pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    EmptyInput(ValidationError),

    #[error("error after processing: {0}")]
    PostProcessingEmpty(ValidationError),

    #[error("error while processing data: {0}")]
    Processing(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("column '{name}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("table already has a date column '{existing}', cannot add '{added}'")]
    SecondDateColumn { existing: String, added: String },

    #[error("column '{0}' not found")]
    UnknownColumn(String),

    #[error("column '{0}' is not numeric")]
    NotNumeric(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("could not write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),
}
