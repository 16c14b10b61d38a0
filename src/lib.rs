//! Spreadsheet ingestion and business metrics.
//!
//! Architecture:
//! ```text
//!  .xlsx / .xls / .ods / .csv
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  file checks, one RawSheet per usable sheet
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ pipeline  │  sanitize → names → inference → coercion → cleanup
//!   └──────────┘
//!        │
//!        ▼
//!   ┌────────────────┐
//!   │ CanonicalTable  │  typed columns, at most one "data" date column
//!   └────────────────┘
//!        │
//!        ├──► metrics   totals, period comparison, buckets, breakdowns, outliers
//!        └──► enrich    period columns, running figures, pivots
//! ```

pub mod coerce;
pub mod config;
pub mod enrich;
pub mod error;
pub mod inference;
pub mod loader;
pub mod metrics;
pub mod outliers;
pub mod output;
pub mod pipeline;
pub mod sanitize;
pub mod table;
pub mod types;
pub mod util;

pub use config::{InferenceConfig, PipelineConfig};
pub use error::{FileAccessError, LoadError, PipelineError, TableError, ValidationError};
pub use loader::{load_workbook, LoadReport, Workbook};
pub use metrics::{Filter, Frequency, MetricsEngine};
pub use outliers::OutlierMethod;
pub use pipeline::NormalizationPipeline;
pub use table::{CanonicalColumn, CanonicalTable, ColumnData, ColumnRole};
pub use types::{CellValue, RawSheet};
