// Schema inference over a raw sheet whose headers are already normalized.
//
// Two independent scans:
// - date: keyword-matching columns, left to right, first one whose sample
//   converts at or above the threshold wins and the scan stops;
// - numeric: natively numeric columns always, plus keyword-matching text
//   columns whose sample converts at or above the numeric threshold.
use serde::Serialize;
use tracing::debug;

use crate::coerce::{coerce_date, coerce_number};
use crate::config::InferenceConfig;
use crate::table::ColumnRole;
use crate::types::{CellValue, RawSheet};

/// Verdict on one candidate column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnClassification {
    pub column: String,
    pub index: usize,
    /// `Text` when the candidate was rejected.
    pub role: ColumnRole,
    /// Share of the sample that converted; 1.0 for natively numeric columns.
    pub success_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaInference {
    pub date_column: Option<usize>,
    pub numeric_columns: Vec<usize>,
    /// Every candidate that was evaluated, accepted or not.
    pub classifications: Vec<ColumnClassification>,
}

pub struct SchemaInferencer<'a> {
    config: &'a InferenceConfig,
}

impl<'a> SchemaInferencer<'a> {
    pub fn new(config: &'a InferenceConfig) -> Self {
        Self { config }
    }

    pub fn infer(&self, sheet: &RawSheet) -> SchemaInference {
        let date_scan = self.scan_dates(sheet);
        let date_column = accepted(&date_scan, ColumnRole::Date).next();
        let numeric_scan = self.scan_numeric(sheet, date_column);
        let numeric_columns = accepted(&numeric_scan, ColumnRole::Numeric).collect();

        let mut classifications = date_scan;
        classifications.extend(numeric_scan);
        SchemaInference {
            date_column,
            numeric_columns,
            classifications,
        }
    }

    pub fn find_date_column(&self, sheet: &RawSheet) -> Option<usize> {
        accepted(&self.scan_dates(sheet), ColumnRole::Date).next()
    }

    /// Numeric columns in table order, never including `skip`.
    pub fn find_numeric_columns(&self, sheet: &RawSheet, skip: Option<usize>) -> Vec<usize> {
        accepted(&self.scan_numeric(sheet, skip), ColumnRole::Numeric).collect()
    }

    fn scan_dates(&self, sheet: &RawSheet) -> Vec<ColumnClassification> {
        let cfg = self.config;
        let mut out = Vec::new();
        for (idx, name) in sheet.headers.iter().enumerate() {
            if !matches_keyword(name, &cfg.date_keywords) {
                continue;
            }
            let Some(ratio) = sample_ratio(sheet, idx, cfg.date_sample_size, |v| {
                coerce_date(v, cfg.date_formats.as_slice()).is_some()
            }) else {
                continue;
            };
            let hit = ratio >= cfg.date_success_ratio;
            debug!(column = %name, ratio, accepted = hit, "date candidate");
            out.push(classification(name, idx, ColumnRole::Date, hit, ratio));
            if hit {
                break;
            }
        }
        out
    }

    fn scan_numeric(&self, sheet: &RawSheet, skip: Option<usize>) -> Vec<ColumnClassification> {
        let cfg = self.config;
        let mut out = Vec::new();
        for (idx, name) in sheet.headers.iter().enumerate() {
            if Some(idx) == skip {
                continue;
            }
            if is_native_numeric(sheet, idx) {
                out.push(classification(name, idx, ColumnRole::Numeric, true, 1.0));
                continue;
            }
            if !matches_keyword(name, &cfg.value_keywords) {
                continue;
            }
            let Some(ratio) = sample_ratio(sheet, idx, cfg.numeric_sample_size, |v| {
                coerce_number(v).is_some()
            }) else {
                continue;
            };
            let hit = ratio >= cfg.numeric_success_ratio;
            debug!(column = %name, ratio, accepted = hit, "numeric candidate");
            out.push(classification(name, idx, ColumnRole::Numeric, hit, ratio));
        }
        out
    }
}

fn classification(
    name: &str,
    index: usize,
    role: ColumnRole,
    hit: bool,
    success_ratio: f64,
) -> ColumnClassification {
    ColumnClassification {
        column: name.to_string(),
        index,
        role: if hit { role } else { ColumnRole::Text },
        success_ratio,
    }
}

fn accepted(
    scan: &[ColumnClassification],
    role: ColumnRole,
) -> impl Iterator<Item = usize> + '_ {
    scan.iter().filter(move |c| c.role == role).map(|c| c.index)
}

pub fn matches_keyword(name: &str, keywords: &[String]) -> bool {
    let lowered = name.to_lowercase();
    keywords.iter().any(|k| lowered.contains(k.as_str()))
}

/// Share of the first `size` non-empty values for which `converts` holds.
/// `None` when the column has no non-empty values at all.
fn sample_ratio<F>(sheet: &RawSheet, idx: usize, size: usize, converts: F) -> Option<f64>
where
    F: Fn(&CellValue) -> bool,
{
    let sample: Vec<&CellValue> = sheet
        .column_values(idx)
        .filter(|v| !v.is_empty())
        .take(size)
        .collect();
    if sample.is_empty() {
        return None;
    }
    let converted = sample.iter().filter(|v| converts(v)).count();
    Some(converted as f64 / sample.len() as f64)
}

/// Every non-empty cell is a native number, and there is at least one.
fn is_native_numeric(sheet: &RawSheet, idx: usize) -> bool {
    let mut seen = false;
    for v in sheet.column_values(idx) {
        if v.is_empty() {
            continue;
        }
        if !v.is_number() {
            return false;
        }
        seen = true;
    }
    seen
}
