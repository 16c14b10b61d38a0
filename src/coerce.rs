// Best-effort conversion of raw cells into typed values.
//
// Nothing in here fails: a cell that cannot be converted becomes `None`,
// and that loss is accepted as data loss rather than reported as an error.
use chrono::{NaiveDate, NaiveDateTime};

use crate::types::CellValue;

/// Convert a cell to a timestamp.
///
/// Date/time cells pass through unchanged. Text is trimmed and tried
/// against each `chrono` pattern in order; the first one that parses wins.
/// Patterns without a time component yield midnight.
pub fn coerce_date<S: AsRef<str>>(value: &CellValue, formats: &[S]) -> Option<NaiveDateTime> {
    match value {
        CellValue::DateTime(dt) => Some(*dt),
        CellValue::Text(s) => parse_date_str(s, formats),
        _ => None,
    }
}

pub fn parse_date_str<S: AsRef<str>>(s: &str, formats: &[S]) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    formats.iter().find_map(|fmt| {
        let fmt = fmt.as_ref();
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    })
}

/// Convert a cell to a number.
///
/// Native numbers pass through as `f64`. Text goes through
/// [`parse_number_str`]. Booleans, dates and empty cells yield `None`.
pub fn coerce_number(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Int(i) => Some(*i as f64),
        CellValue::Float(f) if !f.is_nan() => Some(*f),
        CellValue::Text(s) => parse_number_str(s),
        _ => None,
    }
}

/// Parse numeric text written with a decimal comma.
///
/// Every `,` becomes `.`, then everything except digits, `.` and `-` is
/// dropped and the remainder parsed. Thousands separators are not told
/// apart from decimal separators, so `"1.234,56"` turns into `1.234.56`
/// and is rejected.
pub fn parse_number_str(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .replace(',', ".")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
