// Derived columns layered on top of a canonical table.
//
// Every transform returns a new table; the input is never touched.
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime};
use tracing::debug;

use crate::error::TableError;
use crate::table::{CanonicalColumn, CanonicalTable, ColumnData, ColumnRole};
use crate::util::{normalize_name, unique_name};

/// Trailing window of the moving average, in rows.
const MOVING_AVERAGE_WINDOW: usize = 7;

/// Add calendar breakdowns of the date column: `ano`, `mes`, `trimestre`,
/// `semana` (ISO week), `mes_nome` and `dia_semana`.
pub fn enrich_with_periods(table: &CanonicalTable) -> Result<CanonicalTable, TableError> {
    let Some(dates) = table.date_column().and_then(|c| c.as_dates()) else {
        return Ok(table.clone());
    };

    let derived = [
        ("ano", date_part(dates, |d| f64::from(d.year()))),
        ("mes", date_part(dates, |d| f64::from(d.month()))),
        ("mes_nome", date_label(dates, "%B")),
        ("trimestre", date_part(dates, |d| f64::from((d.month() - 1) / 3 + 1))),
        ("semana", date_part(dates, |d| f64::from(d.iso_week().week()))),
        ("dia_semana", date_label(dates, "%A")),
    ];

    let mut out = table.clone();
    for (name, data) in derived {
        out = out.with_column(CanonicalColumn::new(name, data))?;
    }
    Ok(out)
}

fn date_part<F>(dates: &[Option<NaiveDateTime>], part: F) -> ColumnData
where
    F: Fn(&NaiveDateTime) -> f64,
{
    ColumnData::Numeric(dates.iter().map(|d| d.as_ref().map(&part)).collect())
}

fn date_label(dates: &[Option<NaiveDateTime>], pattern: &str) -> ColumnData {
    ColumnData::Text(
        dates
            .iter()
            .map(|d| d.map(|d| d.format(pattern).to_string()))
            .collect(),
    )
}

/// Sort by date (nulls last) and add running figures for `value_column`:
///
/// - `<v>_percentual`: share of the column total, only when the total is positive;
/// - `<v>_acumulado`: running sum, null where the value is null;
/// - `<v>_media_movel`: trailing mean over the last seven rows, only with a date column.
pub fn add_calculated_columns(
    table: &CanonicalTable,
    value_column: &str,
) -> Result<CanonicalTable, TableError> {
    let Some(column) = table.column(value_column) else {
        return Ok(table.clone());
    };
    if column.role() != ColumnRole::Numeric {
        return Err(TableError::NotNumeric(value_column.to_string()));
    }

    let mut out = table.sorted_by_date();
    let values: Vec<Option<f64>> = out
        .column(value_column)
        .and_then(|c| c.as_numeric())
        .map(<[Option<f64>]>::to_vec)
        .unwrap_or_default();

    let total: f64 = values.iter().flatten().sum();
    if total > 0.0 {
        let share = values.iter().map(|v| v.map(|v| v / total * 100.0)).collect();
        out = out.with_column(CanonicalColumn::new(
            format!("{value_column}_percentual"),
            ColumnData::Numeric(share),
        ))?;
    }

    let mut running = 0.0;
    let cumulative = values
        .iter()
        .map(|v| {
            v.map(|v| {
                running += v;
                running
            })
        })
        .collect();
    out = out.with_column(CanonicalColumn::new(
        format!("{value_column}_acumulado"),
        ColumnData::Numeric(cumulative),
    ))?;

    if out.date_column().is_some() {
        out = out.with_column(CanonicalColumn::new(
            format!("{value_column}_media_movel"),
            ColumnData::Numeric(moving_average(&values, MOVING_AVERAGE_WINDOW)),
        ))?;
    }
    Ok(out)
}

/// Mean of the non-null values in each trailing window; null when the
/// window holds no value.
fn moving_average(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let from = (i + 1).saturating_sub(window);
            let present: Vec<f64> = values[from..=i].iter().flatten().copied().collect();
            (!present.is_empty()).then(|| present.iter().sum::<f64>() / present.len() as f64)
        })
        .collect()
}

/// Add `<c>_normalizado`, scaled to `[0, 1]`, for each named numeric column
/// whose maximum exceeds its minimum. Other names are skipped.
pub fn normalize_min_max(
    table: &CanonicalTable,
    columns: &[&str],
) -> Result<CanonicalTable, TableError> {
    let mut out = table.clone();
    for &name in columns {
        let Some(values) = table.column(name).and_then(|c| c.as_numeric()) else {
            debug!(column = name, "skipping normalization of non-numeric column");
            continue;
        };
        let present = values.iter().flatten().copied();
        let (min, max) = present.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if !(max > min) {
            continue;
        }
        let scaled = values.iter().map(|v| v.map(|v| (v - min) / (max - min))).collect();
        out = out.with_column(CanonicalColumn::new(
            format!("{name}_normalizado"),
            ColumnData::Numeric(scaled),
        ))?;
    }
    Ok(out)
}

/// Reduction applied to each pivot cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Mean,
    Count,
}

impl Aggregation {
    fn apply(&self, values: &[f64]) -> Option<f64> {
        match self {
            Aggregation::Sum => Some(values.iter().sum()),
            Aggregation::Count => Some(values.len() as f64),
            Aggregation::Mean if values.is_empty() => None,
            Aggregation::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
        }
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Aggregation::Sum),
            "mean" | "avg" => Ok(Aggregation::Mean),
            "count" => Ok(Aggregation::Count),
            other => Err(format!("unknown aggregation '{other}' (expected sum, mean or count)")),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Count => "count",
        };
        f.write_str(s)
    }
}

/// Pivot `values` by `index` and, optionally, spread across the distinct
/// values of `columns`.
///
/// One row per distinct index value, ascending. Without `columns` the single
/// result column keeps the name of `values`. With `columns` each distinct
/// value becomes a normalized column name and missing cells are 0.
pub fn pivot(
    table: &CanonicalTable,
    index: &str,
    columns: Option<&str>,
    values: &str,
    aggregation: Aggregation,
) -> Result<CanonicalTable, TableError> {
    let index_col = table
        .column(index)
        .ok_or_else(|| TableError::UnknownColumn(index.to_string()))?;
    let value_col = table
        .column(values)
        .ok_or_else(|| TableError::UnknownColumn(values.to_string()))?;
    let measures = value_col
        .as_numeric()
        .ok_or_else(|| TableError::NotNumeric(values.to_string()))?;
    let spread = match columns {
        Some(name) => Some(
            table
                .column(name)
                .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?,
        ),
        None => None,
    };

    // (index key, spread key) -> non-null measures
    let mut groups: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
    let mut index_keys: BTreeSet<String> = BTreeSet::new();
    let mut spread_keys: BTreeSet<String> = BTreeSet::new();
    for (i, measure) in measures.iter().enumerate() {
        let Some(key) = index_col.data.display_value(i) else { continue };
        let sub = match spread {
            Some(col) => match col.data.display_value(i) {
                Some(s) => s,
                None => continue,
            },
            None => String::new(),
        };
        index_keys.insert(key.clone());
        spread_keys.insert(sub.clone());
        let cell = groups.entry((key, sub)).or_default();
        if let Some(v) = measure {
            cell.push(*v);
        }
    }

    let index_name = normalize_name(index);
    let mut out = vec![CanonicalColumn::new(
        index_name.clone(),
        ColumnData::Text(index_keys.iter().cloned().map(Some).collect()),
    )];

    if spread.is_none() {
        let cells = index_keys
            .iter()
            .map(|k| {
                groups
                    .get(&(k.clone(), String::new()))
                    .and_then(|v| aggregation.apply(v))
            })
            .collect();
        out.push(CanonicalColumn::new(values, ColumnData::Numeric(cells)));
    } else {
        let mut taken: HashSet<String> = HashSet::from([index_name]);
        for sub in &spread_keys {
            let name = unique_name(&normalize_name(sub), &taken);
            taken.insert(name.clone());
            let cells = index_keys
                .iter()
                .map(|k| {
                    groups
                        .get(&(k.clone(), sub.clone()))
                        .and_then(|v| aggregation.apply(v))
                        .or(Some(0.0))
                })
                .collect();
            out.push(CanonicalColumn::new(name, ColumnData::Numeric(cells)));
        }
    }

    CanonicalTable::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    fn sales() -> CanonicalTable {
        CanonicalTable::new(vec![
            CanonicalColumn::new(
                "data",
                ColumnData::Date(vec![at(2024, 3, 4), at(2024, 1, 1), None, at(2024, 2, 10)]),
            ),
            CanonicalColumn::new(
                "loja",
                ColumnData::Text(
                    ["Centro", "Norte", "Centro", "Norte"]
                        .iter()
                        .map(|s| Some(s.to_string()))
                        .collect(),
                ),
            ),
            CanonicalColumn::new(
                "canal",
                ColumnData::Text(
                    ["web", "loja", "web", "web"]
                        .iter()
                        .map(|s| Some(s.to_string()))
                        .collect(),
                ),
            ),
            CanonicalColumn::new(
                "valor",
                ColumnData::Numeric(vec![Some(30.0), Some(10.0), Some(40.0), Some(20.0)]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn period_columns_follow_the_date() {
        let t = enrich_with_periods(&sales()).unwrap();
        let col = |n: &str| t.column(n).unwrap();
        assert_eq!(col("ano").as_numeric().unwrap()[0], Some(2024.0));
        assert_eq!(col("mes").as_numeric().unwrap()[0], Some(3.0));
        assert_eq!(col("trimestre").as_numeric().unwrap()[0], Some(1.0));
        assert_eq!(col("semana").as_numeric().unwrap()[0], Some(10.0));
        assert_eq!(col("mes_nome").as_text().unwrap()[0].as_deref(), Some("March"));
        assert_eq!(col("dia_semana").as_text().unwrap()[0].as_deref(), Some("Monday"));
        assert_eq!(col("ano").as_numeric().unwrap()[2], None);
        assert_eq!(sales().width(), 4);
    }

    #[test]
    fn period_enrichment_needs_a_date_column() {
        let t = sales().without_column("data");
        assert_eq!(enrich_with_periods(&t).unwrap(), t);
    }

    #[test]
    fn calculated_columns_are_ordered_by_date() {
        let t = add_calculated_columns(&sales(), "valor").unwrap();
        let values = t.column("valor").unwrap().numeric_values();
        assert_eq!(values, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(
            t.column("valor_acumulado").unwrap().numeric_values(),
            vec![10.0, 30.0, 60.0, 100.0]
        );
        assert_eq!(
            t.column("valor_percentual").unwrap().numeric_values(),
            vec![10.0, 20.0, 30.0, 40.0]
        );
        assert_eq!(
            t.column("valor_media_movel").unwrap().numeric_values(),
            vec![10.0, 15.0, 20.0, 25.0]
        );
    }

    #[test]
    fn calculated_columns_reject_text() {
        assert_eq!(
            add_calculated_columns(&sales(), "loja"),
            Err(TableError::NotNumeric("loja".into()))
        );
        assert_eq!(add_calculated_columns(&sales(), "nada").unwrap(), sales());
    }

    #[test]
    fn moving_average_window_slides() {
        let values: Vec<Option<f64>> = (1..=9).map(|v| Some(v as f64)).collect();
        let avg = moving_average(&values, 7);
        assert_eq!(avg[6], Some(4.0));
        assert_eq!(avg[8], Some(6.0));
        assert_eq!(moving_average(&[None, Some(2.0)], 7), vec![None, Some(2.0)]);
    }

    #[test]
    fn min_max_scaling() {
        let t = normalize_min_max(&sales(), &["valor", "loja"]).unwrap();
        assert_eq!(
            t.column("valor_normalizado").unwrap().numeric_values(),
            vec![20.0 / 30.0, 0.0, 1.0, 10.0 / 30.0]
        );
        assert!(t.column("loja_normalizado").is_none());

        let flat = CanonicalTable::new(vec![CanonicalColumn::new(
            "v",
            ColumnData::Numeric(vec![Some(3.0), Some(3.0)]),
        )])
        .unwrap();
        assert_eq!(normalize_min_max(&flat, &["v"]).unwrap().width(), 1);
    }

    #[test]
    fn pivot_by_index_only() {
        let t = pivot(&sales(), "loja", None, "valor", Aggregation::Sum).unwrap();
        assert_eq!(t.column_names(), vec!["loja", "valor"]);
        assert_eq!(t.column("valor").unwrap().numeric_values(), vec![70.0, 30.0]);

        let t = pivot(&sales(), "loja", None, "valor", Aggregation::Mean).unwrap();
        assert_eq!(t.column("valor").unwrap().numeric_values(), vec![35.0, 15.0]);
    }

    #[test]
    fn wide_pivot_fills_missing_cells() {
        let t = pivot(&sales(), "loja", Some("canal"), "valor", Aggregation::Count).unwrap();
        assert_eq!(t.column_names(), vec!["loja", "loja_2", "web"]);
        // Centro never sold through "loja"
        assert_eq!(t.column("loja_2").unwrap().numeric_values(), vec![0.0, 1.0]);
        assert_eq!(t.column("web").unwrap().numeric_values(), vec![2.0, 1.0]);
    }

    #[test]
    fn pivot_rejects_bad_columns() {
        assert_eq!(
            pivot(&sales(), "x", None, "valor", Aggregation::Sum),
            Err(TableError::UnknownColumn("x".into()))
        );
        assert_eq!(
            pivot(&sales(), "loja", None, "canal", Aggregation::Sum),
            Err(TableError::NotNumeric("canal".into()))
        );
    }

    #[test]
    fn aggregation_names() {
        assert_eq!("MEAN".parse::<Aggregation>().unwrap(), Aggregation::Mean);
        assert!("median".parse::<Aggregation>().is_err());
    }
}
