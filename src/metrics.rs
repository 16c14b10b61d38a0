use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate};
use tracing::warn;

use crate::config::InferenceConfig;
use crate::inference::matches_keyword;
use crate::outliers::OutlierMethod;
use crate::table::{CanonicalColumn, CanonicalTable, ColumnRole};
use crate::types::{CategoryBreakdownRow, OutlierRow, PeriodComparison, SummaryKpis, TemporalBucket};
use crate::util::{average, median, percentage_change};

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

/// Calendar bucket size for temporal aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Day,
    /// ISO weeks, starting on Monday.
    Week,
    Month,
    Year,
}

impl Frequency {
    /// First day of the bucket containing `date`. `None` when that day
    /// falls before the earliest representable date.
    pub fn bucket_start(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::Day => Some(date),
            Frequency::Week => date.checked_sub_days(Days::new(u64::from(
                date.weekday().num_days_from_monday(),
            ))),
            Frequency::Month => date.with_day(1),
            Frequency::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        }
    }

    /// Start of the bucket after the one starting at `start`.
    fn next(&self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::Day => start.succ_opt(),
            Frequency::Week => start.checked_add_days(Days::new(7)),
            Frequency::Month => {
                if start.month() == 12 {
                    NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
                }
            }
            Frequency::Year => NaiveDate::from_ymd_opt(start.year() + 1, 1, 1),
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "d" | "day" | "daily" => Ok(Frequency::Day),
            "w" | "week" | "weekly" => Ok(Frequency::Week),
            "m" | "month" | "monthly" => Ok(Frequency::Month),
            "y" | "year" | "yearly" => Ok(Frequency::Year),
            other => Err(format!("unknown frequency '{other}' (expected day, week, month or year)")),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Frequency::Day => "day",
            Frequency::Week => "week",
            Frequency::Month => "month",
            Frequency::Year => "year",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Row predicates combined with AND. Unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub category_column: Option<String>,
    pub category_values: Vec<String>,
    /// Inclusive bounds on the active value column.
    pub value_range: Option<(f64, f64)>,
}

// ---------------------------------------------------------------------------
// MetricsEngine
// ---------------------------------------------------------------------------

/// Statistics over one canonical table snapshot.
///
/// The active value column is the first numeric column unless overridden;
/// the active date column is the table's date column. Filtering builds a
/// new engine over a new table and leaves `self` untouched.
#[derive(Debug, Clone)]
pub struct MetricsEngine {
    table: CanonicalTable,
    value_column: Option<String>,
    date_column: Option<String>,
    max_buckets: usize,
}

/// Upper bound on gap-filled buckets from [`MetricsEngine::temporal_aggregation`];
/// matches the `PipelineConfig` default.
pub const DEFAULT_MAX_BUCKETS: usize = 10_000;

impl MetricsEngine {
    pub fn new(table: CanonicalTable) -> Self {
        let value_column = table.numeric_columns().next().map(|c| c.name.clone());
        let date_column = table.date_column().map(|c| c.name.clone());
        Self {
            table,
            value_column,
            date_column,
            max_buckets: DEFAULT_MAX_BUCKETS,
        }
    }

    /// Cap on the number of buckets produced when filling calendar gaps.
    pub fn with_max_buckets(mut self, max_buckets: usize) -> Self {
        self.max_buckets = max_buckets;
        self
    }

    /// Use `column` as the active value column. Ignored (with a warning)
    /// unless it names a numeric column.
    pub fn with_value_column(mut self, column: &str) -> Self {
        match self.table.column(column) {
            Some(c) if c.role() == ColumnRole::Numeric => self.value_column = Some(c.name.clone()),
            _ => warn!(column, "not a numeric column, keeping current value column"),
        }
        self
    }

    pub fn table(&self) -> &CanonicalTable {
        &self.table
    }

    pub fn value_column(&self) -> Option<&str> {
        self.value_column.as_deref()
    }

    pub fn date_column(&self) -> Option<&str> {
        self.date_column.as_deref()
    }

    fn numeric(&self, column: Option<&str>) -> Option<&CanonicalColumn> {
        let name = column.or(self.value_column.as_deref())?;
        self.table
            .column(name)
            .filter(|c| c.role() == ColumnRole::Numeric)
    }

    fn values(&self, column: Option<&str>) -> Vec<f64> {
        self.numeric(column)
            .map(CanonicalColumn::numeric_values)
            .unwrap_or_default()
    }

    pub fn total(&self, column: Option<&str>) -> f64 {
        self.values(column).iter().sum()
    }

    pub fn average(&self, column: Option<&str>) -> f64 {
        average(&self.values(column))
    }

    pub fn median(&self, column: Option<&str>) -> f64 {
        median(self.values(column))
    }

    pub fn min(&self, column: Option<&str>) -> f64 {
        self.values(column).into_iter().reduce(f64::min).unwrap_or(0.0)
    }

    pub fn max(&self, column: Option<&str>) -> f64 {
        self.values(column).into_iter().reduce(f64::max).unwrap_or(0.0)
    }

    pub fn count(&self) -> usize {
        self.table.len()
    }

    pub fn summary_kpis(&self) -> SummaryKpis {
        SummaryKpis {
            total: self.total(None),
            average: self.average(None),
            median: self.median(None),
            min: self.min(None),
            max: self.max(None),
            count: self.count(),
        }
    }

    /// Sum of the active value column over rows dated inside `[start, end]`.
    fn window_total(&self, start: NaiveDate, end: NaiveDate) -> f64 {
        let Some(values) = self.numeric(None).and_then(|c| c.as_numeric()) else {
            return 0.0;
        };
        if self.date_column.is_none() {
            return 0.0;
        }
        self.table
            .rows_in_date_range(Some(start), Some(end))
            .into_iter()
            .filter_map(|i| values[i])
            .sum()
    }

    /// Compare the current window with `previous`, or with the window of
    /// the same length ending the day before `current_start`.
    ///
    /// Bounds given in reverse order are swapped.
    pub fn period_comparison(
        &self,
        current_start: NaiveDate,
        current_end: NaiveDate,
        previous: Option<(NaiveDate, NaiveDate)>,
    ) -> PeriodComparison {
        let (current_start, current_end) = ordered(current_start, current_end);
        let (previous_start, previous_end) = match previous {
            Some((s, e)) => ordered(s, e),
            None => preceding_window(current_start, current_end),
        };

        let current_total = self.window_total(current_start, current_end);
        let previous_total = self.window_total(previous_start, previous_end);

        PeriodComparison {
            current_start,
            current_end,
            previous_start,
            previous_end,
            current_total,
            previous_total,
            change: current_total - previous_total,
            change_percent: percentage_change(current_total, previous_total),
        }
    }

    /// Sum, mean and count of the active value column per calendar bucket,
    /// ascending. Buckets between the first and last populated one are
    /// included even when empty, unless that would exceed the bucket cap;
    /// then only populated buckets are returned.
    pub fn temporal_aggregation(
        &self,
        frequency: Frequency,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Vec<TemporalBucket> {
        let Some(values) = self.numeric(None).and_then(|c| c.as_numeric()) else {
            return Vec::new();
        };
        let Some(dates) = self.table.date_column().and_then(|c| c.as_dates()) else {
            return Vec::new();
        };

        let mut buckets: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
        let mut unbucketed = 0usize;
        for i in self.table.rows_in_date_range(start, end) {
            let Some(dt) = dates[i] else { continue };
            let Some(bucket) = frequency.bucket_start(dt.date()) else {
                unbucketed += 1;
                continue;
            };
            let entry = buckets.entry(bucket).or_insert((0.0, 0));
            if let Some(v) = values[i] {
                entry.0 += v;
                entry.1 += 1;
            }
        }

        if unbucketed > 0 {
            warn!(rows = unbucketed, %frequency, "rows dated too early to bucket were skipped");
        }

        let (Some(&first), Some(&last)) = (buckets.keys().next(), buckets.keys().next_back()) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut cursor = Some(first);
        while let Some(bucket) = cursor.filter(|b| *b <= last) {
            if out.len() == self.max_buckets {
                warn!(
                    max_buckets = self.max_buckets,
                    %frequency,
                    "date span too wide to fill gaps, returning populated buckets only"
                );
                return buckets
                    .into_iter()
                    .map(|(bucket, (sum, count))| temporal_bucket(bucket, sum, count))
                    .collect();
            }
            let (sum, count) = buckets.get(&bucket).copied().unwrap_or((0.0, 0));
            out.push(temporal_bucket(bucket, sum, count));
            cursor = frequency.next(bucket);
        }
        out
    }

    /// Sum, mean and count of the active value column per category, sorted
    /// by sum descending and cut to `top_n`.
    ///
    /// Without an explicit column the first text column that is neither the
    /// date nor the value column is used.
    pub fn category_breakdown(
        &self,
        category_column: Option<&str>,
        top_n: usize,
    ) -> Vec<CategoryBreakdownRow> {
        let Some(values) = self.numeric(None).and_then(|c| c.as_numeric()) else {
            return Vec::new();
        };
        let column = match category_column {
            Some(name) => self.table.column(name),
            None => self.default_category_column(),
        };
        let Some(column) = column else {
            return Vec::new();
        };

        // BTreeMap keeps ties in ascending category order after the stable sort.
        let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for (i, value) in values.iter().enumerate() {
            let Some(key) = column.data.display_value(i) else { continue };
            let entry = groups.entry(key).or_insert((0.0, 0));
            if let Some(v) = value {
                entry.0 += v;
                entry.1 += 1;
            }
        }

        let mut rows: Vec<CategoryBreakdownRow> = groups
            .into_iter()
            .map(|(category, (sum, count))| CategoryBreakdownRow {
                category,
                sum,
                mean: (count > 0).then(|| sum / count as f64),
                count,
            })
            .collect();
        rows.sort_by(|a, b| b.sum.total_cmp(&a.sum));
        rows.truncate(top_n);
        rows
    }

    fn default_category_column(&self) -> Option<&CanonicalColumn> {
        self.table.columns().iter().find(|c| {
            c.role() == ColumnRole::Text
                && Some(c.name.as_str()) != self.date_column.as_deref()
                && Some(c.name.as_str()) != self.value_column.as_deref()
        })
    }

    /// Columns that look like categorical dimensions: a category keyword in
    /// the name, or text with few distinct values relative to its size.
    pub fn category_columns(&self, config: &InferenceConfig) -> Vec<String> {
        self.table
            .columns()
            .iter()
            .filter(|c| Some(c.name.as_str()) != self.date_column.as_deref())
            .filter(|c| {
                if matches_keyword(&c.name, &config.category_keywords) {
                    return true;
                }
                let Some(texts) = c.as_text() else {
                    return false;
                };
                let present: Vec<&String> = texts.iter().flatten().collect();
                let unique: HashSet<&String> = present.iter().copied().collect();
                !present.is_empty()
                    && (unique.len() as f64 / present.len() as f64) < config.category_unique_ratio
                    && unique.len() <= config.category_max_unique
            })
            .map(|c| c.name.clone())
            .collect()
    }

    /// Per-row outlier flags for `column` (or the active value column).
    /// `None` when the column is missing or the method yields no flags.
    pub fn outlier_flags(&self, column: Option<&str>, method: OutlierMethod) -> Option<Vec<bool>> {
        let values = self.numeric(column)?.as_numeric()?;
        method.detect(values)
    }

    /// The flagged rows with their values.
    pub fn outliers(&self, column: Option<&str>, method: OutlierMethod) -> Vec<OutlierRow> {
        let (Some(flags), Some(values)) = (
            self.outlier_flags(column, method),
            self.numeric(column).and_then(|c| c.as_numeric()),
        ) else {
            return Vec::new();
        };
        flags
            .iter()
            .zip(values)
            .enumerate()
            .filter_map(|(row, (flag, value))| match (flag, value) {
                (true, Some(value)) => Some(OutlierRow { row, value: *value }),
                _ => None,
            })
            .collect()
    }

    /// New engine over the rows matching every predicate in `filter`.
    ///
    /// Date bounds apply only when the table has a date column; the category
    /// predicate only when the column exists and values were given.
    pub fn with_filter(&self, filter: &Filter) -> MetricsEngine {
        let mut rows = self.table.rows_in_date_range(filter.start_date, filter.end_date);

        if let Some(column) = filter
            .category_column
            .as_deref()
            .and_then(|name| self.table.column(name))
        {
            if !filter.category_values.is_empty() {
                let wanted: HashSet<&str> =
                    filter.category_values.iter().map(String::as_str).collect();
                rows.retain(|&i| {
                    column
                        .data
                        .display_value(i)
                        .is_some_and(|v| wanted.contains(v.as_str()))
                });
            }
        }

        if let (Some((lo, hi)), Some(values)) = (
            filter.value_range,
            self.numeric(None).and_then(|c| c.as_numeric()),
        ) {
            rows.retain(|&i| values[i].is_some_and(|v| v >= lo && v <= hi));
        }

        MetricsEngine {
            table: self.table.take_rows(&rows),
            value_column: self.value_column.clone(),
            date_column: self.date_column.clone(),
            max_buckets: self.max_buckets,
        }
    }
}

fn temporal_bucket(bucket: NaiveDate, sum: f64, count: usize) -> TemporalBucket {
    TemporalBucket {
        bucket,
        sum,
        mean: (count > 0).then(|| sum / count as f64),
        count,
    }
}

fn ordered(a: NaiveDate, b: NaiveDate) -> (NaiveDate, NaiveDate) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// The window of equal length that ends the day before `start`, clamped to
/// the earliest representable date. Reversed bounds are swapped first.
pub fn preceding_window(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let (start, end) = ordered(start, end);
    let period_days = (end - start).num_days() + 1;
    let previous_end = start.pred_opt().unwrap_or(NaiveDate::MIN);
    let previous_start = previous_end
        .checked_sub_signed(chrono::Duration::days(period_days - 1))
        .unwrap_or(NaiveDate::MIN);
    (previous_start, previous_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnData;
    use chrono::NaiveDateTime;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        day(y, m, d).and_hms_opt(12, 0, 0)
    }

    fn engine(
        dates: Vec<Option<NaiveDateTime>>,
        values: Vec<Option<f64>>,
        cats: Vec<Option<&str>>,
    ) -> MetricsEngine {
        let table = CanonicalTable::new(vec![
            CanonicalColumn::new("data", ColumnData::Date(dates)),
            CanonicalColumn::new(
                "loja",
                ColumnData::Text(cats.into_iter().map(|c| c.map(String::from)).collect()),
            ),
            CanonicalColumn::new("valor", ColumnData::Numeric(values)),
        ])
        .unwrap();
        MetricsEngine::new(table)
    }

    #[test]
    fn scalar_statistics() {
        let e = engine(
            vec![None; 4],
            vec![Some(4.0), Some(1.0), None, Some(10.0)],
            vec![None; 4],
        );
        assert_eq!(e.value_column(), Some("valor"));
        assert_eq!(e.total(None), 15.0);
        assert_eq!(e.average(None), 5.0);
        assert_eq!(e.median(None), 4.0);
        assert_eq!(e.min(None), 1.0);
        assert_eq!(e.max(None), 10.0);
        assert_eq!(e.count(), 4);
    }

    #[test]
    fn statistics_default_to_zero() {
        let e = engine(vec![None], vec![None], vec![Some("a")]);
        assert_eq!(e.total(None), 0.0);
        assert_eq!(e.average(None), 0.0);
        assert_eq!(e.max(Some("nao_existe")), 0.0);
        assert_eq!(e.total(Some("loja")), 0.0);

        let text_only = MetricsEngine::new(
            CanonicalTable::new(vec![CanonicalColumn::new(
                "loja",
                ColumnData::Text(vec![Some("a".into())]),
            )])
            .unwrap(),
        );
        assert_eq!(text_only.value_column(), None);
        assert_eq!(text_only.median(None), 0.0);
        assert!(text_only.category_breakdown(None, 5).is_empty());
    }

    #[test]
    fn period_comparison_derives_previous_window() {
        let e = engine(
            vec![at(2024, 1, 1), at(2024, 1, 31), at(2023, 12, 1), at(2023, 12, 31), at(2023, 11, 30)],
            vec![Some(600.0), Some(400.0), Some(300.0), Some(500.0), Some(9999.0)],
            vec![None; 5],
        );
        let cmp = e.period_comparison(day(2024, 1, 1), day(2024, 1, 31), None);
        assert_eq!(cmp.previous_start, day(2023, 12, 1));
        assert_eq!(cmp.previous_end, day(2023, 12, 31));
        assert_eq!(cmp.current_total, 1000.0);
        assert_eq!(cmp.previous_total, 800.0);
        assert_eq!(cmp.change, 200.0);
        assert_eq!(cmp.change_percent, Some(25.0));
    }

    #[test]
    fn period_comparison_without_baseline() {
        let e = engine(vec![at(2024, 3, 2)], vec![Some(50.0)], vec![None]);
        let cmp = e.period_comparison(
            day(2024, 3, 1),
            day(2024, 3, 31),
            Some((day(2020, 1, 1), day(2020, 1, 31))),
        );
        assert_eq!(cmp.previous_total, 0.0);
        assert_eq!(cmp.change, 50.0);
        assert_eq!(cmp.change_percent, None);
    }

    #[test]
    fn monthly_buckets_fill_gaps() {
        let e = engine(
            vec![at(2024, 1, 5), at(2024, 1, 20), at(2024, 3, 1), None],
            vec![Some(10.0), Some(30.0), Some(5.0), Some(1000.0)],
            vec![None; 4],
        );
        let buckets = e.temporal_aggregation(Frequency::Month, None, None);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].bucket, day(2024, 1, 1));
        assert_eq!(buckets[0].sum, 40.0);
        assert_eq!(buckets[0].mean, Some(20.0));
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[1].bucket, day(2024, 2, 1));
        assert_eq!(buckets[1].count, 0);
        assert_eq!(buckets[1].mean, None);
        assert_eq!(buckets[2].sum, 5.0);
    }

    #[test]
    fn weekly_buckets_start_on_monday_and_respect_range() {
        let e = engine(
            vec![at(2024, 1, 3), at(2024, 1, 7), at(2024, 1, 8), at(2024, 2, 1)],
            vec![Some(1.0), Some(2.0), Some(4.0), Some(8.0)],
            vec![None; 4],
        );
        let buckets = e.temporal_aggregation(Frequency::Week, None, Some(day(2024, 1, 31)));
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket, day(2024, 1, 1));
        assert_eq!(buckets[0].sum, 3.0);
        assert_eq!(buckets[1].bucket, day(2024, 1, 8));

        assert!(e
            .temporal_aggregation(Frequency::Day, Some(day(2030, 1, 1)), None)
            .is_empty());
    }

    #[test]
    fn breakdown_sorts_by_sum_and_truncates() {
        let e = engine(
            vec![None; 5],
            vec![Some(50.0), Some(100.0), Some(20.0), Some(10.0), None],
            vec![Some("A"), Some("B"), Some("B"), Some("C"), Some("C")],
        );
        let rows = e.category_breakdown(None, 2);
        let names: Vec<&str> = rows.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(rows[0].sum, 120.0);
        assert_eq!(rows[0].mean, Some(60.0));
        assert_eq!(rows[0].count, 2);
        assert!(e.category_breakdown(Some("nao_existe"), 2).is_empty());
    }

    #[test]
    fn outlier_flags_use_value_column_by_default() {
        let e = engine(
            vec![None; 5],
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(100.0)],
            vec![None; 5],
        );
        let flags = e.outlier_flags(None, OutlierMethod::iqr()).unwrap();
        assert_eq!(flags, vec![false, false, false, false, true]);
        assert_eq!(e.outliers(None, OutlierMethod::iqr())[0].row, 4);
        assert_eq!(e.outlier_flags(Some("loja"), OutlierMethod::iqr()), None);

        let flat = engine(vec![None; 3], vec![Some(7.0); 3], vec![None; 3]);
        assert_eq!(flat.outlier_flags(None, OutlierMethod::zscore()), None);
    }

    #[test]
    fn filters_compose_and_leave_receiver_untouched() {
        let e = engine(
            vec![at(2024, 1, 1), at(2024, 1, 15), at(2024, 2, 1), None],
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)],
            vec![Some("A"), Some("B"), Some("A"), Some("A")],
        );
        let january = e.with_filter(&Filter {
            start_date: Some(day(2024, 1, 1)),
            end_date: Some(day(2024, 1, 31)),
            ..Filter::default()
        });
        assert_eq!(january.count(), 2);

        let january_a = january.with_filter(&Filter {
            category_column: Some("loja".into()),
            category_values: vec!["A".into()],
            ..Filter::default()
        });
        assert_eq!(january_a.count(), 1);
        assert_eq!(january_a.total(None), 1.0);

        let ranged = e.with_filter(&Filter {
            value_range: Some((2.0, 3.0)),
            ..Filter::default()
        });
        assert_eq!(ranged.total(None), 5.0);

        assert_eq!(e.count(), 4);
        assert_eq!(e.total(None), 10.0);
    }

    #[test]
    fn value_column_override() {
        let table = CanonicalTable::new(vec![
            CanonicalColumn::new("km", ColumnData::Numeric(vec![Some(1.0)])),
            CanonicalColumn::new("custo", ColumnData::Numeric(vec![Some(9.0)])),
            CanonicalColumn::new("loja", ColumnData::Text(vec![Some("a".into())])),
        ])
        .unwrap();
        let e = MetricsEngine::new(table);
        assert_eq!(e.total(None), 1.0);
        let e = e.with_value_column("custo");
        assert_eq!(e.total(None), 9.0);
        let e = e.with_value_column("loja");
        assert_eq!(e.value_column(), Some("custo"));
    }

    #[test]
    fn category_column_heuristics() {
        let n = 20;
        let table = CanonicalTable::new(vec![
            CanonicalColumn::new(
                "regiao",
                ColumnData::Text((0..n).map(|i| Some(format!("r{}", i % 3))).collect()),
            ),
            CanonicalColumn::new(
                "cliente",
                ColumnData::Text((0..n).map(|i| Some(format!("c{i}"))).collect()),
            ),
            CanonicalColumn::new(
                "tipo_pagamento",
                ColumnData::Text((0..n).map(|i| Some(format!("t{i}"))).collect()),
            ),
            CanonicalColumn::new("valor", ColumnData::Numeric(vec![Some(1.0); n])),
        ])
        .unwrap();
        let cols = MetricsEngine::new(table).category_columns(&InferenceConfig::default());
        assert_eq!(cols, vec!["regiao".to_string(), "tipo_pagamento".to_string()]);
    }

    #[test]
    fn preceding_window_has_equal_length() {
        let (s, e) = preceding_window(day(2024, 3, 1), day(2024, 3, 10));
        assert_eq!(s, day(2024, 2, 20));
        assert_eq!(e, day(2024, 2, 29));
    }

    #[test]
    fn buckets_near_the_earliest_date_do_not_overflow() {
        let earliest = day(-262143, 1, 1);
        let e = engine(
            vec![earliest.and_hms_opt(12, 0, 0), at(2024, 1, 1)],
            vec![Some(10.0), Some(10.0)],
            vec![None; 2],
        );
        let buckets = e.temporal_aggregation(Frequency::Week, None, Some(day(-262143, 1, 31)));
        assert!(buckets.len() <= 1);
        assert!(buckets.iter().all(|b| b.bucket <= earliest));

        let floor = engine(
            vec![NaiveDate::MIN.and_hms_opt(0, 0, 0), at(2024, 1, 1)],
            vec![Some(1.0), Some(2.0)],
            vec![None; 2],
        )
        .with_max_buckets(100);
        let buckets = floor.temporal_aggregation(Frequency::Week, None, None);
        assert!(!buckets.is_empty() && buckets.len() <= 2);
        assert_eq!(buckets.last().map(|b| b.bucket), Some(day(2024, 1, 1)));
        assert_eq!(buckets.last().map(|b| b.sum), Some(2.0));
    }

    #[test]
    fn wide_span_falls_back_to_populated_buckets() {
        let e = engine(
            vec![at(2024, 1, 1), at(2024, 12, 31)],
            vec![Some(5.0), Some(7.0)],
            vec![None; 2],
        )
        .with_max_buckets(100);
        let buckets = e.temporal_aggregation(Frequency::Day, None, None);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket, day(2024, 1, 1));
        assert_eq!(buckets[1].bucket, day(2024, 12, 31));
        assert_eq!(buckets[1].mean, Some(7.0));

        // within the cap the gaps are still filled
        let monthly = e.temporal_aggregation(Frequency::Month, None, None);
        assert_eq!(monthly.len(), 12);
    }

    #[test]
    fn filtering_keeps_the_bucket_cap() {
        let e = engine(
            vec![at(2024, 1, 1), at(2024, 12, 31)],
            vec![Some(5.0), Some(7.0)],
            vec![Some("Centro"), Some("Centro")],
        )
        .with_max_buckets(10);
        let filtered = e.with_filter(&Filter {
            category_column: Some("loja".into()),
            category_values: vec!["Centro".into()],
            ..Filter::default()
        });
        assert_eq!(filtered.temporal_aggregation(Frequency::Month, None, None).len(), 2);
    }

    #[test]
    fn preceding_window_clamps_to_earliest_date() {
        let start = day(-200000, 1, 1);
        let (s, e) = preceding_window(start, day(200000, 1, 1));
        assert_eq!(s, NaiveDate::MIN);
        assert_eq!(Some(e), start.pred_opt());

        let (s, e) = preceding_window(NaiveDate::MIN, day(2024, 1, 1));
        assert_eq!((s, e), (NaiveDate::MIN, NaiveDate::MIN));
    }

    #[test]
    fn preceding_window_swaps_reversed_bounds() {
        assert_eq!(
            preceding_window(day(2024, 3, 10), day(2024, 3, 1)),
            (day(2024, 2, 20), day(2024, 2, 29))
        );
    }

    #[test]
    fn period_comparison_over_extreme_span() {
        let e = engine(vec![at(2024, 1, 1)], vec![Some(50.0)], vec![None]);
        let cmp = e.period_comparison(day(-200000, 1, 1), day(200000, 1, 1), None);
        assert_eq!(cmp.current_total, 50.0);
        assert_eq!(cmp.previous_start, NaiveDate::MIN);
        assert_eq!(cmp.previous_total, 0.0);

        let reversed = e.period_comparison(day(2024, 1, 31), day(2024, 1, 1), None);
        assert_eq!(reversed.current_start, day(2024, 1, 1));
        assert_eq!(reversed.current_end, day(2024, 1, 31));
        assert_eq!(reversed.current_total, 50.0);
    }

    #[test]
    fn frequency_parsing() {
        assert_eq!("M".parse::<Frequency>().unwrap(), Frequency::Month);
        assert_eq!("weekly".parse::<Frequency>().unwrap(), Frequency::Week);
        assert!("hour".parse::<Frequency>().is_err());
    }
}
