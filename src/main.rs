// Command-line front end.
//
// Every command runs the same flow: load the workbook, normalize the chosen
// sheet, apply the global filters, then compute and print one result. With
// `--out-dir` the result is also written as CSV and JSON.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use sheet_metrics::enrich::{self, Aggregation};
use sheet_metrics::metrics::{Filter, Frequency, MetricsEngine};
use sheet_metrics::outliers::OutlierMethod;
use sheet_metrics::output;
use sheet_metrics::sanitize::{validate_date_range, validate_numeric_column};
use sheet_metrics::util::{format_currency, format_int, format_number, format_percentage, normalize_name};
use sheet_metrics::{load_workbook, NormalizationPipeline, PipelineConfig};

const PREVIEW_ROWS: usize = 20;

#[derive(Parser)]
#[command(name = "sheet_metrics")]
#[command(about = "Business metrics over spreadsheets with unknown layouts")]
struct Args {
    /// Workbook to analyze (.xlsx, .xlsm, .xlsb, .xls, .ods or .csv)
    file: PathBuf,

    /// Sheet to analyze (default: first sheet with data)
    #[arg(short, long)]
    sheet: Option<String>,

    /// JSON file overriding pipeline and inference settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Numeric column used as the measure (default: first numeric column)
    #[arg(long)]
    value_column: Option<String>,

    /// Keep rows dated on or after this day (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Keep rows dated on or before this day (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Column used by --category
    #[arg(long)]
    category_column: Option<String>,

    /// Keep rows whose category is one of these values
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Keep rows whose value is at least this
    #[arg(long)]
    min_value: Option<f64>,

    /// Keep rows whose value is at most this
    #[arg(long)]
    max_value: Option<f64>,

    /// Directory for CSV and JSON copies of the result
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Shape of the normalized table
    Summary,
    /// Total, average, median, min, max and count of the value column
    Kpis,
    /// Compare a period with the previous one
    Compare {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        /// Explicit previous period start (needs --previous-end)
        #[arg(long, requires = "previous_end")]
        previous_start: Option<NaiveDate>,
        #[arg(long, requires = "previous_start")]
        previous_end: Option<NaiveDate>,
    },
    /// Sum, mean and count per calendar bucket
    Resample {
        /// day, week, month or year
        #[arg(short, long, default_value = "month")]
        frequency: Frequency,
    },
    /// Top categories by total value
    Breakdown {
        /// Category column (default: first text column)
        #[arg(long)]
        by: Option<String>,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Rows whose value is an outlier
    Outliers {
        /// iqr or zscore
        #[arg(short, long, default_value = "iqr")]
        method: OutlierMethod,
        #[arg(long)]
        column: Option<String>,
    },
    /// Pivot the value column by one or two columns
    Pivot {
        #[arg(long)]
        index: String,
        #[arg(long)]
        columns: Option<String>,
        /// sum, mean or count
        #[arg(long, default_value = "sum")]
        aggregation: Aggregation,
    },
    /// Write the normalized table to CSV
    Export {
        /// Add period and running-total columns
        #[arg(long)]
        enrich: bool,
        /// Numeric columns to scale to [0, 1]
        #[arg(long)]
        normalize: Vec<String>,
    },
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    run(args)
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    validate_date_range(args.from, args.to)?;
    if let Some(dir) = &args.out_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let (workbook, report) = load_workbook(&args.file, config.max_file_size_mb)
        .with_context(|| format!("loading {}", args.file.display()))?;
    if report.skipped_sheets > 0 {
        warn!(skipped = report.skipped_sheets, "some sheets were skipped");
    }
    let sheet = workbook
        .sheet(args.sheet.as_deref())
        .context("workbook has no usable sheet")?
        .clone();
    if let Some(wanted) = &args.sheet {
        if &sheet.name != wanted {
            warn!(wanted = %wanted, using = %sheet.name, "sheet not found, using first sheet");
        }
    }

    let max_buckets = config.max_buckets;
    let pipeline = NormalizationPipeline::new(config);
    let table = pipeline.run(sheet)?;

    let mut engine = MetricsEngine::new(table).with_max_buckets(max_buckets);
    if let Some(name) = &args.value_column {
        let name = resolve_column(&engine, name);
        validate_numeric_column(engine.table(), &name)?;
        engine = engine.with_value_column(&name);
    }

    let filter = Filter {
        start_date: args.from,
        end_date: args.to,
        category_column: args.category_column.as_deref().map(|c| resolve_column(&engine, c)),
        category_values: args.categories.clone(),
        value_range: match (args.min_value, args.max_value) {
            (None, None) => None,
            (lo, hi) => Some((lo.unwrap_or(f64::NEG_INFINITY), hi.unwrap_or(f64::INFINITY))),
        },
    };
    let engine = if filter == Filter::default() {
        engine
    } else {
        let filtered = engine.with_filter(&filter);
        info!(before = engine.count(), after = filtered.count(), "applied filters");
        filtered
    };

    let out_dir = args.out_dir.as_deref();
    match args.command {
        Command::Summary => print_summary(&engine, out_dir)?,
        Command::Kpis => {
            let kpis = engine.summary_kpis();
            println!("Total:   {}", format_currency(kpis.total, "R$"));
            println!("Average: {}", format_currency(kpis.average, "R$"));
            println!("Count:   {}\n", format_int(kpis.count));
            emit(out_dir, "kpis", &[kpis])?;
        }
        Command::Compare {
            start,
            end,
            previous_start,
            previous_end,
        } => {
            validate_date_range(Some(start), Some(end))?;
            let previous = previous_start.zip(previous_end);
            let cmp = engine.period_comparison(start, end, previous);
            match cmp.change_percent {
                Some(pct) => println!("Change: {} ({})\n", format_number(cmp.change, 2), format_percentage(pct, 2)),
                None => println!("Change: {} (no baseline)\n", format_number(cmp.change, 2)),
            }
            emit(out_dir, "comparison", &[cmp])?;
        }
        Command::Resample { frequency } => {
            let buckets = engine.temporal_aggregation(frequency, None, None);
            if engine.date_column().is_none() {
                warn!("table has no date column");
            }
            emit(out_dir, &format!("resample_{frequency}"), &buckets)?;
        }
        Command::Breakdown { by, top } => {
            let by = by.map(|c| resolve_column(&engine, &c));
            let rows = engine.category_breakdown(by.as_deref(), top);
            emit(out_dir, "breakdown", &rows)?;
        }
        Command::Outliers { method, column } => {
            let column = column.map(|c| resolve_column(&engine, &c));
            let rows = engine.outliers(column.as_deref(), method);
            println!("{} outliers ({method})\n", format_int(rows.len()));
            emit(out_dir, &format!("outliers_{method}"), &rows)?;
        }
        Command::Pivot {
            index,
            columns,
            aggregation,
        } => {
            let Some(values) = engine.value_column() else {
                bail!("table has no numeric column to pivot");
            };
            let index = resolve_column(&engine, &index);
            let columns = columns.map(|c| resolve_column(&engine, &c));
            let pivot = enrich::pivot(engine.table(), &index, columns.as_deref(), values, aggregation)?;
            println!("{}\n", output::render_canonical(&pivot, PREVIEW_ROWS));
            if let Some(dir) = out_dir {
                let path = dir.join(format!("pivot_{aggregation}.csv"));
                output::write_table_csv(&path, &pivot)?;
                println!("(Full table exported to {})", path.display());
            }
        }
        Command::Export { enrich: with_periods, normalize } => {
            let mut table = engine.table().clone();
            if with_periods {
                table = enrich::enrich_with_periods(&table)?;
                if let Some(value) = engine.value_column() {
                    table = enrich::add_calculated_columns(&table, value)?;
                }
            }
            if !normalize.is_empty() {
                let names: Vec<String> = normalize.iter().map(|c| resolve_column(&engine, c)).collect();
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                table = enrich::normalize_min_max(&table, &names)?;
            }
            println!("{}\n", output::render_canonical(&table, PREVIEW_ROWS));
            let dir = out_dir.unwrap_or_else(|| Path::new("."));
            let path = dir.join("normalized.csv");
            output::write_table_csv(&path, &table)?;
            println!("(Full table exported to {})", path.display());
        }
    }
    Ok(())
}

/// Accept either the canonical column name or the header as written in
/// the sheet.
fn resolve_column(engine: &MetricsEngine, name: &str) -> String {
    if engine.table().column(name).is_some() {
        name.to_string()
    } else {
        normalize_name(name)
    }
}

fn print_summary(engine: &MetricsEngine, out_dir: Option<&Path>) -> Result<()> {
    let summary = engine.table().summary();
    println!("Rows:    {}", format_int(summary.row_count));
    println!("Columns: {}", summary.column_names.join(", "));
    println!("Numeric: {}", summary.numeric_column_names.join(", "));
    match &summary.date_range {
        Some(range) => println!("Dates:   {} to {}", range.min.date(), range.max.date()),
        None => println!("Dates:   (no date column)"),
    }
    if let Some(value) = engine.value_column() {
        println!("Value:   {value}");
    }
    if let Some(dir) = out_dir {
        output::write_json(&dir.join("summary.json"), &summary)?;
    }
    Ok(())
}

fn emit<T>(out_dir: Option<&Path>, stem: &str, rows: &[T]) -> Result<()>
where
    T: Serialize + Tabled + Clone,
{
    output::preview_table_rows(rows, PREVIEW_ROWS);
    if let Some(dir) = out_dir {
        let csv_path = dir.join(format!("{stem}.csv"));
        output::write_csv(&csv_path, rows)?;
        output::write_json(&dir.join(format!("{stem}.json")), rows)?;
        println!("(Full table exported to {})", csv_path.display());
    }
    Ok(())
}
