use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use sheet_metrics::metrics::{Filter, Frequency, MetricsEngine};
use sheet_metrics::outliers::OutlierMethod;
use sheet_metrics::{load_workbook, ColumnRole, NormalizationPipeline, PipelineConfig, PipelineError};

const SALES_CSV: &str = "\
Data da Venda,Loja,Categoria,Valor (R$),Rota
2023-12-01,Centro,Bebidas,\"300,00\",R1
2023-12-31,Norte,Bebidas,\"500,00\",R2
05/01/2024,Centro,Mercearia,\"600,00\",R1
2024-01-31,Sul,Bebidas,\"400,00\",R3
2024-01-31,Sul,Bebidas,\"400,00\",R3
2024-02-10,Norte,Mercearia,sem valor,R2
,,,,
";

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn write_csv(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn sales_engine(dir: &tempfile::TempDir) -> MetricsEngine {
    let path = write_csv(dir, "vendas.csv", SALES_CSV);
    let (workbook, _) = load_workbook(&path, 50).unwrap();
    let sheet = workbook.sheet(None).unwrap().clone();
    let table = NormalizationPipeline::default().run(sheet).unwrap();
    MetricsEngine::new(table)
}

#[test]
fn csv_to_canonical_table() {
    let dir = tempfile::tempdir().unwrap();
    let engine = sales_engine(&dir);
    let table = engine.table();

    assert_eq!(
        table.column_names(),
        vec!["data", "loja", "categoria", "valor_r"]
    );
    assert_eq!(table.column("data").unwrap().role(), ColumnRole::Date);
    assert_eq!(table.column("valor_r").unwrap().role(), ColumnRole::Numeric);
    // duplicate, unmeasured and blank rows are gone
    assert_eq!(table.len(), 4);
    assert_eq!(engine.value_column(), Some("valor_r"));
}

#[test]
fn normalizing_twice_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let first = sales_engine(&dir).table().clone();
    let second = NormalizationPipeline::default()
        .run(first.to_raw_sheet("vendas"))
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn metrics_over_loaded_sheet() {
    let dir = tempfile::tempdir().unwrap();
    let engine = sales_engine(&dir);

    assert_eq!(engine.total(None), 1800.0);

    let cmp = engine.period_comparison(day(2024, 1, 1), day(2024, 1, 31), None);
    assert_eq!(cmp.current_total, 1000.0);
    assert_eq!(cmp.previous_total, 800.0);
    assert_eq!(cmp.change, 200.0);
    assert_eq!(cmp.change_percent, Some(25.0));

    let months = engine.temporal_aggregation(Frequency::Month, None, None);
    let totals: Vec<f64> = months.iter().map(|b| b.sum).collect();
    assert_eq!(totals, vec![800.0, 1000.0]);

    let top = engine.category_breakdown(Some("categoria"), 1);
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].category, "Bebidas");
    assert_eq!(top[0].sum, 1200.0);

    assert!(engine.outlier_flags(None, OutlierMethod::iqr()).is_some());
}

#[test]
fn filters_narrow_a_copy() {
    let dir = tempfile::tempdir().unwrap();
    let engine = sales_engine(&dir);
    let filtered = engine.with_filter(&Filter {
        start_date: Some(day(2024, 1, 1)),
        category_column: Some("loja".into()),
        category_values: vec!["Sul".into()],
        ..Filter::default()
    });
    assert_eq!(filtered.count(), 1);
    assert_eq!(filtered.total(None), 400.0);
    assert_eq!(engine.count(), 4);
}

#[test]
fn sheet_without_measures_fails_after_processing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(&dir, "rotas.csv", "Rota\nR1\nR2\n");
    let (workbook, _) = load_workbook(&path, 50).unwrap();
    let sheet = workbook.sheet(None).unwrap().clone();
    let result = NormalizationPipeline::new(PipelineConfig::default()).run(sheet);
    assert!(matches!(result, Err(PipelineError::PostProcessingEmpty(_))));
}
