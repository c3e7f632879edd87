//! Load the cleaned Parquet export into the warehouse.

use std::path::{Path, PathBuf};

use polars::prelude::{col, DataFrame, DataType, Expr, IntoLazy};

use crate::error::{PipelineError, PipelineResult, Stage};
use crate::observability::{Diagnostic, PipelineObserver, Severity, StageStats};

use super::{empty_text_table, read_parquet_frame, Warehouse};

pub const RAW_ORDERS: &str = "raw_orders";
pub const RAW_RETURNS: &str = "raw_returns";
pub const RAW_PEOPLE: &str = "raw_people";

const RETURNS_SQL: &str =
    "SELECT DISTINCT order_id, returned FROM raw_orders WHERE returned IS NOT NULL";
const PEOPLE_SQL: &str = "SELECT DISTINCT region, person FROM raw_orders WHERE person IS NOT NULL";

/// Quality checks run after loading: name, query, and whether a nonzero result is a finding.
const QUALITY_CHECKS: [(&str, &str, bool); 5] = [
    ("orders_raw_count", "SELECT COUNT(*) FROM raw_orders", false),
    (
        "missing_order_id",
        "SELECT COUNT(*) FROM raw_orders WHERE order_id IS NULL",
        true,
    ),
    (
        "invalid_discount",
        "SELECT COUNT(*) FROM raw_orders WHERE discount IS NOT NULL AND (discount < 0 OR discount > 1)",
        true,
    ),
    (
        "negative_quantity",
        "SELECT COUNT(*) FROM raw_orders WHERE quantity < 0",
        true,
    ),
    (
        "duplicate_row_id",
        "SELECT COUNT(*) FROM (SELECT row_id FROM raw_orders GROUP BY row_id HAVING COUNT(*) > 1) AS dup",
        true,
    ),
];

/// Outcome of one quality check. `value` is `None` when the query itself failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityCheck {
    pub name: &'static str,
    pub value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub source: PathBuf,
    pub orders: usize,
    pub returns: usize,
    pub people: usize,
    /// Tables created empty because they could not be derived from `raw_orders`.
    pub placeholders: Vec<&'static str>,
    pub checks: Vec<QualityCheck>,
}

/// Load `parquet_path` into `raw_orders`, derive `raw_returns` / `raw_people`, run quality checks.
///
/// A missing file is fatal. Derivation failures fall back to empty placeholder tables and
/// quality-check failures are reported as warnings.
pub fn load_cleaned(
    wh: &mut Warehouse,
    parquet_path: &Path,
    observer: &dyn PipelineObserver,
) -> PipelineResult<LoadReport> {
    if !parquet_path.exists() {
        return Err(PipelineError::SourceNotFound {
            path: parquet_path.to_path_buf(),
        });
    }
    let frame = categoricals_as_text(read_parquet_frame(parquet_path)?)?;
    let orders = wh.put_table(RAW_ORDERS, frame);
    observer.on_diagnostic(
        &Diagnostic::info(
            Stage::WarehouseLoad,
            format!("loaded {} into {RAW_ORDERS}", parquet_path.display()),
        )
        .with_rows(orders),
    );

    let columns = wh.columns(RAW_ORDERS).unwrap_or_default();
    let has = |c: &str| columns.iter().any(|name| name == c);

    let mut placeholders = Vec::new();
    let returns = derive_or_placeholder(
        wh,
        RAW_RETURNS,
        has("order_id") && has("returned"),
        RETURNS_SQL,
        &["order_id", "returned", "region"],
        observer,
        &mut placeholders,
    );
    let people = derive_or_placeholder(
        wh,
        RAW_PEOPLE,
        has("region") && has("person"),
        PEOPLE_SQL,
        &["region", "person"],
        observer,
        &mut placeholders,
    );

    let checks = run_quality_checks(wh, observer);

    observer.on_stage_finished(
        Stage::WarehouseLoad,
        StageStats {
            rows_in: orders,
            rows_out: orders,
        },
    );
    Ok(LoadReport {
        source: parquet_path.to_path_buf(),
        orders,
        returns,
        people,
        placeholders,
        checks,
    })
}

fn derive_or_placeholder(
    wh: &mut Warehouse,
    table: &'static str,
    derivable: bool,
    sql: &str,
    placeholder_columns: &[&str],
    observer: &dyn PipelineObserver,
    placeholders: &mut Vec<&'static str>,
) -> usize {
    let reason = if derivable {
        match wh.create_table(table, sql) {
            Ok(rows) => {
                observer.on_diagnostic(
                    &Diagnostic::info(Stage::WarehouseLoad, format!("{table} derived from {RAW_ORDERS}"))
                        .with_rows(rows),
                );
                return rows;
            }
            Err(e) => format!("failed to derive {table}: {e}"),
        }
    } else {
        format!("source columns for {table} not present in {RAW_ORDERS}")
    };

    wh.put_table(table, empty_text_table(placeholder_columns));
    placeholders.push(table);
    observer.on_diagnostic(&Diagnostic::new(
        Stage::WarehouseLoad,
        Severity::Warning,
        format!("{reason}; created empty placeholder"),
    ));
    0
}

fn run_quality_checks(wh: &mut Warehouse, observer: &dyn PipelineObserver) -> Vec<QualityCheck> {
    QUALITY_CHECKS
        .iter()
        .map(|&(name, sql, is_finding)| {
            let value = match wh.fetch_count(sql) {
                Ok(v) => Some(v),
                Err(e) => {
                    observer.on_diagnostic(&Diagnostic::new(
                        Stage::WarehouseLoad,
                        Severity::Warning,
                        format!("quality check {name} failed: {e}"),
                    ));
                    None
                }
            };
            if let Some(v) = value {
                let rows = usize::try_from(v).unwrap_or(0);
                let d = if is_finding && v > 0 {
                    Diagnostic::warning(Stage::WarehouseLoad, format!("quality check {name}"), rows)
                } else {
                    Diagnostic::info(Stage::WarehouseLoad, format!("quality check {name}: {v}"))
                };
                observer.on_diagnostic(&d);
            }
            QualityCheck { name, value }
        })
        .collect()
}

/// The export stores categoricals as Arrow dictionaries; SQL over the warehouse works on text.
fn categoricals_as_text(df: DataFrame) -> PipelineResult<DataFrame> {
    let casts: Vec<Expr> = df
        .columns()
        .iter()
        .filter(|c| c.dtype().is_categorical())
        .map(|c| col(c.name().clone()).cast(DataType::String))
        .collect();
    if casts.is_empty() {
        return Ok(df);
    }
    Ok(df.lazy().with_columns(casts).collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemoryObserver;
    use polars::prelude::*;

    fn write_orders(path: &Path, df: &mut DataFrame) {
        let file = std::fs::File::create(path).unwrap();
        ParquetWriter::new(file).finish(df).unwrap();
    }

    fn check(report: &LoadReport, name: &str) -> Option<i64> {
        report.checks.iter().find(|c| c.name == name).and_then(|c| c.value)
    }

    #[test]
    fn load_derives_lookup_tables_and_runs_checks() {
        let dir = tempfile::tempdir().unwrap();
        let parquet = dir.path().join("cleaned.parquet");
        let mut df = DataFrame::new_infer_height(vec![
            Series::new("row_id".into(), &[1i64, 2, 2]).into(),
            Series::new("order_id".into(), &["A", "A", "B"]).into(),
            Series::new("returned".into(), &["Yes", "Yes", "No"]).into(),
            Series::new("region".into(), &["West", "West", "East"]).into(),
            Series::new("person".into(), &["Anna", "Anna", "Cara"]).into(),
            Series::new("quantity".into(), &[1i64, -2, 3]).into(),
            Series::new("discount".into(), &[Some(0.1), None, Some(0.0)]).into(),
        ])
        .unwrap();
        write_orders(&parquet, &mut df);

        let mut wh = Warehouse::connect(dir.path().join("wh")).unwrap();
        let obs = MemoryObserver::new();
        let report = load_cleaned(&mut wh, &parquet, &obs).unwrap();

        assert_eq!(report.orders, 3);
        assert_eq!(report.returns, 2);
        assert_eq!(report.people, 2);
        assert!(report.placeholders.is_empty());
        assert_eq!(check(&report, "orders_raw_count"), Some(3));
        assert_eq!(check(&report, "missing_order_id"), Some(0));
        assert_eq!(check(&report, "invalid_discount"), Some(0));
        assert_eq!(check(&report, "negative_quantity"), Some(1));
        assert_eq!(check(&report, "duplicate_row_id"), Some(1));
        assert_eq!(obs.warnings().len(), 2);
    }

    #[test]
    fn missing_lookup_columns_create_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let parquet = dir.path().join("cleaned.parquet");
        let mut df =
            DataFrame::new_infer_height(vec![Series::new("order_id".into(), &["A"]).into()]).unwrap();
        write_orders(&parquet, &mut df);

        let mut wh = Warehouse::connect(dir.path().join("wh")).unwrap();
        let report = load_cleaned(&mut wh, &parquet, &MemoryObserver::new()).unwrap();

        assert_eq!(report.placeholders, vec![RAW_RETURNS, RAW_PEOPLE]);
        assert_eq!(
            wh.columns(RAW_RETURNS).unwrap(),
            vec!["order_id", "returned", "region"]
        );
        assert_eq!(wh.fetch_count("SELECT COUNT(*) FROM raw_people").unwrap(), 0);
        // Checks on absent columns fail softly.
        assert_eq!(check(&report, "invalid_discount"), None);
    }

    #[test]
    fn categorical_export_columns_load_as_text() {
        use crate::export::parquet::write_parquet;
        use crate::types::{DataSet, Field, Schema, Value};

        let dir = tempfile::tempdir().unwrap();
        let parquet = dir.path().join("cleaned.parquet");
        let ds = DataSet::new(
            Schema::new(vec![
                Field::new("order_id", crate::types::DataType::Utf8),
                Field::new("region", crate::types::DataType::Categorical),
            ]),
            vec![
                vec![Value::Utf8("A".to_string()), Value::Utf8("West".to_string())],
                vec![Value::Utf8("B".to_string()), Value::Utf8("West".to_string())],
            ],
        );
        write_parquet(&ds, &parquet).unwrap();
        assert!(
            read_parquet_frame(&parquet).unwrap().column("region").unwrap().dtype().is_categorical()
        );

        let mut wh = Warehouse::connect(dir.path().join("wh")).unwrap();
        load_cleaned(&mut wh, &parquet, &MemoryObserver::new()).unwrap();

        let region = wh.table(RAW_ORDERS).unwrap().column("region").unwrap();
        assert_eq!(region.dtype(), &DataType::String);
        assert_eq!(
            wh.fetch_count("SELECT COUNT(*) FROM raw_orders WHERE region = 'West'").unwrap(),
            2
        );
    }

    #[test]
    fn missing_parquet_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut wh = Warehouse::connect(dir.path()).unwrap();
        let err = load_cleaned(&mut wh, &dir.path().join("nope.parquet"), &MemoryObserver::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound { .. }));
    }
}
