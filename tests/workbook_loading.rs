mod common;

use chrono::NaiveDate;

use retail_etl::ingestion::{load_workbook, LoadOptions};
use retail_etl::observability::{MemoryObserver, NoopObserver, Severity};
use retail_etl::types::{DataType, Value};
use retail_etl::PipelineError;

use common::{orders_sheet, people_sheet, returns_sheet, setup_with, standard_orders};

fn type_of(ds: &retail_etl::types::DataSet, column: &str) -> DataType {
    let idx = ds.schema.index_of(column).unwrap();
    ds.schema.fields[idx].data_type
}

#[test]
fn typed_load_applies_hints() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::standard_setup(dir.path());

    let raw = load_workbook(&config.source.workbook, &LoadOptions::default(), &NoopObserver).unwrap();

    assert!(raw.hinted);
    assert_eq!(raw.orders.row_count(), 6);
    assert_eq!(raw.returns.row_count(), 3);
    assert_eq!(raw.people.row_count(), 4);

    assert_eq!(type_of(&raw.orders, "Row ID"), DataType::Int64);
    assert_eq!(type_of(&raw.orders, "Quantity"), DataType::Int64);
    assert_eq!(type_of(&raw.orders, "Postal Code"), DataType::Utf8);
    assert_eq!(type_of(&raw.orders, "Order Date"), DataType::Date);
    assert_eq!(type_of(&raw.orders, "Customer Name"), DataType::Mixed);

    let order_date = raw.orders.schema.index_of("Order Date").unwrap();
    let postal = raw.orders.schema.index_of("Postal Code").unwrap();
    assert_eq!(
        raw.orders.rows[0][order_date],
        Value::Date(NaiveDate::from_ymd_opt(2016, 1, 5).unwrap())
    );
    assert_eq!(raw.orders.rows[0][postal], Value::Utf8("10024".to_string()));
    assert_eq!(raw.orders.rows[3][postal], Value::Null);
}

#[test]
fn uncoercible_hint_falls_back_to_untyped_read() {
    let dir = tempfile::tempdir().unwrap();
    let mut orders = standard_orders();
    orders[1].quantity = None;
    let config = setup_with(
        dir.path(),
        &[
            orders_sheet(&orders),
            returns_sheet(common::standard_returns()),
            people_sheet(common::standard_people()),
        ],
    );

    let obs = MemoryObserver::new();
    let raw = load_workbook(&config.source.workbook, &LoadOptions::default(), &obs).unwrap();

    assert!(!raw.hinted);
    assert_eq!(raw.orders.row_count(), 6);
    assert_eq!(type_of(&raw.orders, "Order Date"), DataType::Mixed);
    // Untyped reads keep the day serial.
    let order_date = raw.orders.schema.index_of("Order Date").unwrap();
    assert_eq!(raw.orders.rows[2][order_date], Value::Float64(1.0));

    let warnings = obs.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("retrying without type hints"));
}

#[test]
fn missing_workbook_is_source_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_workbook(
        dir.path().join("absent.xlsx"),
        &LoadOptions::default(),
        &NoopObserver,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::SourceNotFound { .. }));
}

#[test]
fn missing_sheet_fails_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup_with(
        dir.path(),
        &[
            orders_sheet(&standard_orders()),
            returns_sheet(common::standard_returns()),
        ],
    );

    let obs = MemoryObserver::new();
    let err = load_workbook(&config.source.workbook, &LoadOptions::default(), &obs).unwrap_err();

    match err {
        PipelineError::Load { message } => {
            assert!(message.contains("People"));
            assert!(!message.contains("untyped retry"));
        }
        other => panic!("expected Load error, got {other:?}"),
    }
    assert!(obs
        .diagnostics()
        .iter()
        .all(|d| d.severity < Severity::Warning));
}

#[test]
fn unreadable_workbook_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.xlsx");
    std::fs::write(&path, b"not a zip archive").unwrap();

    let obs = MemoryObserver::new();
    let err = load_workbook(&path, &LoadOptions::default(), &obs).unwrap_err();

    assert!(matches!(err, PipelineError::Load { .. }), "{err:?}");
    assert!(obs.warnings().is_empty());
}

#[test]
fn custom_sheet_names_are_honored() {
    let dir = tempfile::tempdir().unwrap();
    let mut orders = orders_sheet(&standard_orders());
    orders.name = "Sales 2016";
    let config = setup_with(
        dir.path(),
        &[
            orders,
            returns_sheet(common::standard_returns()),
            people_sheet(common::standard_people()),
        ],
    );

    let mut options = LoadOptions::default();
    options.sheets.orders = "Sales 2016".to_string();
    let raw = load_workbook(&config.source.workbook, &options, &NoopObserver).unwrap();
    assert_eq!(raw.orders.row_count(), 6);
}
