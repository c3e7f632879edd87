//! Structural validation of the orders and people tables.
//!
//! Detection always runs and is always reported. Correction is applied only where a bad value
//! would corrupt joins: duplicate rows, duplicate people regions and missing order keys. Negative
//! quantities are kept for audit; out-of-range discounts are fixed later, in the derive stage.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::Stage;
use crate::observability::{Diagnostic, PipelineObserver};
use crate::types::{DataSet, RowKey, Value, ValueKey};

/// Counts found by [`validate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub duplicate_rows_removed: usize,
    pub duplicate_people_regions_removed: usize,
    pub negative_quantities: usize,
    pub out_of_range_discounts: usize,
    pub missing_order_ids_dropped: usize,
}

/// Run the validation checks in order, mutating `orders` and `people`.
pub fn validate(
    orders: &mut DataSet,
    people: &mut DataSet,
    observer: &dyn PipelineObserver,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    let emit = |message: &str, rows: usize| {
        if rows > 0 {
            observer.on_diagnostic(&Diagnostic::warning(Stage::Validate, message, rows));
        }
    };

    report.duplicate_rows_removed = drop_duplicate_rows(orders);
    emit("dropped exact duplicate rows in orders", report.duplicate_rows_removed);

    report.duplicate_people_regions_removed = dedup_people_regions(people);
    emit(
        "duplicate regions in people; kept first occurrence",
        report.duplicate_people_regions_removed,
    );

    report.negative_quantities = count_where(orders, "quantity", |q| q < 0.0);
    emit("negative quantities found in orders", report.negative_quantities);

    report.out_of_range_discounts = count_where(orders, "discount", |d| !(0.0..=1.0).contains(&d));
    emit("discounts outside [0,1] found in orders", report.out_of_range_discounts);

    report.missing_order_ids_dropped = drop_missing_order_ids(orders);
    emit("missing order_ids; dropped those rows", report.missing_order_ids_dropped);

    report
}

/// Remove exact full-row duplicates, keeping the first occurrence. Returns the removed count.
pub fn drop_duplicate_rows(ds: &mut DataSet) -> usize {
    let mut seen: HashSet<RowKey<'_>> = HashSet::with_capacity(ds.rows.len());
    let keep: Vec<bool> = ds.rows.iter().map(|row| seen.insert(RowKey(row))).collect();
    drop(seen);

    let mut flags = keep.into_iter();
    ds.retain_rows(|_| flags.next().unwrap_or(true))
}

/// Keep the first people row per `region`. No-op if the table has no `region` column.
pub fn dedup_people_regions(people: &mut DataSet) -> usize {
    let Some(idx) = people.schema.index_of("region") else {
        return 0;
    };
    let mut seen: HashSet<ValueKey<'_>> = HashSet::new();
    let keep: Vec<bool> = people.rows.iter().map(|row| seen.insert(ValueKey(&row[idx]))).collect();
    drop(seen);

    let mut flags = keep.into_iter();
    people.retain_rows(|_| flags.next().unwrap_or(true))
}

/// Count rows whose `column` is numeric and satisfies `pred`. Missing column → 0.
fn count_where(ds: &DataSet, column: &str, pred: impl Fn(f64) -> bool) -> usize {
    ds.column(column)
        .map(|values| values.filter_map(Value::to_f64).filter(|v| pred(*v)).count())
        .unwrap_or(0)
}

/// True if an order key is absent: null, or text that is blank after trimming.
pub(crate) fn is_missing_key(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Utf8(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn drop_missing_order_ids(orders: &mut DataSet) -> usize {
    let Some(idx) = orders.schema.index_of("order_id") else {
        return 0;
    };
    orders.retain_rows(|row| !is_missing_key(&row[idx]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemoryObserver;
    use crate::types::{DataType, Field, Schema};

    fn s(v: &str) -> Value {
        Value::Utf8(v.to_string())
    }

    fn orders() -> DataSet {
        DataSet::new(
            Schema::new(vec![
                Field::new("order_id", DataType::Mixed),
                Field::new("quantity", DataType::Int64),
                Field::new("discount", DataType::Float64),
            ]),
            vec![
                vec![s("A"), Value::Int64(2), Value::Float64(0.1)],
                vec![s("A"), Value::Int64(2), Value::Float64(0.1)],
                vec![s("B"), Value::Int64(-1), Value::Float64(1.5)],
                vec![Value::Null, Value::Int64(1), Value::Float64(0.0)],
                vec![s("  "), Value::Int64(1), Value::Float64(-0.2)],
            ],
        )
    }

    fn people() -> DataSet {
        DataSet::new(
            Schema::new(vec![
                Field::new("person", DataType::Mixed),
                Field::new("region", DataType::Mixed),
            ]),
            vec![
                vec![s("Anna"), s("West")],
                vec![s("Bob"), s("West")],
                vec![s("Cara"), s("East")],
            ],
        )
    }

    #[test]
    fn validation_reports_and_repairs() {
        let mut o = orders();
        let mut p = people();
        let obs = MemoryObserver::new();

        let report = validate(&mut o, &mut p, &obs);

        assert_eq!(
            report,
            ValidationReport {
                duplicate_rows_removed: 1,
                duplicate_people_regions_removed: 1,
                negative_quantities: 1,
                out_of_range_discounts: 2,
                missing_order_ids_dropped: 2,
            }
        );
        // Negative quantity survives; only null/blank keys and the duplicate go.
        assert_eq!(o.row_count(), 2);
        assert_eq!(o.rows[1][1], Value::Int64(-1));
        // Discounts are not corrected here.
        assert_eq!(o.rows[1][2], Value::Float64(1.5));
        // First region occurrence wins.
        assert_eq!(p.rows, vec![vec![s("Anna"), s("West")], vec![s("Cara"), s("East")]]);
        assert_eq!(obs.warnings().len(), 5);
    }

    #[test]
    fn clean_input_emits_no_warnings() {
        let mut o = DataSet::new(
            Schema::new(vec![Field::new("order_id", DataType::Utf8)]),
            vec![vec![s("A")], vec![s("B")]],
        );
        let mut p = people();
        p.rows.truncate(1);
        let obs = MemoryObserver::new();

        let report = validate(&mut o, &mut p, &obs);

        assert_eq!(report, ValidationReport::default());
        assert!(obs.warnings().is_empty());
    }

    #[test]
    fn people_without_region_column_is_left_alone() {
        let mut p = DataSet::new(
            Schema::new(vec![Field::new("person", DataType::Utf8)]),
            vec![vec![s("Anna")], vec![s("Anna")]],
        );
        assert_eq!(dedup_people_regions(&mut p), 0);
        assert_eq!(p.row_count(), 2);
    }
}
