//! Derived fields and numeric precision.

use serde::Serialize;

use crate::error::Stage;
use crate::observability::{Diagnostic, PipelineObserver};
use crate::types::{DataSet, DataType, Field, Value};

/// Monetary/fraction columns rounded to two decimals.
pub const ROUNDED_COLUMNS: [&str; 4] = ["sales", "discount", "profit", "shipping_cost"];

const NBSP: char = '\u{a0}';

/// Counts produced by [`derive_fields`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DerivationReport {
    pub postal_codes_filled: usize,
    pub non_numeric_nulled: usize,
    pub margins_computed: usize,
    pub discounts_clamped: usize,
}

/// Round to `places` decimals, ties to even.
pub fn round_to(v: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (v * scale).round_ties_even() / scale
}

/// `round(profit / sales, 4)`, or `None` when sales is missing or zero.
pub fn profit_margin(profit: Option<f64>, sales: Option<f64>) -> Option<f64> {
    let sales = sales.unwrap_or(0.0);
    if sales == 0.0 {
        return None;
    }
    profit.map(|p| round_to(p / sales, 4))
}

/// Apply the derivation rules in place.
pub fn derive_fields(ds: &mut DataSet, observer: &dyn PipelineObserver) -> DerivationReport {
    let mut report = DerivationReport {
        postal_codes_filled: fill_postal_codes(ds),
        ..DerivationReport::default()
    };
    if report.postal_codes_filled > 0 {
        observer.on_diagnostic(&Diagnostic::warning(
            Stage::Derive,
            "missing postal codes set to 'Unknown'",
            report.postal_codes_filled,
        ));
    }

    for column in ["person", "region"] {
        strip_nbsp(ds, column);
    }

    // Margin uses the values as loaded, before rounding.
    let unrounded: Vec<(Option<f64>, Option<f64>)> = match (
        ds.schema.index_of("profit"),
        ds.schema.index_of("sales"),
    ) {
        (Some(p), Some(s)) => ds.rows.iter().map(|r| (r[p].to_f64(), r[s].to_f64())).collect(),
        _ => Vec::new(),
    };

    for column in ROUNDED_COLUMNS {
        report.non_numeric_nulled += round_column(ds, column);
    }
    if report.non_numeric_nulled > 0 {
        observer.on_diagnostic(&Diagnostic::warning(
            Stage::Derive,
            "non-numeric monetary values set to null",
            report.non_numeric_nulled,
        ));
    }

    if ds.schema.contains("profit") && ds.schema.contains("sales") {
        ds.drop_column("profit_margin");
        let mut margins = unrounded.into_iter();
        ds.push_column(Field::new("profit_margin", DataType::Float64), |_| {
            match margins.next().and_then(|(p, s)| profit_margin(p, s)) {
                Some(m) => {
                    report.margins_computed += 1;
                    Value::Float64(m)
                }
                None => Value::Null,
            }
        });
    }

    report.discounts_clamped = clamp_discounts(ds);
    if report.discounts_clamped > 0 {
        observer.on_diagnostic(&Diagnostic::warning(
            Stage::Derive,
            "discounts outside [0,1] set to null",
            report.discounts_clamped,
        ));
    }
    report
}

fn fill_postal_codes(ds: &mut DataSet) -> usize {
    let Some(idx) = ds.schema.index_of("postal_code") else {
        return 0;
    };
    let mut filled = 0;
    for row in &mut ds.rows {
        let text = row[idx].to_text();
        row[idx] = if text.trim().is_empty() {
            filled += 1;
            Value::Utf8("Unknown".to_string())
        } else {
            Value::Utf8(text)
        };
    }
    ds.schema.fields[idx].data_type = DataType::Utf8;
    filled
}

fn strip_nbsp(ds: &mut DataSet, column: &str) {
    let Some(idx) = ds.schema.index_of(column) else {
        return;
    };
    for row in &mut ds.rows {
        if let Value::Utf8(s) = &row[idx] {
            if s.contains(NBSP) || s.trim() != s.as_str() {
                row[idx] = Value::Utf8(s.replace(NBSP, " ").trim().to_string());
            }
        }
    }
}

/// Round a numeric column to two places; returns how many non-null cells became null.
fn round_column(ds: &mut DataSet, column: &str) -> usize {
    let Some(idx) = ds.schema.index_of(column) else {
        return 0;
    };
    let mut nulled = 0;
    for row in &mut ds.rows {
        row[idx] = match row[idx].to_f64() {
            Some(v) => Value::Float64(round_to(v, 2)),
            None => {
                if !row[idx].is_null() {
                    nulled += 1;
                }
                Value::Null
            }
        };
    }
    ds.schema.fields[idx].data_type = DataType::Float64;
    nulled
}

fn clamp_discounts(ds: &mut DataSet) -> usize {
    let Some(idx) = ds.schema.index_of("discount") else {
        return 0;
    };
    let mut clamped = 0;
    for row in &mut ds.rows {
        if let Value::Float64(d) = row[idx] {
            if !(0.0..=1.0).contains(&d) {
                row[idx] = Value::Null;
                clamped += 1;
            }
        }
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemoryObserver;
    use crate::types::Schema;

    fn orders(rows: Vec<Vec<Value>>) -> DataSet {
        DataSet::new(
            Schema::new(vec![
                Field::new("postal_code", DataType::Utf8),
                Field::new("region", DataType::Categorical),
                Field::new("sales", DataType::Float64),
                Field::new("profit", DataType::Float64),
                Field::new("discount", DataType::Float64),
            ]),
            rows,
        )
    }

    fn margins(ds: &DataSet) -> Vec<Value> {
        ds.column("profit_margin").unwrap().cloned().collect()
    }

    #[test]
    fn margin_examples() {
        assert_eq!(profit_margin(Some(50.0), Some(200.0)), Some(0.25));
        assert_eq!(profit_margin(Some(10.0), Some(0.0)), None);
        assert_eq!(profit_margin(Some(10.0), None), None);
        assert_eq!(profit_margin(None, Some(5.0)), None);
    }

    #[test]
    fn rounding_ties_go_to_even() {
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.625, 2), 0.62);
        assert_eq!(round_to(0.375, 2), 0.38);
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(-2.5, 0), -2.0);
        assert_eq!(round_to(1.23456, 4), 1.2346);
    }

    #[test]
    fn margin_uses_unrounded_values() {
        // Rounded inputs would give 0.00 / 0.01 = 0.
        let mut ds = orders(vec![vec![
            Value::Utf8("10024".to_string()),
            Value::Utf8("East".to_string()),
            Value::Float64(0.006),
            Value::Float64(0.0035),
            Value::Float64(0.1),
        ]]);
        derive_fields(&mut ds, &MemoryObserver::new());
        assert_eq!(margins(&ds), vec![Value::Float64(0.5833)]);
        assert_eq!(ds.rows[0][2], Value::Float64(0.01));
    }

    #[test]
    fn derivation_cleans_each_field() {
        let mut ds = orders(vec![
            vec![
                Value::Null,
                Value::Utf8("\u{a0}West ".to_string()),
                Value::Float64(200.0),
                Value::Float64(50.0),
                Value::Float64(1.5),
            ],
            vec![
                Value::Utf8("  ".to_string()),
                Value::Utf8("East".to_string()),
                Value::Float64(0.0),
                Value::Float64(10.0),
                Value::Float64(0.2),
            ],
            vec![
                Value::Utf8("02134".to_string()),
                Value::Null,
                Value::Utf8("n/a".to_string()),
                Value::Float64(1.0),
                Value::Float64(-0.1),
            ],
        ]);
        let obs = MemoryObserver::new();

        let report = derive_fields(&mut ds, &obs);

        let postal: Vec<Value> = ds.column("postal_code").unwrap().cloned().collect();
        assert_eq!(
            postal,
            vec![
                Value::Utf8("Unknown".to_string()),
                Value::Utf8("Unknown".to_string()),
                Value::Utf8("02134".to_string()),
            ]
        );
        assert_eq!(ds.rows[0][1], Value::Utf8("West".to_string()));
        assert_eq!(ds.rows[2][1], Value::Null);
        assert_eq!(ds.rows[2][2], Value::Null);
        assert_eq!(margins(&ds), vec![Value::Float64(0.25), Value::Null, Value::Null]);
        assert_eq!(ds.rows[0][4], Value::Null);
        assert_eq!(ds.rows[1][4], Value::Float64(0.2));
        assert_eq!(ds.rows[2][4], Value::Null);
        assert_eq!(
            report,
            DerivationReport {
                postal_codes_filled: 2,
                non_numeric_nulled: 1,
                margins_computed: 1,
                discounts_clamped: 2,
            }
        );
        assert_eq!(obs.warnings().len(), 3);
    }
}
