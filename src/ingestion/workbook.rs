//! Workbook loader: reads the orders, returns and people sheets.
//!
//! The orders sheet is read with per-column type hints. If any hinted column cannot be coerced,
//! the whole workbook is read again once without hints (and without date parsing) and the
//! cleaning stages take over the typing.

use std::path::{Path, PathBuf};

use calamine::open_workbook_auto;

use crate::cleaning::coerce::parse_date_text;
use crate::cleaning::normalize::normalize_column_name;
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::observability::{Diagnostic, PipelineObserver, Severity, StageStats};
use crate::types::{DataSet, DataType, Value};

use super::excel::{read_sheet, DateCells};

/// Declared storage type for a hinted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    /// Integer that must fit in 32 bits. Nulls are a coercion failure.
    Int32,
    /// Integer that must fit in 16 bits. Nulls are a coercion failure.
    Int16,
    /// Number narrowed to single precision.
    Float32,
    /// Any cell rendered as text.
    Text,
    /// Date cell or parseable date text.
    Date,
}

impl TypeHint {
    fn data_type(self) -> DataType {
        match self {
            TypeHint::Int32 | TypeHint::Int16 => DataType::Int64,
            TypeHint::Float32 => DataType::Float64,
            TypeHint::Text => DataType::Utf8,
            TypeHint::Date => DataType::Date,
        }
    }
}

/// A type hint for one source column (matched after identifier normalization).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnHint {
    pub column: String,
    pub hint: TypeHint,
}

impl ColumnHint {
    pub fn new(column: impl Into<String>, hint: TypeHint) -> Self {
        Self {
            column: column.into(),
            hint,
        }
    }
}

/// Sheet names of the three source tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetNames {
    pub orders: String,
    pub returns: String,
    pub people: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            orders: "Orders".to_string(),
            returns: "Returns".to_string(),
            people: "People".to_string(),
        }
    }
}

/// Options controlling workbook loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub sheets: SheetNames,
    pub order_hints: Vec<ColumnHint>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            sheets: SheetNames::default(),
            order_hints: default_order_hints(),
        }
    }
}

/// Hints for the standard orders sheet.
pub fn default_order_hints() -> Vec<ColumnHint> {
    vec![
        ColumnHint::new("Row ID", TypeHint::Int32),
        ColumnHint::new("Postal Code", TypeHint::Text),
        ColumnHint::new("Sales", TypeHint::Float32),
        ColumnHint::new("Quantity", TypeHint::Int16),
        ColumnHint::new("Discount", TypeHint::Float32),
        ColumnHint::new("Profit", TypeHint::Float32),
        ColumnHint::new("Shipping Cost", TypeHint::Float32),
        ColumnHint::new("Order Date", TypeHint::Date),
        ColumnHint::new("Ship Date", TypeHint::Date),
    ]
}

/// The three source tables as read from the workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTables {
    pub orders: DataSet,
    pub returns: DataSet,
    pub people: DataSet,
    /// `false` when the untyped retry produced these tables.
    pub hinted: bool,
}

/// Load the orders, returns and people sheets from `path`.
///
/// - Missing `path` → [`PipelineError::SourceNotFound`]
/// - A hinted column fails to coerce → a warning is reported and the workbook is read again
///   without hints; if that fails too → [`PipelineError::Load`]
/// - Any other read failure (unreadable file, missing sheet) → [`PipelineError::Load`], no retry
pub fn load_workbook(
    path: impl AsRef<Path>,
    options: &LoadOptions,
    observer: &dyn PipelineObserver,
) -> PipelineResult<RawTables> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PipelineError::SourceNotFound {
            path: PathBuf::from(path),
        });
    }

    observer.on_diagnostic(&Diagnostic::info(
        Stage::Load,
        format!("loading workbook {}", path.display()),
    ));

    let tables = match load_hinted(path, options) {
        Ok(tables) => tables,
        Err(first @ PipelineError::ParseError { .. }) => {
            observer.on_diagnostic(&Diagnostic::new(
                Stage::Load,
                Severity::Warning,
                format!("typed sheet load failed: {first}. retrying without type hints"),
            ));
            load_untyped(path, &options.sheets).map_err(|second| PipelineError::Load {
                message: format!("typed read failed ({first}); untyped retry failed ({second})"),
            })?
        }
        Err(other) => {
            return Err(PipelineError::Load {
                message: other.to_string(),
            });
        }
    };

    for (sheet, ds) in [
        (&options.sheets.orders, &tables.orders),
        (&options.sheets.returns, &tables.returns),
        (&options.sheets.people, &tables.people),
    ] {
        observer.on_diagnostic(
            &Diagnostic::info(Stage::Load, format!("sheet '{sheet}' loaded")).with_rows(ds.row_count()),
        );
    }
    let rows = tables.orders.row_count();
    observer.on_stage_finished(Stage::Load, StageStats { rows_in: rows, rows_out: rows });

    Ok(tables)
}

fn load_hinted(path: &Path, options: &LoadOptions) -> PipelineResult<RawTables> {
    let mut workbook = open_workbook_auto(path)?;
    let mut orders = read_sheet(&mut workbook, &options.sheets.orders, DateCells::Parse)?;
    apply_hints(&mut orders, &options.order_hints)?;
    let returns = read_sheet(&mut workbook, &options.sheets.returns, DateCells::Parse)?;
    let people = read_sheet(&mut workbook, &options.sheets.people, DateCells::Parse)?;
    Ok(RawTables {
        orders,
        returns,
        people,
        hinted: true,
    })
}

fn load_untyped(path: &Path, sheets: &SheetNames) -> PipelineResult<RawTables> {
    let mut workbook = open_workbook_auto(path)?;
    Ok(RawTables {
        orders: read_sheet(&mut workbook, &sheets.orders, DateCells::Serial)?,
        returns: read_sheet(&mut workbook, &sheets.returns, DateCells::Serial)?,
        people: read_sheet(&mut workbook, &sheets.people, DateCells::Serial)?,
        hinted: false,
    })
}

/// Coerce hinted columns in place. Columns named by a hint but absent from `ds` are ignored.
pub fn apply_hints(ds: &mut DataSet, hints: &[ColumnHint]) -> PipelineResult<()> {
    for hint in hints {
        let wanted = normalize_column_name(&hint.column);
        let Some(idx) = ds
            .schema
            .fields
            .iter()
            .position(|f| normalize_column_name(&f.name) == wanted)
        else {
            continue;
        };
        let column = ds.schema.fields[idx].name.clone();

        for (idx0, row) in ds.rows.iter_mut().enumerate() {
            // 1-based, plus the header row.
            let user_row = idx0 + 2;
            let coerced = coerce_hinted(&row[idx], hint.hint).map_err(|message| {
                PipelineError::ParseError {
                    row: user_row,
                    column: column.clone(),
                    raw: row[idx].to_string(),
                    message,
                }
            })?;
            row[idx] = coerced;
        }
        ds.schema.fields[idx].data_type = hint.hint.data_type();
    }
    Ok(())
}

fn coerce_hinted(v: &Value, hint: TypeHint) -> Result<Value, String> {
    match hint {
        TypeHint::Int32 => coerce_int(v, i64::from(i32::MIN), i64::from(i32::MAX)),
        TypeHint::Int16 => coerce_int(v, i64::from(i16::MIN), i64::from(i16::MAX)),
        TypeHint::Float32 => match v {
            Value::Null => Ok(Value::Null),
            Value::Int64(_) | Value::Float64(_) | Value::Utf8(_) => v
                .to_f64()
                .map(|f| Value::Float64(f64::from(f as f32)))
                .ok_or_else(|| "expected number".to_string()),
            _ => Err("expected number".to_string()),
        },
        TypeHint::Text => Ok(match v {
            Value::Null => Value::Null,
            Value::Utf8(s) => Value::Utf8(s.clone()),
            other => Value::Utf8(other.to_text()),
        }),
        TypeHint::Date => match v {
            Value::Null | Value::Date(_) => Ok(v.clone()),
            Value::Utf8(s) if s.trim().is_empty() => Ok(Value::Null),
            Value::Utf8(s) => parse_date_text(s)
                .map(Value::Date)
                .ok_or_else(|| "unrecognized date text".to_string()),
            _ => Err("expected date".to_string()),
        },
    }
}

fn coerce_int(v: &Value, min: i64, max: i64) -> Result<Value, String> {
    let n = match v {
        Value::Int64(i) => *i,
        Value::Float64(f) if f.fract() == 0.0 && f.is_finite() => *f as i64,
        Value::Float64(_) => return Err("expected integer (got non-integer float)".to_string()),
        Value::Utf8(s) => s.trim().parse::<i64>().map_err(|e| e.to_string())?,
        Value::Null => return Err("integer column cannot hold a missing value".to_string()),
        _ => return Err("expected integer".to_string()),
    };
    if n < min || n > max {
        return Err(format!("integer {n} out of range [{min}, {max}]"));
    }
    Ok(Value::Int64(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Schema};
    use chrono::NaiveDate;

    fn raw_orders(quantity: Value, order_date: Value) -> DataSet {
        DataSet::new(
            Schema::new(vec![
                Field::new("Row ID", DataType::Mixed),
                Field::new("Quantity", DataType::Mixed),
                Field::new("Sales", DataType::Mixed),
                Field::new("Postal Code", DataType::Mixed),
                Field::new("Order Date", DataType::Mixed),
            ]),
            vec![vec![
                Value::Float64(1.0),
                quantity,
                Value::Float64(0.1),
                Value::Float64(10024.0),
                order_date,
            ]],
        )
    }

    #[test]
    fn hints_type_the_orders_columns() {
        let date = NaiveDate::from_ymd_opt(2016, 3, 1).unwrap();
        let mut ds = raw_orders(Value::Int64(3), Value::Date(date));
        apply_hints(&mut ds, &default_order_hints()).unwrap();

        assert_eq!(ds.rows[0][0], Value::Int64(1));
        assert_eq!(ds.rows[0][1], Value::Int64(3));
        assert_eq!(ds.rows[0][2], Value::Float64(f64::from(0.1_f32)));
        assert_eq!(ds.rows[0][3], Value::Utf8("10024".to_string()));
        assert_eq!(ds.rows[0][4], Value::Date(date));
        assert_eq!(ds.schema.fields[3].data_type, DataType::Utf8);
        assert_eq!(ds.schema.fields[4].data_type, DataType::Date);
    }

    #[test]
    fn small_int_overflow_is_a_coercion_failure() {
        let mut ds = raw_orders(Value::Int64(70_000), Value::Null);
        let err = apply_hints(&mut ds, &default_order_hints()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("column 'Quantity'"));
        assert!(msg.contains("out of range"));
    }

    #[test]
    fn serial_number_in_date_column_is_a_coercion_failure() {
        let mut ds = raw_orders(Value::Int64(1), Value::Float64(42370.0));
        assert!(apply_hints(&mut ds, &default_order_hints()).is_err());
    }

    #[test]
    fn missing_integer_is_a_coercion_failure() {
        let mut ds = raw_orders(Value::Null, Value::Null);
        assert!(apply_hints(&mut ds, &default_order_hints()).is_err());
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let err = load_workbook(
            "definitely/not/here.xlsx",
            &LoadOptions::default(),
            &crate::observability::NoopObserver,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound { .. }));
    }
}
