//! Type coercion for the merged record set: date columns and categorical columns.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::Stage;
use crate::observability::{Diagnostic, PipelineObserver};
use crate::types::{DataSet, DataType, Value};

/// Columns holding dates after the merge.
pub const DATE_COLUMNS: [&str; 2] = ["order_date", "ship_date"];

/// Low-cardinality text columns converted to [`DataType::Categorical`] when present.
pub const CATEGORICAL_COLUMNS: [&str; 9] = [
    "ship_mode",
    "segment",
    "country",
    "region",
    "market",
    "category",
    "sub_category",
    "order_priority",
    "returned",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%d-%b-%Y",
    "%m/%d/%y",
    "%m-%d-%y",
    "%d.%m.%y",
    "%d-%b-%y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%y %H:%M",
];

/// `%Y` accepts any digit count, so "1/5/16" would otherwise match as year 1 or 16.
fn four_digit_year(d: NaiveDate) -> Option<NaiveDate> {
    (1000..=9999).contains(&d.year()).then_some(d)
}

fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

/// Convert a spreadsheet day serial to a calendar date (epoch 1899-12-30).
///
/// Fractional days (time of day) are discarded. Returns `None` for non-finite or out-of-range
/// serials.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let days = serial.floor();
    if days.abs() > 3_000_000.0 {
        return None;
    }
    let days = days as i64;
    if days >= 0 {
        serial_epoch().checked_add_days(Days::new(days as u64))
    } else {
        serial_epoch().checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

/// Parse date text in one of the common spreadsheet renderings. Surrounding whitespace is
/// ignored; a time-of-day component is dropped. Two-digit years follow chrono's `%y` pivot
/// (00-68 is 20xx). An RFC 3339 timestamp keeps its local calendar date.
pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok().and_then(four_digit_year))
        .or_else(|| {
            DATETIME_FORMATS.iter().find_map(|fmt| {
                NaiveDateTime::parse_from_str(s, fmt)
                    .ok()
                    .and_then(|dt| four_digit_year(dt.date()))
            })
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// Classification of a non-null cell in a date column.
#[derive(Debug, Clone, PartialEq)]
pub enum DateCell<'a> {
    /// The loader already produced a date.
    AlreadyDate(NaiveDate),
    /// A spreadsheet day serial.
    NumericSerial(f64),
    /// Free text that may hold a date.
    Text(&'a str),
    /// Anything else (for example a boolean).
    Unrecognized,
}

impl<'a> DateCell<'a> {
    /// Classify a cell. `None` for null cells, which stay null.
    pub fn classify(v: &'a Value) -> Option<Self> {
        Some(match v {
            Value::Null => return None,
            Value::Date(d) => DateCell::AlreadyDate(*d),
            Value::Int64(i) => DateCell::NumericSerial(*i as f64),
            Value::Float64(f) => DateCell::NumericSerial(*f),
            Value::Utf8(s) => DateCell::Text(s),
            Value::Bool(_) => DateCell::Unrecognized,
        })
    }

    /// Resolve to a date; `None` means the cell becomes null.
    pub fn resolve(&self) -> Option<NaiveDate> {
        match self {
            DateCell::AlreadyDate(d) => Some(*d),
            DateCell::NumericSerial(n) => serial_to_date(*n),
            DateCell::Text(s) => parse_date_text(s),
            DateCell::Unrecognized => None,
        }
    }
}

/// Counts produced by [`coerce_types`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoercionReport {
    pub serial_dates_converted: usize,
    pub text_dates_parsed: usize,
    /// Text cells that did not parse as a date and were nulled.
    pub unparseable_dates: usize,
    /// Cells of an unexpected kind that were nulled.
    pub unrecognized_dates: usize,
    pub categorical_columns: Vec<String>,
}

/// Coerce date columns, then convert categorical columns.
pub fn coerce_types(ds: &mut DataSet, observer: &dyn PipelineObserver) -> CoercionReport {
    let mut report = CoercionReport::default();
    for column in DATE_COLUMNS {
        coerce_date_column(ds, column, &mut report, observer);
    }
    report.categorical_columns = categorize(ds);
    if !report.categorical_columns.is_empty() {
        observer.on_diagnostic(&Diagnostic::info(
            Stage::Coerce,
            format!("categorical columns: {}", report.categorical_columns.join(", ")),
        ));
    }
    report
}

/// Coerce one date column in place. A column already typed as [`DataType::Date`] is left as is.
fn coerce_date_column(
    ds: &mut DataSet,
    column: &str,
    report: &mut CoercionReport,
    observer: &dyn PipelineObserver,
) {
    let Some(idx) = ds.schema.index_of(column) else {
        return;
    };
    if ds.schema.fields[idx].data_type == DataType::Date {
        return;
    }

    let (mut unparseable, mut unrecognized) = (0usize, 0usize);
    for row in &mut ds.rows {
        let Some(cell) = DateCell::classify(&row[idx]) else {
            continue;
        };
        let resolved = cell.resolve();
        match (&cell, resolved) {
            (DateCell::NumericSerial(_), Some(_)) => report.serial_dates_converted += 1,
            (DateCell::Text(_), Some(_)) => report.text_dates_parsed += 1,
            (DateCell::Text(_), None) => unparseable += 1,
            (DateCell::NumericSerial(_) | DateCell::Unrecognized, None) => unrecognized += 1,
            _ => {}
        }
        row[idx] = resolved.map(Value::Date).unwrap_or(Value::Null);
    }
    ds.schema.fields[idx].data_type = DataType::Date;

    report.unparseable_dates += unparseable;
    report.unrecognized_dates += unrecognized;
    if unparseable > 0 {
        observer.on_diagnostic(&Diagnostic::warning(
            Stage::Coerce,
            format!("unparseable text in '{column}' set to null"),
            unparseable,
        ));
    }
    if unrecognized > 0 {
        observer.on_diagnostic(&Diagnostic::warning(
            Stage::Coerce,
            format!("unexpected value type in '{column}' set to null"),
            unrecognized,
        ));
    }
}

/// Convert every present categorical column; returns the converted column names.
pub fn categorize(ds: &mut DataSet) -> Vec<String> {
    let mut converted = Vec::new();
    for column in CATEGORICAL_COLUMNS {
        let Some(idx) = ds.schema.index_of(column) else {
            continue;
        };
        for row in &mut ds.rows {
            if !matches!(row[idx], Value::Null | Value::Utf8(_)) {
                row[idx] = Value::Utf8(row[idx].to_text());
            }
        }
        ds.schema.fields[idx].data_type = DataType::Categorical;
        converted.push(column.to_string());
    }
    converted
}
