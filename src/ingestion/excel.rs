//! Sheet-level workbook reading.
//!
//! Sheets are read into untyped [`DataSet`]s: every column is [`DataType::Mixed`] and each cell
//! keeps the variant the workbook stored it as. Typing happens afterwards (see
//! [`super::workbook`]).

use std::io::{Read, Seek};

use calamine::{Data, Reader, Sheets};

use crate::cleaning::coerce::serial_to_date;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, DataType, Field, Schema, Value};

/// How spreadsheet date cells are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCells {
    /// Date-formatted cells become [`Value::Date`].
    Parse,
    /// Date-formatted cells keep their underlying day serial as [`Value::Float64`].
    Serial,
}

/// Read one sheet into an untyped [`DataSet`].
///
/// Behavior:
/// - Detects the first non-empty row as the header row
/// - Header cells are trimmed; blank headers become `column_<n>` (1-based)
/// - Every following row becomes a data row, padded with nulls to the header width
/// - Rows that are entirely empty are skipped
pub fn read_sheet<RS: Read + Seek>(
    workbook: &mut Sheets<RS>,
    sheet: &str,
    dates: DateCells,
) -> PipelineResult<DataSet> {
    let range = workbook.worksheet_range(sheet).map_err(|e| {
        if workbook.sheet_names().iter().any(|s| s == sheet) {
            PipelineError::Excel(e)
        } else {
            PipelineError::SchemaMismatch {
                message: format!(
                    "sheet '{sheet}' not found. sheets={:?}",
                    workbook.sheet_names()
                ),
            }
        }
    })?;
    read_range(sheet, &range, dates)
}

fn read_range(sheet: &str, range: &calamine::Range<Data>, dates: DateCells) -> PipelineResult<DataSet> {
    let mut rows_iter = range.rows().skip_while(|row| row.iter().all(|c| matches!(c, Data::Empty)));

    let header = rows_iter.next().ok_or_else(|| PipelineError::SchemaMismatch {
        message: format!("sheet '{sheet}': sheet has no non-empty rows (no header row found)"),
    })?;

    let fields: Vec<Field> = header
        .iter()
        .enumerate()
        .map(|(idx, c)| {
            let name = cell_to_header_string(c).trim().to_string();
            let name = if name.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                name
            };
            Field::new(name, DataType::Mixed)
        })
        .collect();
    let width = fields.len();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for row in rows_iter {
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        let mut out: Vec<Value> = row.iter().take(width).map(|c| cell_to_value(c, dates)).collect();
        out.resize(width, Value::Null);
        rows.push(out);
    }

    Ok(DataSet::new(Schema::new(fields), rows))
}

fn cell_to_header_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => String::new(),
    }
}

/// Convert a cell without any type expectation.
///
/// Spreadsheet error cells (`#N/A`, `#DIV/0!`, ...) are treated as missing.
pub(crate) fn cell_to_value(c: &Data, dates: DateCells) -> Value {
    match c {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) => Value::Utf8(s.clone()),
        Data::Int(i) => Value::Int64(*i),
        Data::Float(f) => Value::Float64(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            if dates == DateCells::Parse && !dt.is_duration() {
                if let Some(d) = serial_to_date(serial) {
                    return Value::Date(d);
                }
            }
            Value::Float64(serial)
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Utf8(s.clone()),
    }
}
