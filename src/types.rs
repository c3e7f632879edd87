//! Core data model types.
//!
//! Every table handled by the pipeline (raw sheets, the merged record set, read-back exports) is an
//! in-memory [`DataSet`]: a [`Schema`] (a list of typed [`Field`]s) plus row-major [`Value`]s.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Calendar date (no time component).
    Date,
    /// Low-cardinality UTF-8 string; stored as [`Value::Utf8`], dictionary-encoded on export.
    Categorical,
    /// Loosely-typed column straight from a sheet: each cell keeps whatever variant it was read as.
    Mixed,
}

impl DataType {
    /// True for the two text-backed types.
    pub fn is_text(self) -> bool {
        matches!(self, DataType::Utf8 | DataType::Categorical)
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A list of fields describing the shape of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// True if a field with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }
}

/// A single typed value in a [`DataSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Calendar date.
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the string payload of a [`Value::Utf8`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view of the value.
    ///
    /// Integers and floats convert directly; text is parsed after trimming. Booleans, dates and
    /// non-finite results are not numeric.
    pub fn to_f64(&self) -> Option<f64> {
        let v = match self {
            Value::Int64(i) => *i as f64,
            Value::Float64(f) => *f,
            Value::Utf8(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        v.is_finite().then_some(v)
    }

    /// Text rendering used for text columns and CSV output. `Null` renders as an empty string.
    ///
    /// Integral floats render without a fractional part so spreadsheet numbers like `10024.0`
    /// become `10024`.
    pub fn to_text(&self) -> String {
        match self {
            Value::Float64(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Utf8(v) => f.write_str(v),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Hashable, comparable view over a value, used as a join / dedup key.
///
/// Floats compare by bit pattern so the key is `Eq`. `Null` keys are equal to each other, which
/// is what full-row deduplication wants; joins skip null keys before building a key.
#[derive(Debug, Clone, Copy)]
pub struct ValueKey<'a>(pub &'a Value);

impl PartialEq for ValueKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl Eq for ValueKey<'_> {}

impl Hash for ValueKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self.0).hash(state);
        match self.0 {
            Value::Null => {}
            Value::Int64(v) => v.hash(state),
            Value::Float64(v) => v.to_bits().hash(state),
            Value::Bool(v) => v.hash(state),
            Value::Utf8(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
        }
    }
}

/// Hashable view over a whole row.
#[derive(Debug, Clone, Copy)]
pub struct RowKey<'a>(pub &'a [Value]);

impl PartialEq for RowKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| ValueKey(a) == ValueKey(b))
    }
}

impl Eq for RowKey<'_> {}

impl Hash for RowKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for v in self.0 {
            ValueKey(v).hash(state);
        }
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.schema.field_names().map(str::to_owned).collect()
    }

    /// Iterate the values of one column, or `None` if the column does not exist.
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + use<'a>> {
        let idx = self.schema.index_of(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Keep only rows for which `predicate` returns `true`; returns the number of rows removed.
    pub fn retain_rows<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&[Value]) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|row| predicate(row.as_slice()));
        before - self.rows.len()
    }

    /// Append a column. Every row receives the value produced by `fill` for that row.
    pub fn push_column<F>(&mut self, field: Field, mut fill: F)
    where
        F: FnMut(&[Value]) -> Value,
    {
        for row in &mut self.rows {
            let v = fill(row.as_slice());
            row.push(v);
        }
        self.schema.fields.push(field);
    }

    /// Remove a column if present.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.schema.index_of(name) else {
            return false;
        };
        self.schema.fields.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        true
    }

    /// Index of `name`, appending an all-null column of `data_type` first if it does not exist.
    pub fn ensure_column(&mut self, name: &str, data_type: DataType) -> usize {
        match self.schema.index_of(name) {
            Some(idx) => idx,
            None => {
                self.push_column(Field::new(name, data_type), |_| Value::Null);
                self.schema.fields.len() - 1
            }
        }
    }
}
