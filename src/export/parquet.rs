//! Parquet export.
//!
//! Every column is `OPTIONAL`. Text and categorical columns are `BYTE_ARRAY` annotated as UTF8,
//! with dictionary encoding enabled only for categoricals; dates are `INT32` annotated as `DATE`.
//! All rows go into a single row group.
//!
//! The file also carries an `ARROW:schema` entry in which categorical columns are
//! `Dictionary(Int32, Utf8)`, so Arrow-based readers (Polars, pyarrow) load them as categoricals.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow_schema::{DataType as ArrowType, Field as ArrowField, Schema as ArrowSchema};
use chrono::NaiveDate;
use parquet::arrow::add_encoded_arrow_schema_to_metadata;
use parquet::basic::{ConvertedType, LogicalType, Repetition, Type as PhysicalType};
use parquet::column::writer::ColumnWriter;
use parquet::data_type::ByteArray;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::{ColumnPath, Type, TypePtr};

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, DataType, Schema, Value};

use super::{resolved_schema, write_atomically};

/// Write `ds` as Parquet to `path`, atomically.
pub fn write_parquet(ds: &DataSet, path: impl AsRef<Path>) -> PipelineResult<()> {
    let schema = resolved_schema(ds);
    let parquet_schema = Arc::new(message_type(&schema)?);
    let mut props = writer_properties(&schema);
    add_encoded_arrow_schema_to_metadata(&arrow_schema(&schema), &mut props);
    let props = Arc::new(props);

    write_atomically(path.as_ref(), |file| write_row_group(file, ds, &schema, parquet_schema, props))
}

fn message_type(schema: &Schema) -> PipelineResult<Type> {
    let fields = schema
        .fields
        .iter()
        .map(|f| column_type(&f.name, f.data_type).map(Arc::new))
        .collect::<PipelineResult<Vec<TypePtr>>>()?;
    Ok(Type::group_type_builder("schema").with_fields(fields).build()?)
}

fn column_type(name: &str, data_type: DataType) -> PipelineResult<Type> {
    let builder = match data_type {
        DataType::Int64 => Type::primitive_type_builder(name, PhysicalType::INT64),
        DataType::Float64 => Type::primitive_type_builder(name, PhysicalType::DOUBLE),
        DataType::Bool => Type::primitive_type_builder(name, PhysicalType::BOOLEAN),
        DataType::Date => Type::primitive_type_builder(name, PhysicalType::INT32)
            .with_converted_type(ConvertedType::DATE)
            .with_logical_type(Some(LogicalType::Date)),
        DataType::Utf8 | DataType::Categorical | DataType::Mixed => {
            Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
                .with_converted_type(ConvertedType::UTF8)
                .with_logical_type(Some(LogicalType::String))
        }
    };
    Ok(builder.with_repetition(Repetition::OPTIONAL).build()?)
}

fn arrow_schema(schema: &Schema) -> ArrowSchema {
    let fields: Vec<ArrowField> = schema
        .fields
        .iter()
        .map(|f| {
            let data_type = match f.data_type {
                DataType::Int64 => ArrowType::Int64,
                DataType::Float64 => ArrowType::Float64,
                DataType::Bool => ArrowType::Boolean,
                DataType::Date => ArrowType::Date32,
                DataType::Categorical => {
                    ArrowType::Dictionary(Box::new(ArrowType::Int32), Box::new(ArrowType::Utf8))
                }
                DataType::Utf8 | DataType::Mixed => ArrowType::Utf8,
            };
            ArrowField::new(f.name.as_str(), data_type, true)
        })
        .collect();
    ArrowSchema::new(fields)
}

fn writer_properties(schema: &Schema) -> WriterProperties {
    schema
        .fields
        .iter()
        .filter(|f| f.data_type == DataType::Categorical)
        .fold(
            WriterProperties::builder().set_dictionary_enabled(false),
            |b, f| b.set_column_dictionary_enabled(ColumnPath::from(f.name.as_str()), true),
        )
        .build()
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Non-null values of one column plus their definition levels (1 = present, 0 = null).
struct Levels<T> {
    values: Vec<T>,
    defs: Vec<i16>,
}

impl<T> Levels<T> {
    fn collect<'a>(
        column: impl Iterator<Item = &'a Value>,
        mut convert: impl FnMut(&'a Value) -> PipelineResult<Option<T>>,
    ) -> PipelineResult<Self> {
        let mut out = Levels {
            values: Vec::new(),
            defs: Vec::new(),
        };
        for v in column {
            match convert(v)? {
                Some(t) => {
                    out.values.push(t);
                    out.defs.push(1);
                }
                None => out.defs.push(0),
            }
        }
        Ok(out)
    }
}

fn write_row_group(
    file: &mut File,
    ds: &DataSet,
    schema: &Schema,
    parquet_schema: TypePtr,
    props: Arc<WriterProperties>,
) -> PipelineResult<()> {
    let mut writer = SerializedFileWriter::new(file, parquet_schema, props)?;
    let mut rg = writer.next_row_group()?;
    let mut col_idx = 0usize;

    while let Some(mut col) = rg.next_column()? {
        let field = &schema.fields[col_idx];
        let values = ds.rows.iter().map(|r| &r[col_idx]);
        let mismatch = |v: &Value, expected: &str| PipelineError::SchemaMismatch {
            message: format!("column '{}': expected {expected}, found {v:?}", field.name),
        };

        match col.untyped() {
            ColumnWriter::Int64ColumnWriter(w) => {
                let l = Levels::collect(values, |v| match v {
                    Value::Null => Ok(None),
                    Value::Int64(i) => Ok(Some(*i)),
                    other => Err(mismatch(other, "integer")),
                })?;
                w.write_batch(&l.values, Some(&l.defs), None)?;
            }
            ColumnWriter::DoubleColumnWriter(w) => {
                let l = Levels::collect(values, |v| Ok(v.to_f64()))?;
                w.write_batch(&l.values, Some(&l.defs), None)?;
            }
            ColumnWriter::BoolColumnWriter(w) => {
                let l = Levels::collect(values, |v| match v {
                    Value::Null => Ok(None),
                    Value::Bool(b) => Ok(Some(*b)),
                    other => Err(mismatch(other, "bool")),
                })?;
                w.write_batch(&l.values, Some(&l.defs), None)?;
            }
            ColumnWriter::Int32ColumnWriter(w) => {
                let epoch = unix_epoch();
                let l = Levels::collect(values, |v| match v {
                    Value::Null => Ok(None),
                    Value::Date(d) => i32::try_from(d.signed_duration_since(epoch).num_days())
                        .map(Some)
                        .map_err(|_| mismatch(v, "date within i32 days")),
                    other => Err(mismatch(other, "date")),
                })?;
                w.write_batch(&l.values, Some(&l.defs), None)?;
            }
            ColumnWriter::ByteArrayColumnWriter(w) => {
                let l = Levels::collect(values, |v| {
                    Ok((!v.is_null()).then(|| ByteArray::from(v.to_text().as_str())))
                })?;
                w.write_batch(&l.values, Some(&l.defs), None)?;
            }
            _ => {
                return Err(PipelineError::SchemaMismatch {
                    message: format!("column '{}': unsupported parquet column writer", field.name),
                });
            }
        }
        col.close()?;
        col_idx += 1;
    }
    rg.close()?;
    writer.close()?;
    Ok(())
}
