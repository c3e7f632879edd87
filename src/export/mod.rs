//! Writers for the cleaned dataset.
//!
//! Both writers go through [`write_atomically`]: output is written to a hidden temporary sibling
//! and renamed into place, so an output path never holds a half-written file.

pub mod csv;
pub mod parquet;

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::{PipelineResult, Stage};
use crate::observability::{Diagnostic, PipelineObserver, StageStats};
use crate::types::{DataSet, DataType, Field, Schema, Value};

pub use self::csv::write_csv;
pub use self::parquet::write_parquet;

/// Write `ds` to `csv_path` and `parquet_path`.
pub fn export_dataset(
    ds: &DataSet,
    csv_path: &Path,
    parquet_path: &Path,
    observer: &dyn PipelineObserver,
) -> PipelineResult<()> {
    write_csv(ds, csv_path)?;
    observer.on_diagnostic(
        &Diagnostic::info(Stage::Export, format!("wrote {}", csv_path.display()))
            .with_rows(ds.row_count()),
    );

    write_parquet(ds, parquet_path)?;
    observer.on_diagnostic(
        &Diagnostic::info(Stage::Export, format!("wrote {}", parquet_path.display()))
            .with_rows(ds.row_count()),
    );

    observer.on_stage_finished(
        Stage::Export,
        StageStats {
            rows_in: ds.row_count(),
            rows_out: ds.row_count(),
        },
    );
    Ok(())
}

/// The schema the dataset is exported with.
///
/// Typed columns keep their type. A [`DataType::Mixed`] column is narrowed to the single type all
/// of its non-null values share (integers widen to floats when mixed with floats); anything else
/// is exported as text.
pub fn resolved_schema(ds: &DataSet) -> Schema {
    let fields = ds
        .schema
        .fields
        .iter()
        .enumerate()
        .map(|(idx, f)| {
            let data_type = match f.data_type {
                DataType::Mixed => narrow_mixed(ds.rows.iter().map(|r| &r[idx])),
                other => other,
            };
            Field::new(f.name.clone(), data_type)
        })
        .collect();
    Schema::new(fields)
}

fn narrow_mixed<'a>(values: impl Iterator<Item = &'a Value>) -> DataType {
    let mut seen: Option<DataType> = None;
    for v in values {
        let t = match v {
            Value::Null => continue,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::Bool(_) => DataType::Bool,
            Value::Utf8(_) => DataType::Utf8,
            Value::Date(_) => DataType::Date,
        };
        seen = Some(match (seen, t) {
            (None, t) => t,
            (Some(a), b) if a == b => a,
            (Some(DataType::Int64), DataType::Float64) | (Some(DataType::Float64), DataType::Int64) => {
                DataType::Float64
            }
            _ => return DataType::Utf8,
        });
    }
    seen.unwrap_or(DataType::Utf8)
}

/// Hidden temporary sibling of `path` (`dir/.name.tmp`).
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Create `path` by writing a temporary sibling and renaming it into place.
///
/// Parent directories are created. On any error the temporary file is removed and `path` is left
/// as it was.
pub fn write_atomically<F>(path: &Path, write: F) -> PipelineResult<()>
where
    F: FnOnce(&mut File) -> PipelineResult<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    let result = File::create(&tmp)
        .map_err(Into::into)
        .and_then(|mut file| {
            write(&mut file)?;
            file.sync_all()?;
            Ok(())
        })
        .and_then(|()| fs::rename(&tmp, path).map_err(Into::into));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
