//! Unified read-back entrypoint for exported files.
//!
//! [`ingest_from_path`] reads a CSV or Parquet file into a [`crate::types::DataSet`] using a
//! provided [`crate::types::Schema`]. If [`IngestionOptions::format`] is `None`, the format is
//! inferred from the file extension.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult, Stage};
use crate::observability::{severity_for_error, Diagnostic, PipelineObserver, Severity};
use crate::types::{DataSet, Schema};

use super::{csv, parquet};

/// Supported read-back formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionFormat {
    /// Comma-separated values.
    Csv,
    /// Apache Parquet.
    Parquet,
}

impl IngestionFormat {
    /// Parse an ingestion format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "parquet" | "pq" => Some(Self::Parquet),
            _ => None,
        }
    }
}

/// Options controlling read-back behavior.
#[derive(Clone)]
pub struct IngestionOptions {
    /// If `None`, auto-detect format from file extension.
    pub format: Option<IngestionFormat>,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn PipelineObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: Severity,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("format", &self.format)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            format: None,
            observer: None,
            alert_at_or_above: Severity::Critical,
        }
    }
}

/// Read an exported file back into memory.
///
/// When an observer is configured, this function reports an info diagnostic with the row count on
/// success, and `on_failure` (plus `on_alert` at or above the threshold) on failure.
///
/// ```no_run
/// use retail_etl::ingestion::{ingest_from_path, IngestionOptions};
/// use retail_etl::types::{DataType, Field, Schema};
///
/// # fn main() -> Result<(), retail_etl::PipelineError> {
/// let schema = Schema::new(vec![
///     Field::new("order_id", DataType::Utf8),
///     Field::new("sales", DataType::Float64),
/// ]);
/// let ds = ingest_from_path("cleaned_orders.parquet", &schema, &IngestionOptions::default())?;
/// println!("rows={}", ds.row_count());
/// # Ok(())
/// # }
/// ```
pub fn ingest_from_path(
    path: impl AsRef<Path>,
    schema: &Schema,
    options: &IngestionOptions,
) -> PipelineResult<DataSet> {
    let path = path.as_ref();
    let result = match options.format {
        Some(f) => Ok(f),
        None => infer_format_from_path(path),
    }
    .and_then(|fmt| match fmt {
        IngestionFormat::Csv => csv::ingest_csv_from_path(path, schema),
        IngestionFormat::Parquet => parquet::ingest_parquet_from_path(path, schema),
    });

    if let Some(obs) = options.observer.as_ref() {
        match &result {
            Ok(ds) => obs.on_diagnostic(
                &Diagnostic::info(Stage::Export, format!("read back {}", path.display()))
                    .with_rows(ds.row_count()),
            ),
            Err(e) => {
                let sev = severity_for_error(e);
                obs.on_failure(Stage::Export, sev, e);
                if sev >= options.alert_at_or_above {
                    obs.on_alert(Stage::Export, sev, e);
                }
            }
        }
    }

    result
}

fn infer_format_from_path(path: &Path) -> PipelineResult<IngestionFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PipelineError::SchemaMismatch {
            message: format!(
                "cannot infer format: path has no extension ({})",
                path.display()
            ),
        })?;

    IngestionFormat::from_extension(ext).ok_or_else(|| PipelineError::SchemaMismatch {
        message: format!(
            "cannot infer format from extension '{ext}' for path ({})",
            path.display()
        ),
    })
}
