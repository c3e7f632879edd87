use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type returned by loading, cleaning, export and warehouse functions.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configured source file does not exist.
    #[error("source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// The workbook could not be read (or the untyped retry after a coercion failure failed too).
    #[error("load error: {message}")]
    Load { message: String },

    /// Underlying I/O error (e.g. permission denied, rename failure).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Workbook reader error.
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV reader/writer error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Parquet reader/writer error.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Embedded SQL engine error (feature-gated behind `sql`).
    #[cfg(feature = "sql")]
    #[error("sql engine error: {0}")]
    Sql(#[from] polars::prelude::PolarsError),

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Quality report could not be serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("config error: {message}")]
    Config { message: String },

    /// The input does not have the expected shape (missing sheet, no header row, ...).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A table lacks columns that a join or query cannot proceed without.
    #[error("table '{table}' is missing required column(s): {}", columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    /// A value could not be parsed into the required [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },
}

impl PipelineError {
    pub(crate) fn missing_columns(table: &str, columns: &[&str]) -> Self {
        Self::MissingColumns {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Pipeline stages, used to attribute diagnostics and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Normalize,
    Validate,
    Merge,
    Coerce,
    Derive,
    Export,
    WarehouseLoad,
    Transform,
    Report,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Normalize => "normalize",
            Stage::Validate => "validate",
            Stage::Merge => "merge",
            Stage::Coerce => "coerce",
            Stage::Derive => "derive",
            Stage::Export => "export",
            Stage::WarehouseLoad => "warehouse-load",
            Stage::Transform => "transform",
            Stage::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal error tagged with the stage that raised it.
///
/// Top-level run functions return this so the operator can see where a run stopped.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: PipelineError) -> Self {
        Self { stage, error }
    }
}
