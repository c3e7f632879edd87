//! Ingestion: the source workbook and read-back of exported files.
//!
//! - [`workbook`]: loads the orders / returns / people sheets with type hints and an untyped retry
//! - [`excel`]: sheet-level reading into untyped [`crate::types::DataSet`]s
//! - [`unified`]: [`ingest_from_path`] for reading CSV / Parquet exports back against a schema

pub mod csv;
pub mod excel;
pub mod parquet;
pub mod unified;
pub mod workbook;

pub use unified::{ingest_from_path, IngestionFormat, IngestionOptions};
pub use workbook::{load_workbook, ColumnHint, LoadOptions, RawTables, SheetNames, TypeHint};
