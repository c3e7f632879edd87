//! `retail-etl` cleans a multi-sheet retail workbook (orders, returns, people) into one typed,
//! analytics-ready dataset, exports it as CSV and Parquet, and (with the `sql` feature) loads it
//! into an embedded SQL warehouse to build a star schema and BI extracts.
//!
//! The primary entrypoint is [`pipeline::run_pipeline`], which runs every cleaning stage in order
//! against a [`config::PipelineConfig`] and reports to an injected
//! [`observability::PipelineObserver`].
//!
//! ## Stages
//!
//! 1. **Load** ([`ingestion::load_workbook`]): the `Orders`, `Returns` and `People` sheets, with
//!    type hints for orders and one untyped retry
//! 2. **Normalize** ([`cleaning::normalize`]): column identifiers to `snake_case`
//! 3. **Validate** ([`cleaning::validate`]): duplicate rows, duplicate people regions, negative
//!    quantities, out-of-range discounts, missing order keys
//! 4. **Merge** ([`cleaning::merge`]): returns join with fan-out, Canada region split, people lookup
//! 5. **Coerce** ([`cleaning::coerce`]): date columns and categoricals
//! 6. **Derive** ([`cleaning::derive`]): postal codes, whitespace, rounding, profit margin,
//!    discount clamp
//! 7. **Export** ([`export`]): CSV and Parquet, written atomically
//!
//! Data-quality findings never abort a run; they are reported as
//! [`observability::Diagnostic`]s with an affected-row count. Fatal conditions surface as
//! [`StageFailure`], naming the stage that stopped the run.
//!
//! ## Example
//!
//! ```no_run
//! use retail_etl::config::PipelineConfig;
//! use retail_etl::observability::MemoryObserver;
//! use retail_etl::pipeline::{run_pipeline, RunOptions};
//!
//! # fn main() -> Result<(), retail_etl::StageFailure> {
//! let config = PipelineConfig::default();
//! let observer = MemoryObserver::new();
//! let summary = run_pipeline(&config, &observer, &RunOptions::default())?;
//! println!("rows={} warnings={}", summary.report.rows_out, observer.warnings().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Data model
//!
//! Tables are row-major [`types::DataSet`]s: a [`types::Schema`] plus `Vec<Vec<Value>>`. Columns
//! read straight from a sheet are [`types::DataType::Mixed`] until a stage types them.
//!
//! ## Modules
//!
//! - [`ingestion`]: workbook loading and CSV / Parquet read-back
//! - [`cleaning`]: the normalize → validate → merge → coerce → derive stages
//! - [`export`]: atomic CSV / Parquet writers
//! - [`pipeline`]: the end-to-end cleaning run
//! - [`config`]: TOML configuration
//! - [`observability`]: diagnostics, observers, severity
//! - `warehouse` (feature `sql`): Polars SQL star schema and BI extracts
//! - [`types`], [`error`]

pub mod cleaning;
pub mod config;
pub mod error;
pub mod export;
pub mod ingestion;
pub mod observability;
pub mod pipeline;
pub mod types;
#[cfg(feature = "sql")]
pub mod warehouse;

pub use error::{PipelineError, PipelineResult, Stage, StageFailure};
