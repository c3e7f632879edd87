//! Embedded analytical store for the cleaned dataset (feature `sql`).
//!
//! A [`Warehouse`] is a directory holding one Parquet file per table. On [`Warehouse::connect`]
//! every `<table>.parquet` in the directory is registered with a Polars [`SQLContext`]; queries run
//! against that context. Tables created or replaced during a session live in memory until
//! [`Warehouse::commit`] writes them back, each atomically. Dropping a handle without committing
//! discards those changes.
//!
//! The three steps run on one handle:
//!
//! - [`load::load_cleaned`]: `raw_orders`, `raw_returns`, `raw_people` and quality checks
//! - [`transform::build_star_schema`]: dimension tables and `fact_sales`
//! - [`reports::export_reports`]: the six BI extracts

pub mod load;
pub mod reports;
pub mod transform;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use polars_sql::SQLContext;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult, Stage, StageFailure};
use crate::export::write_atomically;
use crate::observability::{Diagnostic, PipelineObserver};
use crate::pipeline::{fail, RunOptions};

pub use load::{load_cleaned, LoadReport, QualityCheck};
pub use reports::{export_reports, ReportOutput, REPORTS};
pub use transform::{build_star_schema, TransformReport};

const TABLE_EXTENSION: &str = "parquet";

/// Handle to a directory-backed set of tables.
pub struct Warehouse {
    dir: PathBuf,
    ctx: SQLContext,
    tables: BTreeMap<String, DataFrame>,
    uncommitted: BTreeSet<String>,
}

impl fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Warehouse")
            .field("dir", &self.dir)
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .field("uncommitted", &self.uncommitted)
            .finish()
    }
}

impl Warehouse {
    /// Open (creating if needed) the warehouse directory and register its tables.
    pub fn connect(dir: impl AsRef<Path>) -> PipelineResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut wh = Self {
            dir,
            ctx: SQLContext::new(),
            tables: BTreeMap::new(),
            uncommitted: BTreeSet::new(),
        };
        for entry in fs::read_dir(&wh.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TABLE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
                continue;
            };
            let df = read_parquet_frame(&path)?;
            wh.register(&name, df);
        }
        tracing::debug!(dir = %wh.dir.display(), tables = wh.tables.len(), "warehouse connected");
        Ok(wh)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of all registered tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table(&self, name: &str) -> Option<&DataFrame> {
        self.tables.get(name)
    }

    /// Column names of a registered table.
    pub fn columns(&self, name: &str) -> Option<Vec<String>> {
        self.tables.get(name).map(|df| {
            df.get_column_names()
                .into_iter()
                .map(|c| c.to_string())
                .collect()
        })
    }

    /// Run a query and collect the result.
    pub fn execute(&mut self, sql: &str) -> PipelineResult<DataFrame> {
        Ok(self.ctx.execute(sql)?.collect()?)
    }

    /// Run a query returning a single integer (for example `SELECT COUNT(*) ...`).
    ///
    /// An empty result counts as zero.
    pub fn fetch_count(&mut self, sql: &str) -> PipelineResult<i64> {
        let df = self.execute(sql)?;
        let Some(column) = df.columns().first() else {
            return Err(PipelineError::SchemaMismatch {
                message: format!("query returned no columns: {sql}"),
            });
        };
        let values = column.as_materialized_series().cast(&DataType::Int64)?;
        Ok(values.i64()?.get(0).unwrap_or(0))
    }

    /// Materialize a query as table `name`, replacing any existing table. Returns its row count.
    pub fn create_table(&mut self, name: &str, sql: &str) -> PipelineResult<usize> {
        let df = self.execute(sql)?;
        Ok(self.put_table(name, df))
    }

    /// Register `df` as table `name`, replacing any existing table. Returns its row count.
    pub fn put_table(&mut self, name: &str, df: DataFrame) -> usize {
        let rows = df.height();
        self.register(name, df);
        self.uncommitted.insert(name.to_string());
        rows
    }

    /// Persist every table changed since the last commit.
    pub fn commit(&mut self) -> PipelineResult<()> {
        for name in std::mem::take(&mut self.uncommitted) {
            let Some(df) = self.tables.get(&name) else {
                continue;
            };
            let mut df = df.clone();
            let path = self.table_path(&name);
            write_atomically(&path, |file| {
                ParquetWriter::new(file).finish(&mut df)?;
                Ok(())
            })?;
            tracing::debug!(table = %name, rows = df.height(), "table committed");
        }
        Ok(())
    }

    fn register(&mut self, name: &str, df: DataFrame) {
        self.ctx.register(name, df.clone().lazy());
        self.tables.insert(name.to_string(), df);
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{TABLE_EXTENSION}"))
    }
}

impl Drop for Warehouse {
    fn drop(&mut self) {
        if !self.uncommitted.is_empty() {
            tracing::warn!(
                tables = ?self.uncommitted,
                "warehouse dropped with uncommitted tables; changes discarded"
            );
        }
    }
}

pub(crate) fn read_parquet_frame(path: &Path) -> PipelineResult<DataFrame> {
    Ok(ParquetReader::new(File::open(path)?).finish()?)
}

/// An all-text table with the given columns and no rows.
pub(crate) fn empty_text_table(columns: &[&str]) -> DataFrame {
    let columns = columns
        .iter()
        .map(|c| Column::from(Series::new_empty((*c).into(), &DataType::String)))
        .collect();
    DataFrame::new_infer_height(columns).expect("could not create DataFrame from iterator")
}

/// Which warehouse steps a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarehouseSteps {
    pub load: bool,
    pub transform: bool,
    pub report: bool,
}

impl WarehouseSteps {
    pub const ALL: Self = Self {
        load: true,
        transform: true,
        report: true,
    };
}

/// Results of the steps that ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarehouseSummary {
    pub load: Option<LoadReport>,
    pub transform: Option<TransformReport>,
    pub reports: Vec<ReportOutput>,
}

/// Connect once to the configured warehouse and run the selected steps in order.
pub fn run_warehouse(
    config: &PipelineConfig,
    steps: WarehouseSteps,
    observer: &dyn PipelineObserver,
    options: &RunOptions,
) -> Result<WarehouseSummary, StageFailure> {
    let at = |stage: Stage| move |e: PipelineError| fail(observer, options, StageFailure::new(stage, e));

    let first = if steps.load {
        Stage::WarehouseLoad
    } else if steps.transform {
        Stage::Transform
    } else {
        Stage::Report
    };
    let mut wh = Warehouse::connect(&config.warehouse.dir).map_err(at(first))?;
    observer.on_diagnostic(&Diagnostic::info(
        first,
        format!(
            "warehouse {} opened with {} table(s)",
            wh.dir().display(),
            wh.table_names().len()
        ),
    ));

    let mut summary = WarehouseSummary::default();
    if steps.load {
        let report = load_cleaned(&mut wh, &config.output.parquet_path, observer)
            .and_then(|r| wh.commit().map(|()| r))
            .map_err(at(Stage::WarehouseLoad))?;
        summary.load = Some(report);
    }
    if steps.transform {
        let report = build_star_schema(&mut wh, observer)
            .and_then(|r| wh.commit().map(|()| r))
            .map_err(at(Stage::Transform))?;
        summary.transform = Some(report);
    }
    if steps.report {
        summary.reports = export_reports(&mut wh, &config.warehouse.reports_dir, observer)
            .map_err(at(Stage::Report))?;
    }
    Ok(summary)
}
