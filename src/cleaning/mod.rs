//! Cleaning and reconciliation of the three raw tables into one record set.
//!
//! Stages run in a fixed order, each reporting to the injected observer:
//!
//! 1. [`normalize`]: column identifiers
//! 2. [`validate`]: duplicates, out-of-range values, missing keys
//! 3. [`merge`]: returns and people joins, Canada region split
//! 4. [`coerce`]: date columns and categoricals
//! 5. [`derive`]: postal codes, whitespace, rounding, profit margin, discount clamp

pub mod coerce;
pub mod derive;
pub mod merge;
pub mod normalize;
pub mod validate;

use serde::Serialize;

use crate::error::{Stage, StageFailure};
use crate::ingestion::RawTables;
use crate::observability::{PipelineObserver, StageStats};
use crate::types::DataSet;

pub use coerce::{CoercionReport, DateCell};
pub use derive::DerivationReport;
pub use merge::MergeReport;
pub use validate::ValidationReport;

/// Every count produced by one cleaning run. Serialized as the JSON quality report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    /// False when the workbook had to be re-read without type hints.
    pub typed_load: bool,
    pub orders_loaded: usize,
    pub returns_loaded: usize,
    pub people_loaded: usize,
    pub validation: ValidationReport,
    pub merge: MergeReport,
    pub coercion: CoercionReport,
    pub derivation: DerivationReport,
    pub rows_out: usize,
    pub columns_out: Vec<String>,
}

/// Run normalize → validate → merge → coerce → derive over freshly loaded tables.
pub fn clean(
    raw: RawTables,
    observer: &dyn PipelineObserver,
) -> Result<(DataSet, CleaningReport), StageFailure> {
    let RawTables {
        mut orders,
        mut returns,
        mut people,
        hinted,
    } = raw;
    let mut report = CleaningReport {
        typed_load: hinted,
        orders_loaded: orders.row_count(),
        returns_loaded: returns.row_count(),
        people_loaded: people.row_count(),
        ..CleaningReport::default()
    };

    for table in [&mut orders, &mut returns, &mut people] {
        normalize::normalize_columns(table);
    }
    finished(observer, Stage::Normalize, report.orders_loaded, orders.row_count());

    let before = orders.row_count();
    report.validation = validate::validate(&mut orders, &mut people, observer);
    finished(observer, Stage::Validate, before, orders.row_count());

    let (mut merged, merge_report) = merge::merge(orders, &returns, &people, observer)
        .map_err(|e| StageFailure::new(Stage::Merge, e))?;
    report.merge = merge_report;

    report.coercion = coerce::coerce_types(&mut merged, observer);
    finished(observer, Stage::Coerce, merged.row_count(), merged.row_count());

    report.derivation = derive::derive_fields(&mut merged, observer);
    finished(observer, Stage::Derive, merged.row_count(), merged.row_count());

    report.rows_out = merged.row_count();
    report.columns_out = merged.column_names();
    Ok((merged, report))
}

fn finished(observer: &dyn PipelineObserver, stage: Stage, rows_in: usize, rows_out: usize) {
    observer.on_stage_finished(stage, StageStats { rows_in, rows_out });
}
