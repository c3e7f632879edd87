//! The cleaning run: load → clean → export.

use std::io::Write;
use std::path::PathBuf;

use crate::cleaning::{self, CleaningReport};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Stage, StageFailure};
use crate::export::{export_dataset, write_atomically};
use crate::ingestion::load_workbook;
use crate::observability::{severity_for_error, Diagnostic, PipelineObserver, Severity};

/// Knobs that are not part of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Failures at or above this severity are also sent to `on_alert`.
    pub alert_at_or_above: Severity,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            alert_at_or_above: Severity::Critical,
        }
    }
}

/// What a successful cleaning run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub report: CleaningReport,
    pub csv_path: PathBuf,
    pub parquet_path: PathBuf,
    pub quality_report: Option<PathBuf>,
}

/// Report a fatal error to the observer and tag it with its stage.
pub(crate) fn fail(
    observer: &dyn PipelineObserver,
    options: &RunOptions,
    failure: StageFailure,
) -> StageFailure {
    let severity = severity_for_error(&failure.error);
    observer.on_failure(failure.stage, severity, &failure.error);
    if severity >= options.alert_at_or_above {
        observer.on_alert(failure.stage, severity, &failure.error);
    }
    failure
}

/// Load the configured workbook, clean it, and write the CSV and Parquet outputs (plus the JSON
/// quality report when configured).
pub fn run_pipeline(
    config: &PipelineConfig,
    observer: &dyn PipelineObserver,
    options: &RunOptions,
) -> Result<RunSummary, StageFailure> {
    let at = |stage: Stage| move |e: PipelineError| fail(observer, options, StageFailure::new(stage, e));

    let raw = load_workbook(&config.source.workbook, &config.load_options(), observer)
        .map_err(at(Stage::Load))?;

    let (cleaned, report) =
        cleaning::clean(raw, observer).map_err(|failure| fail(observer, options, failure))?;

    export_dataset(
        &cleaned,
        &config.output.csv_path,
        &config.output.parquet_path,
        observer,
    )
    .map_err(at(Stage::Export))?;

    if let Some(path) = &config.output.quality_report {
        write_quality_report(&report, path).map_err(at(Stage::Export))?;
        observer.on_diagnostic(&Diagnostic::info(
            Stage::Export,
            format!("wrote quality report {}", path.display()),
        ));
    }

    observer.on_diagnostic(
        &Diagnostic::info(
            Stage::Export,
            format!(
                "pipeline complete: {} rows x {} columns",
                report.rows_out,
                report.columns_out.len()
            ),
        )
        .with_rows(report.rows_out),
    );

    Ok(RunSummary {
        report,
        csv_path: config.output.csv_path.clone(),
        parquet_path: config.output.parquet_path.clone(),
        quality_report: config.output.quality_report.clone(),
    })
}

/// Serialize the cleaning report as pretty JSON, atomically.
pub fn write_quality_report(
    report: &CleaningReport,
    path: impl AsRef<std::path::Path>,
) -> Result<(), PipelineError> {
    write_atomically(path.as_ref(), |file| {
        serde_json::to_writer_pretty(&mut *file, report)?;
        file.write_all(b"\n")?;
        Ok(())
    })
}
