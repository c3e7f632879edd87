//! Diagnostic sink for pipeline runs.
//!
//! Every stage reports data-quality findings as [`Diagnostic`]s to a [`PipelineObserver`] instead
//! of failing the run. Fatal errors are reported through [`PipelineObserver::on_failure`] and,
//! above the configured threshold, [`PipelineObserver::on_alert`].

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::{PipelineError, Stage};

/// Severity classification used for diagnostics and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational event.
    Info,
    /// Data-quality finding; the run continues.
    Warning,
    /// Stage failed.
    Error,
    /// Infrastructure failure (missing source, I/O).
    Critical,
}

/// One structured message from a stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub severity: Severity,
    pub message: String,
    /// Number of rows the finding applies to, when it is about rows.
    pub affected_rows: Option<usize>,
}

impl Diagnostic {
    pub fn new(stage: Stage, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            stage,
            severity,
            message: message.into(),
            affected_rows: None,
        }
    }

    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, Severity::Info, message)
    }

    /// A row-level data-quality finding.
    pub fn warning(stage: Stage, message: impl Into<String>, affected_rows: usize) -> Self {
        Self::new(stage, Severity::Warning, message).with_rows(affected_rows)
    }

    pub fn with_rows(mut self, affected_rows: usize) -> Self {
        self.affected_rows = Some(affected_rows);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{:?}] {}", self.stage, self.severity, self.message)?;
        if let Some(n) = self.affected_rows {
            write!(f, " (rows={n})")?;
        }
        Ok(())
    }
}

/// Row counts reported when a stage completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageStats {
    pub rows_in: usize,
    pub rows_out: usize,
}

/// Observer interface for pipeline runs.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait PipelineObserver: Send + Sync {
    /// Called for every diagnostic a stage emits.
    fn on_diagnostic(&self, _diagnostic: &Diagnostic) {}

    /// Called when a stage finishes successfully.
    fn on_stage_finished(&self, _stage: Stage, _stats: StageStats) {}

    /// Called when a stage fails.
    fn on_failure(&self, _stage: Stage, _severity: Severity, _error: &PipelineError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, stage: Stage, severity: Severity, error: &PipelineError) {
        self.on_failure(stage, severity, error)
    }
}

/// Observer that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_diagnostic(&self, diagnostic: &Diagnostic) {
        for o in &self.observers {
            o.on_diagnostic(diagnostic);
        }
    }

    fn on_stage_finished(&self, stage: Stage, stats: StageStats) {
        for o in &self.observers {
            o.on_stage_finished(stage, stats);
        }
    }

    fn on_failure(&self, stage: Stage, severity: Severity, error: &PipelineError) {
        for o in &self.observers {
            o.on_failure(stage, severity, error);
        }
    }

    fn on_alert(&self, stage: Stage, severity: Severity, error: &PipelineError) {
        for o in &self.observers {
            o.on_alert(stage, severity, error);
        }
    }
}

/// Forwards everything to `tracing`, with the stage and row count as structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_diagnostic(&self, d: &Diagnostic) {
        let stage = d.stage.as_str();
        match d.severity {
            Severity::Info => tracing::info!(stage, affected_rows = d.affected_rows, "{}", d.message),
            Severity::Warning => {
                tracing::warn!(stage, affected_rows = d.affected_rows, "{}", d.message)
            }
            Severity::Error | Severity::Critical => {
                tracing::error!(stage, affected_rows = d.affected_rows, "{}", d.message)
            }
        }
    }

    fn on_stage_finished(&self, stage: Stage, stats: StageStats) {
        tracing::info!(
            stage = stage.as_str(),
            rows_in = stats.rows_in,
            rows_out = stats.rows_out,
            "stage finished"
        );
    }

    fn on_failure(&self, stage: Stage, severity: Severity, error: &PipelineError) {
        tracing::error!(stage = stage.as_str(), ?severity, "{error}");
    }

    fn on_alert(&self, stage: Stage, severity: Severity, error: &PipelineError) {
        tracing::error!(stage = stage.as_str(), ?severity, alert = true, "{error}");
    }
}

/// Logs pipeline events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl PipelineObserver for StdErrObserver {
    fn on_diagnostic(&self, d: &Diagnostic) {
        eprintln!("[pipeline]{d}");
    }

    fn on_stage_finished(&self, stage: Stage, stats: StageStats) {
        eprintln!(
            "[pipeline][{stage}][ok] rows_in={} rows_out={}",
            stats.rows_in, stats.rows_out
        );
    }

    fn on_failure(&self, stage: Stage, severity: Severity, error: &PipelineError) {
        eprintln!("[pipeline][{stage}][{severity:?}] err={error}");
    }

    fn on_alert(&self, stage: Stage, severity: Severity, error: &PipelineError) {
        eprintln!("[ALERT][pipeline][{stage}][{severity:?}] err={error}");
    }
}

/// Appends pipeline events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl PipelineObserver for FileObserver {
    fn on_diagnostic(&self, d: &Diagnostic) {
        self.append_line(&format!("{} {d}", unix_ts()));
    }

    fn on_stage_finished(&self, stage: Stage, stats: StageStats) {
        self.append_line(&format!(
            "{} ok stage={stage} rows_in={} rows_out={}",
            unix_ts(),
            stats.rows_in,
            stats.rows_out
        ));
    }

    fn on_failure(&self, stage: Stage, severity: Severity, error: &PipelineError) {
        self.append_line(&format!(
            "{} fail severity={severity:?} stage={stage} err={error}",
            unix_ts()
        ));
    }

    fn on_alert(&self, stage: Stage, severity: Severity, error: &PipelineError) {
        self.append_line(&format!(
            "{} ALERT severity={severity:?} stage={stage} err={error}",
            unix_ts()
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Keeps every diagnostic in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryObserver {
    diagnostics: Mutex<Vec<Diagnostic>>,
    failures: Mutex<Vec<(Stage, Severity)>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of collected diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Diagnostics at `Warning` severity.
    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.diagnostics()
            .into_iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }

    /// `(stage, severity)` of every reported failure.
    pub fn failures(&self) -> Vec<(Stage, Severity)> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl PipelineObserver for MemoryObserver {
    fn on_diagnostic(&self, diagnostic: &Diagnostic) {
        if let Ok(mut d) = self.diagnostics.lock() {
            d.push(diagnostic.clone());
        }
    }

    fn on_failure(&self, stage: Stage, severity: Severity, _error: &PipelineError) {
        if let Ok(mut f) = self.failures.lock() {
            f.push((stage, severity));
        }
    }
}

/// Map an error to the severity reported to observers.
pub fn severity_for_error(e: &PipelineError) -> Severity {
    match e {
        PipelineError::SourceNotFound { .. } | PipelineError::Io(_) => Severity::Critical,
        PipelineError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => Severity::Critical,
            _ => Severity::Error,
        },
        PipelineError::Parquet(err) => {
            if error_chain_contains_io(err) {
                Severity::Critical
            } else {
                Severity::Error
            }
        }
        _ => Severity::Error,
    }
}

fn error_chain_contains_io(e: &(dyn std::error::Error + 'static)) -> bool {
    let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        cur = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_fans_out_diagnostics() {
        let a = Arc::new(MemoryObserver::new());
        let b = Arc::new(MemoryObserver::new());
        let observers: Vec<Arc<dyn PipelineObserver>> = vec![a.clone(), b.clone()];
        let composite = CompositeObserver::new(observers);

        composite.on_diagnostic(&Diagnostic::warning(Stage::Validate, "dupes", 3));

        assert_eq!(a.warnings().len(), 1);
        assert_eq!(b.warnings()[0].affected_rows, Some(3));
    }

    #[test]
    fn missing_source_is_critical() {
        let err = PipelineError::SourceNotFound {
            path: PathBuf::from("nope.xlsx"),
        };
        assert_eq!(severity_for_error(&err), Severity::Critical);

        let err = PipelineError::missing_columns("returns", &["returned"]);
        assert_eq!(severity_for_error(&err), Severity::Error);
    }

    #[test]
    fn diagnostic_display_includes_stage_and_rows() {
        let d = Diagnostic::warning(Stage::Derive, "discounts outside [0,1]", 1);
        assert_eq!(
            d.to_string(),
            "[derive][Warning] discounts outside [0,1] (rows=1)"
        );
    }
}
