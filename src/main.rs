//! `retail-etl` command-line entrypoint.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use retail_etl::config::PipelineConfig;
use retail_etl::observability::{
    CompositeObserver, FileObserver, PipelineObserver, Severity, StdErrObserver, TracingObserver,
};
use retail_etl::pipeline::{run_pipeline, RunOptions};

/// Clean the retail workbook and build the analytics warehouse.
#[derive(Parser, Debug)]
#[command(name = "retail-etl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// TOML config file. Defaults apply to every key it leaves out.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Source workbook; overrides `source.workbook` from the config.
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Log level for this crate (e.g. `debug`); overrides `RUST_LOG`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Where pipeline events go.
    #[arg(long, value_enum, default_value_t = EventSink::Tracing, global = true)]
    events: EventSink,

    /// Also append pipeline events to this file.
    #[arg(long, global = true)]
    event_log: Option<PathBuf>,

    /// Failures at or above this severity are raised as alerts.
    #[arg(long, value_enum, default_value_t = AlertLevel::Critical, global = true)]
    alert_at: AlertLevel,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Load, clean and export the workbook (the default).
    Clean,
    /// Load the cleaned Parquet export into the warehouse.
    Load,
    /// Build the star schema from the loaded tables.
    Transform,
    /// Export the BI extracts.
    Report,
    /// clean, load, transform and report in one run.
    All,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum EventSink {
    Tracing,
    Stderr,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum AlertLevel {
    Error,
    Critical,
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(format!("retail_etl={level}")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("retail_etl=info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn build_observer(cli: &Cli) -> CompositeObserver {
    let mut observers: Vec<Arc<dyn PipelineObserver>> = match cli.events {
        EventSink::Tracing => vec![Arc::new(TracingObserver)],
        EventSink::Stderr => vec![Arc::new(StdErrObserver)],
    };
    if let Some(path) = &cli.event_log {
        observers.push(Arc::new(FileObserver::new(path)));
    }
    CompositeObserver::new(observers)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(input) = &cli.input {
        config.source.workbook = input.clone();
    }

    let observer = build_observer(&cli);
    let options = RunOptions {
        alert_at_or_above: match cli.alert_at {
            AlertLevel::Error => Severity::Error,
            AlertLevel::Critical => Severity::Critical,
        },
    };

    let command = cli.command.unwrap_or(Command::Clean);
    if matches!(command, Command::Clean | Command::All) {
        let summary = run_pipeline(&config, &observer, &options)?;
        tracing::info!(
            rows = summary.report.rows_out,
            csv = %summary.csv_path.display(),
            parquet = %summary.parquet_path.display(),
            "cleaning finished"
        );
    }
    if command != Command::Clean {
        run_warehouse_steps(command, &config, &observer, &options)?;
    }
    Ok(())
}

#[cfg(feature = "sql")]
fn run_warehouse_steps(
    command: Command,
    config: &PipelineConfig,
    observer: &dyn PipelineObserver,
    options: &RunOptions,
) -> Result<()> {
    use retail_etl::warehouse::{run_warehouse, WarehouseSteps};

    let steps = match command {
        Command::Load => WarehouseSteps {
            load: true,
            transform: false,
            report: false,
        },
        Command::Transform => WarehouseSteps {
            load: false,
            transform: true,
            report: false,
        },
        Command::Report => WarehouseSteps {
            load: false,
            transform: false,
            report: true,
        },
        Command::All | Command::Clean => WarehouseSteps::ALL,
    };
    let summary = run_warehouse(config, steps, observer, options)?;
    if let Some(transform) = &summary.transform {
        for (table, rows) in &transform.row_counts {
            tracing::info!(table = %table, rows, "post-transform row count");
        }
    }
    for output in &summary.reports {
        tracing::info!(path = %output.path.display(), rows = output.rows, "extract written");
    }
    Ok(())
}

#[cfg(not(feature = "sql"))]
fn run_warehouse_steps(
    command: Command,
    _config: &PipelineConfig,
    _observer: &dyn PipelineObserver,
    _options: &RunOptions,
) -> Result<()> {
    anyhow::bail!("`{command:?}` needs the warehouse; rebuild with `--features sql`")
}
