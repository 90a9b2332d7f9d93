use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use pldbg_adapters::BufferSurface;
use pldbg_core::{FileDebugJournal, FileSettingsStore};
use pldbg_tui::{TuiError, TuiOptions};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, EnvFilter};

const LOG_ENV: &str = "PLDBG_LOG";

#[derive(Debug, Parser)]
#[command(name = "pldbg")]
#[command(about = "Step through PL blocks and subprograms in the terminal")]
struct Cli {
    /// PL source file to open
    file: PathBuf,

    /// Settings file to use instead of the platform config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Delay the simulated engine adds to every command
    #[arg(long, value_name = "MS")]
    latency_ms: Option<u64>,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    save_settings: bool,
}

/// Logs go to `pldbg.log` next to the settings; the terminal belongs to the UI.
fn init_logging(log_dir: &Path, default_filter: &str) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix("pldbg")
        .filename_suffix("log")
        .build(log_dir)
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;
    Some(guard)
}

fn run_app(
    cli: &Cli,
    run_tui: impl FnOnce(TuiOptions) -> Result<(), TuiError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = match &cli.config {
        Some(path) => FileSettingsStore::load_from_path(path)?,
        None => FileSettingsStore::load_default()?,
    };
    if let Some(latency_ms) = cli.latency_ms {
        store.update(|settings| settings.simulated_latency_ms = latency_ms);
    }
    if cli.save_settings {
        store.persist()?;
    }
    let _log_guard = init_logging(store.dir(), &store.settings().log_filter);

    let surface = Arc::new(BufferSurface::from_file(&cli.file)?);
    let settings = store.settings().clone();
    let journal = settings
        .journal
        .then(|| FileDebugJournal::in_dir(store.dir()));
    info!(
        target: "pldbg",
        file = %cli.file.display(),
        settings = %store.path().display(),
        journal = journal.is_some(),
        "pldbg_started"
    );

    run_tui(TuiOptions {
        title: cli.file.display().to_string(),
        surface,
        settings,
        journal,
    })?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    run_app(&cli, pldbg_tui::run)
}
