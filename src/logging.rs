//! Diagnostics logging.
//!
//! Diagnostics go to `<log_root>/scriptdeck.log` through a non-blocking writer so
//! the TUI never gets written over. Run transcripts are separate (`transcript`).

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE: &str = "scriptdeck.log";
pub const FILTER_ENV: &str = "SCRIPTDECK_LOG";

/// Keeps the background writer alive; dropping it flushes pending records.
pub struct LoggingGuard {
    pub path: PathBuf,
    _guard: WorkerGuard,
}

pub fn init(log_root: &Path) -> Result<LoggingGuard> {
    std::fs::create_dir_all(log_root)
        .with_context(|| format!("failed to create log directory {}", log_root.display()))?;
    let path = log_root.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let env_filter =
        EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "scriptdeck started");
    Ok(LoggingGuard {
        path,
        _guard: guard,
    })
}
