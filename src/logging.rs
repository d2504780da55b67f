//! File logging. The terminal UI owns stdout and stderr, so log output goes
//! to a file through a non-blocking writer.

use std::fs::{self, File};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{default_log_path, LogConfig};

/// Keeps the logging worker thread alive; flushes on drop.
pub struct LogGuard {
    _guard: WorkerGuard,
}

/// Initialize logging. Returns `None` when logging is disabled or no log
/// location can be determined.
pub fn init(config: &LogConfig) -> Result<Option<LogGuard>> {
    if !config.enabled {
        return Ok(None);
    }
    let Some(path) = config.file.clone().or_else(default_log_path) else {
        return Ok(None);
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    // RUST_LOG takes precedence over the configured level.
    let filter = EnvFilter::builder()
        .with_default_directive(
            config
                .level
                .parse()
                .context("Invalid log level directive")?,
        )
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("Failed to install log subscriber")?;

    tracing::info!(path = %path.display(), level = %config.level, "logging initialized");

    Ok(Some(LogGuard { _guard: guard }))
}
