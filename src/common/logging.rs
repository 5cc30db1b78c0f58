use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize logging: a console layer on stderr (debug with `verbose`, warnings otherwise)
/// and a daily file under `log_dir`. Keep the returned guard alive until exit so the
/// file writer flushes.
pub fn init(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "idereset.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    let console_filter = if verbose { "idereset=debug" } else { "idereset=warn" };
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_filter)),
        );

    tracing_subscriber::registry()
        .with(file_layer.with_filter(EnvFilter::new("idereset=info")))
        .with(console_layer)
        .try_init()
        .ok(); // Ignore error if already initialized

    tracing::debug!("Logging initialized in {}", log_dir.display());
    Ok(guard)
}
