//! Structured logging setup (see §6, "Logging").
//!
//! Stderr always gets leveled, structured logs via `tracing-subscriber`.
//! `--logging` additionally installs a `tracing-appender` daily-rolling
//! file sink under `--log-dir`, the structured-logging equivalent of the
//! original's date-rotated access/error log files.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Install the global subscriber. The returned guard must be kept alive for
/// the process lifetime when file logging is enabled, since dropping it
/// stops the background writer thread.
pub fn init(enable_file_logging: bool, log_dir: &Path) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if !enable_file_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, "stellite.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Some(guard)
}
