//! provides logging helpers

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

const MAX_LOG_FILES: usize = 3;

fn env_filter() -> filter::EnvFilter {
    filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy()
}

/// initiate the global tracing subscriber
///
/// Always logs to stderr. When `log_file` is set, events are also written to a
/// daily rotated file next to it; the returned guard must be kept alive for
/// the file writer to flush.
pub fn init(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter());

    let Some(log_file) = log_file else {
        registry().with(stderr_layer).init();
        return None;
    };

    match rolling_appender(log_file) {
        Ok(appender) => {
            let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
            let file_layer = layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(env_filter());
            registry().with(stderr_layer).with(file_layer).init();
            Some(file_guard)
        }
        Err(e) => {
            registry().with(stderr_layer).init();
            tracing::warn!(
                path = %log_file.display(),
                "failed to create log file appender, logging to stderr only: {e}"
            );
            None
        }
    }
}

fn rolling_appender(log_file: &Path) -> Result<RollingFileAppender, String> {
    let dir = match log_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let prefix = log_file
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| format!("invalid log file name: {}", log_file.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .map_err(|e| e.to_string())
}
