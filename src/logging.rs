use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging to stdout and to a daily-rolling file at `log_file`.
///
/// Uses the `RUST_LOG` env var if set, otherwise `level` for this crate and
/// `info` for dependencies. Keep the returned guard alive until exit so
/// buffered file output is flushed.
pub fn init(level: &str, log_file: &Path) -> WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let directory = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "trellis_debug.log".into());
    let appender = tracing_appender::rolling::daily(directory, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_target(false).with_ansi(false).with_writer(file_writer))
        .init();

    guard
}

fn default_directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    if level == "trace" || level == "debug" {
        format!("info,trellis_batch={level}")
    } else {
        level
    }
}
