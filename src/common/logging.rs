//! Logging and tracing configuration
//!
//! Logs go to stderr so stdout stays clean for reports (including `--json`).
//! Optionally a second, more detailed layer writes to the platform log dir.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use super::paths;

/// Name of the log file inside the log directory
const LOG_FILE: &str = "runner.log";

/// Keeps the file writer alive; dropping it flushes pending log lines
pub struct LogGuard {
    _file: Option<WorkerGuard>,
    pub file_path: Option<PathBuf>,
}

/// Initialize tracing for the CLI
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is WARN for this crate, INFO with `--verbose`.
pub fn init_cli(verbose: bool, log_to_file: bool) -> LogGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("scenario_runner=info,warn")
        } else {
            EnvFilter::new("scenario_runner=warn,error")
        }
    });

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(filter);

    let log_dir = if log_to_file {
        paths::log_dir().and_then(|dir| paths::ensure_dir(&dir).ok())
    } else {
        None
    };

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(&dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            // File logging with full details, including WebDriver traffic
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(EnvFilter::new("scenario_runner=trace,info"));

            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();

            LogGuard {
                _file: Some(guard),
                file_path: Some(dir.join(LOG_FILE)),
            }
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
            LogGuard {
                _file: None,
                file_path: None,
            }
        }
    }
}
