//! Logging setup for the CLI.
//!
//! Logs go to `<root>/logs/punchcard.log` through a non-blocking appender so
//! stdout stays reserved for the display. If the log directory can't be
//! created, logs fall back to stderr.
//!
//! Filter: `RUST_LOG` if set, `debug` when `PUNCHCARD_DEBUG_LOG` is truthy,
//! otherwise `info`.

use std::env;
use std::path::Path;

use fs_err as fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "punchcard.log";

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var("PUNCHCARD_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. Keep the returned guard alive until exit
/// so buffered lines are flushed.
pub fn init(logs_dir: &Path) -> Option<WorkerGuard> {
    if let Err(e) = fs::create_dir_all(logs_dir) {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .init();
        tracing::warn!(error = %e, "Log directory unavailable, logging to stderr");
        return None;
    }

    let appender = tracing_appender::rolling::never(logs_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}
