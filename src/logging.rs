use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Diagnostic log written next to the host process when no path is configured.
pub const DEFAULT_LOG_FILE: &str = "scope_lens_debug.log";

// Dropping the guard stops the background writer.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialise logging to stdout and, when `log_file` is given, append to that
/// file as well.
///
/// Without `debug` the level is fixed at `info`. With it the default is
/// `debug` and `RUST_LOG` may override it. Only the first call in a process
/// installs a subscriber; later calls are ignored.
pub fn init(debug: bool, log_file: Option<PathBuf>) {
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let file_layer = log_file.and_then(|path| {
        let file_name = path.file_name()?.to_owned();
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if FILE_GUARD.set(guard).is_err() {
            return None;
        }
        Some(fmt::layer().with_writer(writer).with_ansi(false))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();
}
