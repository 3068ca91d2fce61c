mod binary_finder;
pub mod process;

pub use binary_finder::{RuntimeBinaryFinder, find_binary};
pub use process::{
    is_process_alive, is_same_process, kill_process, read_pid_file, signal_process_group,
};

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Keeps the non-blocking writer flushing for the life of the process.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Route `tracing` output to a daily-rolling file under `logs_dir`.
///
/// Runs once per process. A subscriber installed earlier by the host
/// application stays in place.
pub fn init_file_logging(logs_dir: &Path, file_prefix: &str) {
    if LOG_GUARD.get().is_some() {
        return;
    }

    let appender = tracing_appender::rolling::daily(logs_dir, file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    if LOG_GUARD.set(guard).is_err() {
        return;
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    register_to_tracing(non_blocking, env_filter);
}

pub fn register_to_tracing(non_blocking: NonBlocking, env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false),
        )
        .try_init();
}
