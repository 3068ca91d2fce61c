//! Supervisor process body (`boxlease-shim`).
//!
//! The supervisor marks a box as live on the host: it publishes its pid,
//! then waits for a termination signal, or for its parent to exit when the
//! box is tied to the creating process.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};

use boxlease_shared::constants::{layout as layout_const, shim as shim_const};
use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

use crate::runtime::layout::BoxFilesystemLayout;
use crate::util::process::write_pid_file;
use crate::util::{init_file_logging, read_pid_file};

const PARENT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Supervisor arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "boxlease-shim", version, about = "Boxlease box supervisor")]
pub struct ShimArgs {
    /// Box identifier
    #[arg(long)]
    pub box_id: String,

    /// Box workspace directory
    #[arg(long)]
    pub box_dir: PathBuf,

    /// Runtime home directory (for logs)
    #[arg(long)]
    pub home: PathBuf,

    /// Exit when the parent process exits
    #[arg(long)]
    pub watch_parent: bool,
}

/// Run the supervisor until it is told to stop.
pub async fn run(args: ShimArgs) -> BoxleaseResult<()> {
    init_file_logging(
        &args.home.join(layout_const::LOGS_DIR),
        shim_const::LOG_FILE_PREFIX,
    );

    let layout = BoxFilesystemLayout::new(args.box_dir.clone());
    let pid_file = layout.pid_file();
    let pid = std::process::id();
    let parent = unsafe { libc::getppid() };

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| BoxleaseError::Engine(format!("Failed to install SIGTERM handler: {}", e)))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| BoxleaseError::Engine(format!("Failed to install SIGINT handler: {}", e)))?;

    write_pid_file(&pid_file, pid)?;
    tracing::info!(
        box_id = %args.box_id,
        pid,
        watch_parent = args.watch_parent,
        "Supervisor running"
    );

    let mut ticker = tokio::time::interval(PARENT_POLL_INTERVAL);
    let reason = loop {
        tokio::select! {
            _ = sigterm.recv() => break "SIGTERM",
            _ = sigint.recv() => break "SIGINT",
            _ = ticker.tick() => {
                if args.watch_parent && unsafe { libc::getppid() } != parent {
                    break "parent exited";
                }
            }
        }
    };

    tracing::info!(box_id = %args.box_id, reason, "Supervisor exiting");

    // A restarted box may already have a newer supervisor's pid file.
    if read_pid_file(&pid_file).ok() == Some(pid)
        && let Err(e) = std::fs::remove_file(&pid_file)
    {
        tracing::warn!("Failed to remove pid file {}: {}", pid_file.display(), e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = ShimArgs::try_parse_from([
            "boxlease-shim",
            "--box-id",
            "01J0000000000000000000000",
            "--box-dir",
            "/tmp/box",
            "--home",
            "/tmp/home",
            "--watch-parent",
        ])
        .unwrap();
        assert_eq!(args.box_id, "01J0000000000000000000000");
        assert_eq!(args.box_dir, PathBuf::from("/tmp/box"));
        assert!(args.watch_parent);
    }

    #[test]
    fn test_box_id_required() {
        assert!(ShimArgs::try_parse_from(["boxlease-shim", "--box-dir", "/tmp/box"]).is_err());
    }
}
