//! ShimLauncher - spawns supervisor processes.

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use boxlease_shared::constants::shim as shim_const;
use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

use crate::runtime::layout::BoxFilesystemLayout;
use crate::runtime::options::ShimCommand;
use crate::sandbox::BoxConfig;
use crate::util::{find_binary, read_pid_file};

use super::ShimHandler;

const READY_TIMEOUT: Duration = Duration::from_secs(10);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Spawns the supervisor for a box and waits until it reports itself.
#[derive(Clone, Debug)]
pub(crate) struct ShimLauncher {
    command: Option<ShimCommand>,
    home_dir: PathBuf,
}

impl ShimLauncher {
    /// `command` overrides the supervisor program; `None` locates
    /// `boxlease-shim` through the binary finder on first use.
    pub(crate) fn new(command: Option<ShimCommand>, home_dir: PathBuf) -> Self {
        Self { command, home_dir }
    }

    fn resolve_command(&self) -> BoxleaseResult<ShimCommand> {
        match &self.command {
            Some(command) => Ok(command.clone()),
            None => Ok(ShimCommand::new(find_binary(shim_const::BINARY_NAME)?)),
        }
    }

    /// Spawn the supervisor. Blocks until its pid file appears.
    pub(crate) fn spawn(
        &self,
        config: &BoxConfig,
        layout: &BoxFilesystemLayout,
    ) -> BoxleaseResult<ShimHandler> {
        let shim = self.resolve_command()?;
        let pid_file = layout.pid_file();

        if pid_file.exists() {
            tracing::warn!("Removing stale pid file: {}", pid_file.display());
            let _ = std::fs::remove_file(&pid_file);
        }

        let mut cmd = Command::new(&shim.program);
        cmd.args(&shim.args)
            .arg("--box-id")
            .arg(&config.id)
            .arg("--box-dir")
            .arg(layout.root())
            .arg("--home")
            .arg(&self.home_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if config.options.detach {
            // New session: outlives the creating process and its terminal.
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        } else {
            // Own process group keeps terminal Ctrl-C away from the supervisor;
            // parent death still ends it.
            cmd.arg("--watch-parent").process_group(0);
        }

        tracing::info!(
            box_id = %config.id,
            detach = config.options.detach,
            "Starting supervisor"
        );
        tracing::debug!(program = %shim.program.display(), args = ?shim.args, "Supervisor command");

        let spawn_start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            BoxleaseError::Engine(format!(
                "Failed to spawn supervisor {}: {}",
                shim.program.display(),
                e
            ))
        })?;

        if let Err(e) = wait_for_pid_file(&mut child, &pid_file) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        tracing::info!(
            box_id = %config.id,
            pid = child.id(),
            spawn_duration_ms = spawn_start.elapsed().as_millis(),
            "Supervisor started"
        );

        Ok(ShimHandler::from_child(child, config.id.clone()))
    }
}

fn wait_for_pid_file(child: &mut Child, pid_file: &std::path::Path) -> BoxleaseResult<()> {
    let deadline = Instant::now() + READY_TIMEOUT;
    loop {
        if let Ok(pid) = read_pid_file(pid_file)
            && pid == child.id()
        {
            return Ok(());
        }

        if let Ok(Some(status)) = child.try_wait() {
            return Err(BoxleaseError::Engine(format!(
                "Supervisor exited before becoming ready ({})",
                status
            )));
        }

        if Instant::now() >= deadline {
            return Err(BoxleaseError::Engine(format!(
                "Supervisor did not become ready within {}s",
                READY_TIMEOUT.as_secs()
            )));
        }

        std::thread::sleep(READY_POLL_INTERVAL);
    }
}
