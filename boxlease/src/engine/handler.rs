//! ShimHandler - lifecycle operations on a running supervisor.

use std::process::Child;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::BoxID;
use crate::util::{is_process_alive, is_same_process};
use boxlease_shared::errors::BoxleaseResult;

use super::{Supervisor, SupervisorMetrics};

const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(2000);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handler for a supervisor process identified by pid.
///
/// Works for supervisors this process spawned and for ones found running
/// after another process created them (same operations).
#[derive(Debug)]
pub(crate) struct ShimHandler {
    pid: u32,
    box_id: BoxID,
    /// Kept when we spawned the process so stop can wait() on it.
    /// `None` when attached to an existing process.
    process: Option<Child>,
    /// CPU usage needs snapshots over time, so the System is reused.
    metrics_sys: Mutex<sysinfo::System>,
}

impl ShimHandler {
    /// Handler owning a freshly spawned supervisor.
    pub(crate) fn from_child(process: Child, box_id: BoxID) -> Self {
        let pid = process.id();
        Self {
            pid,
            box_id,
            process: Some(process),
            metrics_sys: Mutex::new(sysinfo::System::new()),
        }
    }

    /// Handler for a supervisor started by another process (attach mode).
    pub(crate) fn from_pid(pid: u32, box_id: BoxID) -> Self {
        Self {
            pid,
            box_id,
            process: None,
            metrics_sys: Mutex::new(sysinfo::System::new()),
        }
    }

    fn stop_owned(mut process: Child) {
        let pid = process.id();
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }

        let start = Instant::now();
        loop {
            match process.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => {
                    if start.elapsed() > GRACEFUL_SHUTDOWN_TIMEOUT {
                        tracing::warn!(pid, "Supervisor ignored SIGTERM, killing");
                        let _ = process.kill();
                        let _ = process.wait();
                        return;
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(_) => {
                    let _ = process.kill();
                    let _ = process.wait();
                    return;
                }
            }
        }
    }

    fn stop_attached(pid: u32) {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }

        let start = Instant::now();
        loop {
            let mut status: i32 = 0;
            let result = unsafe { libc::waitpid(pid as i32, &mut status, libc::WNOHANG) };
            if result > 0 {
                return;
            }
            // Not our child (usual when attached): fall back to probing.
            if result < 0 && !is_process_alive(pid) {
                return;
            }

            if start.elapsed() > GRACEFUL_SHUTDOWN_TIMEOUT {
                tracing::warn!(pid, "Supervisor ignored SIGTERM, killing");
                unsafe {
                    libc::kill(pid as i32, libc::SIGKILL);
                }
                // Reap if it happens to be ours.
                unsafe {
                    libc::waitpid(pid as i32, &mut status, 0);
                }
                return;
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Supervisor for ShimHandler {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn stop(&mut self) -> BoxleaseResult<()> {
        tracing::debug!(box_id = %self.box_id, pid = self.pid, "Stopping supervisor");
        match self.process.take() {
            Some(process) => Self::stop_owned(process),
            None => Self::stop_attached(self.pid),
        }
        Ok(())
    }

    fn metrics(&self) -> BoxleaseResult<SupervisorMetrics> {
        use sysinfo::Pid;

        let pid = Pid::from_u32(self.pid);
        let mut sys = self.metrics_sys.lock();
        sys.refresh_process(pid);

        if let Some(proc_info) = sys.process(pid) {
            return Ok(SupervisorMetrics {
                cpu_percent: Some(proc_info.cpu_usage()),
                memory_bytes: Some(proc_info.memory()),
            });
        }

        Ok(SupervisorMetrics::default())
    }

    fn is_running(&mut self) -> bool {
        match self.process.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => is_process_alive(self.pid) && is_same_process(self.pid, &self.box_id),
        }
    }
}
