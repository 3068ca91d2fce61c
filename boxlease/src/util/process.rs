//! Process validation utilities for pid checking and verification.

use std::path::Path;

use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

/// Read a pid written by the supervisor (decimal, optional trailing newline).
pub fn read_pid_file(path: &Path) -> BoxleaseResult<u32> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        BoxleaseError::Storage(format!("failed to read pid file {}: {}", path.display(), e))
    })?;

    content.trim().parse::<u32>().map_err(|e| {
        BoxleaseError::Storage(format!(
            "invalid pid in file {}: '{}' - {}",
            path.display(),
            content.trim(),
            e
        ))
    })
}

/// Write `pid` to `path` atomically (temp file + rename).
pub fn write_pid_file(path: &Path, pid: u32) -> BoxleaseResult<()> {
    let tmp = path.with_extension("pid.tmp");
    std::fs::write(&tmp, format!("{}\n", pid)).map_err(|e| {
        BoxleaseError::Storage(format!("failed to write pid file {}: {}", tmp.display(), e))
    })?;
    std::fs::rename(&tmp, path).map_err(|e| {
        BoxleaseError::Storage(format!(
            "failed to move pid file into place at {}: {}",
            path.display(),
            e
        ))
    })
}

/// Send SIGKILL. True if the process is gone or was signalled.
pub fn kill_process(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, libc::SIGKILL) == 0 || !is_process_alive(pid) }
}

/// Deliver `signal` to every process in the group led by `pgid`.
///
/// A group that is already gone counts as signalled.
pub fn signal_process_group(pgid: u32, signal: i32) -> std::io::Result<()> {
    if pgid == 0 || pgid > i32::MAX as u32 {
        return Ok(());
    }
    if unsafe { libc::kill(-(pgid as i32), signal) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

/// Null-signal existence check.
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// Whether `pid` is the supervisor of `box_id` and not a recycled pid.
///
/// On Linux the command line must carry `--box-id <box_id>`, whatever the
/// supervisor program is called.
pub fn is_same_process(pid: u32, box_id: &str) -> bool {
    #[cfg(target_os = "linux")]
    {
        match std::fs::read_to_string(format!("/proc/{}/cmdline", pid)) {
            Ok(cmdline) => cmdline_names_box(&cmdline, box_id),
            Err(_) => false,
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = box_id;
        is_process_alive(pid)
    }
}

/// Match a NUL-separated command line against `--box-id <id>` or `--box-id=<id>`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn cmdline_names_box(cmdline: &str, box_id: &str) -> bool {
    let args: Vec<&str> = cmdline.split('\0').collect();
    let inline = format!("--box-id={}", box_id);
    args.iter().any(|arg| *arg == inline)
        || args
            .windows(2)
            .any(|pair| pair[0] == "--box-id" && pair[1] == box_id)
}
