//! Exclusive lease on a home directory.
//!
//! A `flock` on `<home>/.lock` guarantees that at most one [`BoxleaseRuntime`]
//! mutates a home directory at a time, host-wide. Acquisition never blocks.
//!
//! [`BoxleaseRuntime`]: crate::BoxleaseRuntime

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use boxlease_shared::constants::layout;
use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

/// Guard holding the exclusive lease.
///
/// Released on drop, on [`RuntimeLock::release`], or by the kernel when the
/// process exits.
#[derive(Debug)]
pub struct RuntimeLock {
    file: File,
    path: PathBuf,
}

impl RuntimeLock {
    /// Take the lease on `home_dir`, failing with `LeaseHeld` if anyone holds it.
    ///
    /// `flock` locks belong to the open file description, so a second call in
    /// the same process fails too.
    pub fn acquire(home_dir: &Path) -> BoxleaseResult<Self> {
        std::fs::create_dir_all(home_dir).map_err(|e| {
            BoxleaseError::Storage(format!(
                "failed to create home dir {}: {}",
                home_dir.display(),
                e
            ))
        })?;

        let lock_path = home_dir.join(layout::LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| BoxleaseError::Storage(format!("failed to open lock file: {}", e)))?;

        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Err(BoxleaseError::LeaseHeld(home_dir.display().to_string()));
            }
            return Err(BoxleaseError::Storage(format!(
                "failed to acquire lock on {}: {}",
                lock_path.display(),
                err
            )));
        }

        tracing::debug!(path = %lock_path.display(), "Acquired runtime lease");
        Ok(Self {
            file,
            path: lock_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lease now instead of waiting for drop.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RuntimeLock {
    fn drop(&mut self) {
        let result = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        if result != 0 {
            tracing::warn!(
                path = %self.path.display(),
                error = %std::io::Error::last_os_error(),
                "Failed to unlock runtime lease"
            );
        } else {
            tracing::debug!(path = %self.path.display(), "Released runtime lease");
        }
    }
}
