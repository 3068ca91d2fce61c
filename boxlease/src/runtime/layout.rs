//! Directory layout under the home directory.
//!
//! ```text
//! <home>/
//! ├── .lock
//! ├── db/boxes.db
//! ├── logs/
//! └── boxes/<id>/
//!     ├── rootfs/
//!     └── shim.pid
//! ```

use std::path::{Path, PathBuf};

use boxlease_shared::constants::layout as names;
use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

#[derive(Clone, Debug)]
pub struct FilesystemLayout {
    home_dir: PathBuf,
}

impl FilesystemLayout {
    pub fn new(home_dir: PathBuf) -> Self {
        Self { home_dir }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn db_dir(&self) -> PathBuf {
        self.home_dir.join(names::DB_DIR)
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir().join(names::DB_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join(names::LOGS_DIR)
    }

    pub fn boxes_dir(&self) -> PathBuf {
        self.home_dir.join(names::BOXES_DIR)
    }

    pub fn box_layout(&self, box_id: &str) -> BoxFilesystemLayout {
        BoxFilesystemLayout::new(self.boxes_dir().join(box_id))
    }

    /// Create the top-level directories.
    pub fn prepare(&self) -> BoxleaseResult<()> {
        for dir in [self.db_dir(), self.logs_dir(), self.boxes_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                BoxleaseError::Storage(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

/// Per-box directory.
#[derive(Clone, Debug)]
pub struct BoxFilesystemLayout {
    root: PathBuf,
}

impl BoxFilesystemLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rootfs_dir(&self) -> PathBuf {
        self.root.join(names::ROOTFS_DIR)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.root.join(names::PID_FILE)
    }

    pub fn prepare(&self) -> BoxleaseResult<()> {
        let rootfs = self.rootfs_dir();
        std::fs::create_dir_all(&rootfs).map_err(|e| {
            BoxleaseError::Storage(format!("failed to create {}: {}", rootfs.display(), e))
        })
    }

    /// Remove the whole box directory. Missing directories are not an error.
    pub fn cleanup(&self) -> BoxleaseResult<()> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BoxleaseError::Storage(format!(
                "failed to remove {}: {}",
                self.root.display(),
                e
            ))),
        }
    }
}
