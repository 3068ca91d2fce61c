use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BoxID;
use crate::runtime::options::BoxOptions;

/// Static box configuration, set once at creation and persisted.
///
/// Dynamic state lives in [`BoxState`](super::BoxState).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxConfig {
    pub id: BoxID,
    /// Unique among live records when set.
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Fully qualified image reference, or `rootfs:<path>`.
    pub image: String,
    /// Resolved from options and runtime defaults.
    pub cpus: u8,
    pub memory_mib: u32,
    /// User options kept for restart.
    pub options: BoxOptions,
    pub box_home: PathBuf,
    /// Root directory commands run under.
    pub rootfs_dir: PathBuf,
}
