//! Core data types for box lifecycle management.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

pub use crate::sandbox::{BoxState, BoxStatus};

/// Box identifier (ULID format for sortability).
///
/// ULIDs are 26-character strings that encode a 48-bit millisecond timestamp
/// followed by 80 bits of randomness, so identifiers sort by creation time.
///
/// Example: `01HJK4TNRPQSXYZ8WM6NCVT9R5`
pub type BoxID = String;

/// Monotonic ULID source.
///
/// Two ids generated within the same millisecond still compare in generation
/// order, so every box created through one runtime sorts after the previous.
pub(crate) struct BoxIdGenerator {
    inner: Mutex<ulid::Generator>,
}

impl BoxIdGenerator {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(ulid::Generator::new()),
        }
    }

    pub(crate) fn next_id(&self) -> BoxleaseResult<BoxID> {
        self.inner
            .lock()
            .generate()
            .map(|id| id.to_string())
            .map_err(|e| BoxleaseError::Internal(format!("failed to generate box id: {}", e)))
    }
}

/// Public metadata about a box (returned by list and info operations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxInfo {
    pub id: BoxID,
    pub name: Option<String>,
    pub status: BoxStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Pid of the supervising process (None unless running).
    pub pid: Option<u32>,
    /// Image reference as resolved at creation, or `rootfs:<path>`.
    pub image: String,
    pub cpus: u8,
    pub memory_mib: u32,
    pub auto_remove: bool,
    pub detach: bool,
}

impl BoxInfo {
    pub(crate) fn new(config: &crate::sandbox::BoxConfig, state: &BoxState) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            status: state.status,
            created_at: config.created_at,
            last_updated: state.last_updated,
            pid: state.pid,
            image: config.image.clone(),
            cpus: config.cpus,
            memory_mib: config.memory_mib,
            auto_remove: config.options.auto_remove,
            detach: config.options.detach,
        }
    }
}
