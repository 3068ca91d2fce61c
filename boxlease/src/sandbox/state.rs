//! Box lifecycle status and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

/// Lifecycle status of a box.
///
/// ```text
/// create()              → Starting → Running
/// supervisor crash      → Running  → Failed
/// stop()                → Running  → Stopped
/// exec() on stopped box → Stopped  → Starting → Running
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxStatus {
    /// Supervisor is being spawned.
    Starting,

    /// Supervisor is alive and commands can run.
    Running,

    /// Supervisor was stopped on purpose. The box can restart.
    Stopped,

    /// Supervisor died or never came up. Only removal is possible.
    Failed,
}

impl BoxStatus {
    /// Whether a supervisor is (or should be) alive.
    pub fn is_active(&self) -> bool {
        matches!(self, BoxStatus::Starting | BoxStatus::Running)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, BoxStatus::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, BoxStatus::Stopped)
    }

    /// exec() is accepted; a stopped box restarts first.
    pub fn can_exec(&self) -> bool {
        matches!(self, BoxStatus::Running | BoxStatus::Stopped)
    }

    pub fn can_remove(&self) -> bool {
        matches!(self, BoxStatus::Stopped | BoxStatus::Failed)
    }

    pub fn can_transition_to(&self, target: BoxStatus) -> bool {
        use BoxStatus::*;
        matches!(
            (self, target),
            (Starting, Running) | (Starting, Failed) | (Running, Stopped) | (Running, Failed) | (Stopped, Starting)
        )
    }

    /// Convert to string for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            BoxStatus::Starting => "starting",
            BoxStatus::Running => "running",
            BoxStatus::Stopped => "stopped",
            BoxStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for BoxStatus {
    type Err = BoxleaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(BoxStatus::Starting),
            "running" => Ok(BoxStatus::Running),
            "stopped" => Ok(BoxStatus::Stopped),
            "failed" => Ok(BoxStatus::Failed),
            other => Err(BoxleaseError::Parse(format!("unknown box status '{}'", other))),
        }
    }
}

impl std::fmt::Display for BoxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Dynamic box state, persisted on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxState {
    pub status: BoxStatus,
    /// Pid of the supervising process.
    pub pid: Option<u32>,
    pub last_updated: DateTime<Utc>,
}

impl Default for BoxState {
    fn default() -> Self {
        Self::new()
    }
}

impl BoxState {
    /// Initial state for a new box.
    pub fn new() -> Self {
        Self {
            status: BoxStatus::Starting,
            pid: None,
            last_updated: Utc::now(),
        }
    }

    /// Attempt a validated transition.
    pub fn transition_to(&mut self, new_status: BoxStatus) -> BoxleaseResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(BoxleaseError::InvalidState(format!(
                "cannot transition from {} to {}",
                self.status, new_status
            )));
        }
        self.status = new_status;
        self.last_updated = Utc::now();
        Ok(())
    }

    pub fn set_pid(&mut self, pid: Option<u32>) {
        self.pid = pid;
        self.last_updated = Utc::now();
    }

    /// Record an abnormal termination. Valid from any active status.
    pub fn mark_failed(&mut self) {
        if self.status.is_active() {
            self.status = BoxStatus::Failed;
        }
        self.pid = None;
        self.last_updated = Utc::now();
    }
}
