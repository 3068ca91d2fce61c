//! Runtime-level metrics (aggregate across all boxes).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Storage for runtime-wide metrics.
///
/// Owned by the runtime and shared with every box it manages.
/// All counters are monotonic except the running gauge.
#[derive(Clone, Debug, Default)]
pub(crate) struct RuntimeMetricsStorage {
    /// Total boxes created since runtime startup
    pub(crate) boxes_created: Arc<AtomicU64>,
    /// Total boxes whose supervisor failed to start or died
    pub(crate) boxes_failed: Arc<AtomicU64>,
    /// Total boxes stopped (explicitly or via shutdown)
    pub(crate) boxes_stopped: Arc<AtomicU64>,
    /// Boxes this runtime launched, restarted or reattached that still run
    pub(crate) boxes_running: Arc<AtomicU64>,
    /// Total commands executed across all boxes
    pub(crate) total_commands: Arc<AtomicU64>,
    /// Total command execution errors across all boxes
    pub(crate) total_exec_errors: Arc<AtomicU64>,
}

impl RuntimeMetricsStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_created(&self) {
        self.boxes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.boxes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stopped(&self) {
        self.boxes_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_running(&self) {
        self.boxes_running.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_not_running(&self) {
        let _ = self
            .boxes_running
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub(crate) fn record_exec(&self, failed: bool) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.total_exec_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Handle for querying runtime-wide metrics.
///
/// Cloneable, lightweight handle (only Arc pointers).
/// Counters cover this runtime instance only and never reset.
#[derive(Clone, Debug)]
pub struct RuntimeMetrics {
    storage: RuntimeMetricsStorage,
}

impl RuntimeMetrics {
    /// Create new handle from storage.
    pub(crate) fn new(storage: RuntimeMetricsStorage) -> Self {
        Self { storage }
    }

    /// Total number of boxes created since runtime startup.
    ///
    /// Incremented when `BoxleaseRuntime::create()` persists a new box.
    /// Never decreases (monotonic counter).
    pub fn boxes_created_total(&self) -> u64 {
        self.storage.boxes_created.load(Ordering::Relaxed)
    }

    /// Total number of boxes that failed to start.
    ///
    /// Incremented when a supervisor fails to start, or is found dead.
    /// Never decreases (monotonic counter).
    pub fn boxes_failed_total(&self) -> u64 {
        self.storage.boxes_failed.load(Ordering::Relaxed)
    }

    /// Total number of boxes that have been stopped.
    ///
    /// Incremented when a running box is stopped.
    /// Never decreases (monotonic counter).
    pub fn boxes_stopped_total(&self) -> u64 {
        self.storage.boxes_stopped.load(Ordering::Relaxed)
    }

    /// Number of boxes currently running under this runtime.
    ///
    /// Counts boxes launched, restarted or reattached here, until they stop
    /// or fail. Boxes another process left running count once attached.
    pub fn num_running_boxes(&self) -> u64 {
        self.storage.boxes_running.load(Ordering::Relaxed)
    }

    /// Total commands executed across all boxes.
    ///
    /// Incremented on every dispatched `BoxHandle::exec()`.
    /// Never decreases (monotonic counter).
    pub fn total_commands_executed(&self) -> u64 {
        self.storage.total_commands.load(Ordering::Relaxed)
    }

    /// Total command execution errors across all boxes.
    ///
    /// Incremented when dispatching a command fails, including a box that
    /// could not be started for it.
    /// Never decreases (monotonic counter).
    pub fn total_exec_errors(&self) -> u64 {
        self.storage.total_exec_errors.load(Ordering::Relaxed)
    }
}
