//! Per-box metrics.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for one box, kept across restarts within a runtime.
#[derive(Clone, Debug, Default)]
pub(crate) struct BoxMetricsStorage {
    commands_executed: Arc<AtomicU64>,
    exec_errors: Arc<AtomicU64>,
}

impl BoxMetricsStorage {
    pub(crate) fn increment_commands_executed(&self) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_exec_errors(&self) {
        self.exec_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of a box's counters and its supervisor's resource usage.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BoxMetrics {
    /// Commands dispatched to this box by this runtime.
    pub commands_executed: u64,
    /// Dispatches that failed.
    pub exec_errors: u64,
    /// Supervisor CPU usage; `None` when no supervisor is running.
    pub cpu_percent: Option<f32>,
    /// Supervisor resident memory; `None` when no supervisor is running.
    pub memory_bytes: Option<u64>,
}

impl BoxMetrics {
    pub(crate) fn from_storage(
        storage: &BoxMetricsStorage,
        cpu_percent: Option<f32>,
        memory_bytes: Option<u64>,
    ) -> Self {
        Self {
            commands_executed: storage.commands_executed.load(Ordering::Relaxed),
            exec_errors: storage.exec_errors.load(Ordering::Relaxed),
            cpu_percent,
            memory_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_counters() {
        let storage = BoxMetricsStorage::default();
        storage.increment_commands_executed();
        storage.increment_commands_executed();
        storage.increment_exec_errors();

        let snapshot = BoxMetrics::from_storage(&storage, Some(1.5), None);
        assert_eq!(snapshot.commands_executed, 2);
        assert_eq!(snapshot.exec_errors, 1);
        assert_eq!(snapshot.cpu_percent, Some(1.5));
        assert_eq!(snapshot.memory_bytes, None);
    }
}
