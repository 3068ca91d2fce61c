//! Box supervision.
//!
//! Every box is represented on the host by a supervisor process
//! (`boxlease-shim`). The runtime spawns it, tracks it by pid across
//! processes, and stops it. Commands run under the box's root directory.

mod handler;
mod launcher;
pub mod shim;
mod spawn;

pub(crate) use handler::ShimHandler;
pub(crate) use launcher::ShimLauncher;
pub(crate) use spawn::{ExecSpec, spawn_execution};

use boxlease_shared::errors::BoxleaseResult;

/// Resource usage of a supervisor process.
#[derive(Clone, Debug, Default)]
pub struct SupervisorMetrics {
    pub cpu_percent: Option<f32>,
    pub memory_bytes: Option<u64>,
}

/// Runtime operations on a live supervisor.
pub(crate) trait Supervisor: Send {
    fn pid(&self) -> u32;

    /// Stop the supervisor: graceful signal first, forced kill after a grace period.
    fn stop(&mut self) -> BoxleaseResult<()>;

    fn metrics(&self) -> BoxleaseResult<SupervisorMetrics>;

    fn is_running(&mut self) -> bool;
}
