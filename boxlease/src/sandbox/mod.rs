//! Boxes - individual box lifecycle, execution and state.

pub(crate) mod box_impl;
mod config;
mod exec;
mod state;

pub use config::BoxConfig;
pub use exec::{
    BoxCommand, ExecOutput, ExecResult, ExecStderr, ExecStdin, ExecStdout, Execution,
    ExecutionId,
};
pub use state::{BoxState, BoxStatus};

pub(crate) use box_impl::{BoxImpl, SharedBoxImpl};

use std::time::Duration;

use crate::metrics::BoxMetrics;
use crate::{BoxID, BoxInfo};
use boxlease_shared::errors::BoxleaseResult;

/// Handle to a box.
///
/// Cheap to clone. Every handle to the same box within a runtime shares one
/// implementation, so lifecycle operations through any of them are
/// serialized.
#[derive(Clone)]
pub struct BoxHandle {
    id: BoxID,
    name: Option<String>,
    inner: SharedBoxImpl,
}

impl BoxHandle {
    pub(crate) fn new(inner: SharedBoxImpl) -> Self {
        let id = inner.id().clone();
        let name = inner.config.name.clone();
        Self { id, name, inner }
    }

    pub fn id(&self) -> &BoxID {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Current info, without touching the supervisor.
    pub fn info(&self) -> BoxInfo {
        self.inner.info()
    }

    /// Start a command. A stopped box is restarted first.
    pub async fn exec(&self, command: BoxCommand) -> BoxleaseResult<Execution> {
        self.inner.exec(command).await
    }

    /// Run a command to completion, collecting stdout and stderr.
    pub async fn run(&self, command: BoxCommand) -> BoxleaseResult<ExecOutput> {
        self.inner.run(command).await
    }

    /// Start a stopped box. A no-op for a running one.
    pub async fn start(&self) -> BoxleaseResult<()> {
        self.inner.start().await
    }

    /// Stop the box. Removes it afterwards when created with `auto_remove`.
    pub async fn stop(&self) -> BoxleaseResult<()> {
        self.inner.stop().await
    }

    pub async fn metrics(&self) -> BoxleaseResult<BoxMetrics> {
        self.inner.metrics().await
    }

    /// Poll `readiness` every `interval` until it succeeds or `timeout` passes.
    ///
    /// `log_path` names a file inside the box whose tail is attached to the
    /// timeout error.
    pub async fn wait_until_ready(
        &self,
        readiness: BoxCommand,
        timeout: Duration,
        interval: Duration,
        log_path: Option<&str>,
    ) -> BoxleaseResult<()> {
        self.inner
            .wait_until_ready(readiness, timeout, interval, log_path)
            .await
    }
}

impl std::fmt::Debug for BoxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

// ============================================================================
// THREAD SAFETY ASSERTIONS
// ============================================================================

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<BoxHandle>;
    let _ = assert_send_sync::<Execution>;
};
