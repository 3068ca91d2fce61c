//! Synchronous box handle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use boxlease_shared::errors::BoxleaseResult;

use super::{Dispatcher, SyncExecution};
use crate::metrics::BoxMetrics;
use crate::sandbox::{BoxCommand, BoxHandle, ExecOutput};
use crate::{BoxID, BoxInfo};

/// Blocking counterpart of [`BoxHandle`].
#[derive(Clone)]
pub struct SyncBox {
    handle: BoxHandle,
    dispatcher: Arc<Dispatcher>,
}

impl SyncBox {
    pub(crate) fn new(handle: BoxHandle, dispatcher: Arc<Dispatcher>) -> Self {
        Self { handle, dispatcher }
    }

    /// Hand an operation on the async handle to the dispatcher.
    fn bridge<F, Fut, T>(&self, op: F) -> BoxleaseResult<T>
    where
        F: FnOnce(BoxHandle) -> Fut,
        Fut: Future<Output = BoxleaseResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.dispatcher.run_sync(op(self.handle.clone()))
    }

    pub fn id(&self) -> &BoxID {
        self.handle.id()
    }

    pub fn name(&self) -> Option<&str> {
        self.handle.name()
    }

    pub fn info(&self) -> BoxInfo {
        self.handle.info()
    }

    /// The async handle behind this one.
    pub fn handle(&self) -> &BoxHandle {
        &self.handle
    }

    pub fn exec(&self, command: BoxCommand) -> BoxleaseResult<SyncExecution> {
        let execution = self.bridge(|b| async move { b.exec(command).await })?;
        Ok(SyncExecution::new(execution, Arc::clone(&self.dispatcher)))
    }

    pub fn run(&self, command: BoxCommand) -> BoxleaseResult<ExecOutput> {
        self.bridge(|b| async move { b.run(command).await })
    }

    pub fn start(&self) -> BoxleaseResult<()> {
        self.bridge(|b| async move { b.start().await })
    }

    pub fn stop(&self) -> BoxleaseResult<()> {
        self.bridge(|b| async move { b.stop().await })
    }

    pub fn metrics(&self) -> BoxleaseResult<BoxMetrics> {
        self.bridge(|b| async move { b.metrics().await })
    }

    pub fn wait_until_ready(
        &self,
        readiness: BoxCommand,
        timeout: Duration,
        interval: Duration,
        log_path: Option<&str>,
    ) -> BoxleaseResult<()> {
        let log_path = log_path.map(str::to_string);
        self.bridge(|b| async move {
            b.wait_until_ready(readiness, timeout, interval, log_path.as_deref())
                .await
        })
    }
}

impl std::fmt::Debug for SyncBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBox")
            .field("id", self.id())
            .field("name", &self.name())
            .finish()
    }
}
