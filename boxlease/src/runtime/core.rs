//! Public runtime handle.

use std::path::Path;
use std::sync::Arc;

use boxlease_shared::errors::BoxleaseResult;

use super::options::{BoxOptions, BoxleaseOptions};
use super::rt_impl::{RuntimeImpl, SharedRuntimeImpl};
use crate::images::{ImageSource, OciRegistrySource};
use crate::metrics::RuntimeMetrics;
use crate::sandbox::BoxHandle;
use crate::BoxInfo;

/// Async entry point: owns the lease on a home directory and manages its boxes.
///
/// Cheap to clone; clones share one lease. The lease is released by
/// [`shutdown`](Self::shutdown), or when the last clone is dropped.
///
/// ```rust,no_run
/// # async fn example() -> boxlease::BoxleaseResult<()> {
/// use boxlease::{BoxCommand, BoxOptions, BoxleaseOptions, BoxleaseRuntime};
///
/// let runtime = BoxleaseRuntime::new(BoxleaseOptions::default())?;
/// let sandbox = runtime.create(BoxOptions::image("alpine"), Some("worker".into())).await?;
/// let output = sandbox.run(BoxCommand::new("echo").arg("hello")).await?;
/// assert_eq!(output.stdout, "hello\n");
/// runtime.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BoxleaseRuntime {
    rt_impl: SharedRuntimeImpl,
}

impl BoxleaseRuntime {
    /// Create a runtime resolving images against OCI registries.
    ///
    /// Fails with `LeaseHeld` while another runtime (in any process) holds
    /// the same home directory.
    pub fn new(options: BoxleaseOptions) -> BoxleaseResult<Self> {
        Self::with_image_source(options, Arc::new(OciRegistrySource::new()))
    }

    /// Create a runtime with a custom image source.
    pub fn with_image_source(
        options: BoxleaseOptions,
        image_source: Arc<dyn ImageSource>,
    ) -> BoxleaseResult<Self> {
        Ok(Self {
            rt_impl: RuntimeImpl::new(options, image_source)?,
        })
    }

    /// Runtime on the default home directory.
    pub fn with_defaults() -> BoxleaseResult<Self> {
        Self::new(BoxleaseOptions::default())
    }

    pub fn home_dir(&self) -> &Path {
        self.rt_impl.layout.home_dir()
    }

    pub fn options(&self) -> &BoxleaseOptions {
        &self.rt_impl.options
    }

    /// Create a box and start its supervisor.
    pub async fn create(
        &self,
        options: BoxOptions,
        name: Option<String>,
    ) -> BoxleaseResult<BoxHandle> {
        self.rt_impl.create(options, name).await
    }

    /// Look up a box by id or name. Boxes left running by another process
    /// are reattached.
    pub fn get(&self, id_or_name: &str) -> BoxleaseResult<Option<BoxHandle>> {
        self.rt_impl.get(id_or_name)
    }

    pub fn get_info(&self, id_or_name: &str) -> BoxleaseResult<Option<BoxInfo>> {
        self.rt_impl.get_info(id_or_name)
    }

    /// All boxes, newest first.
    pub fn list_info(&self) -> BoxleaseResult<Vec<BoxInfo>> {
        self.rt_impl.list_info()
    }

    pub fn metrics(&self) -> RuntimeMetrics {
        self.rt_impl.metrics()
    }

    /// Remove a stopped or failed box. `force` stops a running box first.
    pub async fn remove(&self, id_or_name: &str, force: bool) -> BoxleaseResult<()> {
        self.rt_impl.remove(id_or_name, force).await
    }

    /// Stop non-detached boxes and release the lease.
    ///
    /// Every later operation on this runtime fails with `InvalidState`.
    pub async fn shutdown(&self) -> BoxleaseResult<()> {
        self.rt_impl.shutdown().await
    }
}

impl std::fmt::Debug for BoxleaseRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxleaseRuntime")
            .field("home_dir", &self.home_dir())
            .finish()
    }
}

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<BoxleaseRuntime>;
};
