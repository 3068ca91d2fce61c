//! Synchronous runtime.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

use super::{Dispatcher, SyncBox};
use crate::images::ImageSource;
use crate::metrics::RuntimeMetrics;
use crate::runtime::options::{BoxOptions, BoxleaseOptions};
use crate::{BoxInfo, BoxleaseRuntime};

/// Runtime plus the dispatcher that drives it, while started.
struct Active {
    runtime: BoxleaseRuntime,
    dispatcher: Arc<Dispatcher>,
}

/// Blocking counterpart of [`BoxleaseRuntime`].
///
/// The lease is taken lazily by [`start`](Self::start) or the first
/// operation, and released by [`stop`](Self::stop) or on drop. A stopped
/// runtime can be started again.
///
/// ```rust,no_run
/// use boxlease::sync_api::SyncRuntime;
/// use boxlease::{BoxCommand, BoxOptions};
///
/// let runtime = SyncRuntime::with_defaults();
/// let sandbox = runtime.create(BoxOptions::image("alpine"), None)?;
/// let output = sandbox.run(BoxCommand::new("uname"))?;
/// print!("{}", output.stdout);
/// runtime.stop()?;
/// # Ok::<(), boxlease::BoxleaseError>(())
/// ```
pub struct SyncRuntime {
    options: BoxleaseOptions,
    image_source: Option<Arc<dyn ImageSource>>,
    external: Option<Handle>,
    active: Mutex<Option<Active>>,
}

impl SyncRuntime {
    pub fn new(options: BoxleaseOptions) -> Self {
        Self {
            options,
            image_source: None,
            external: None,
            active: Mutex::new(None),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BoxleaseOptions::default())
    }

    /// Resolve images through `source` instead of OCI registries.
    pub fn with_image_source(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.image_source = Some(source);
        self
    }

    /// Drive operations on an existing multi-thread runtime instead of an
    /// owned event loop.
    pub fn with_runtime_handle(mut self, handle: Handle) -> Self {
        self.external = Some(handle);
        self
    }

    pub fn is_started(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Acquire the lease and start the dispatcher. Idempotent.
    pub fn start(&self) -> BoxleaseResult<()> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Ok(());
        }

        let runtime = match &self.image_source {
            Some(source) => {
                BoxleaseRuntime::with_image_source(self.options.clone(), Arc::clone(source))?
            }
            None => BoxleaseRuntime::new(self.options.clone())?,
        };

        let dispatcher = match &self.external {
            Some(handle) => Dispatcher::with_handle(handle.clone())?,
            None => Dispatcher::new(),
        };
        // On failure the runtime drops here, releasing the lease.
        dispatcher.start()?;

        *active = Some(Active {
            runtime,
            dispatcher: Arc::new(dispatcher),
        });
        Ok(())
    }

    /// Shut the runtime down, stop the dispatcher and release the lease.
    ///
    /// Outstanding [`SyncBox`] handles fail with `LoopClosed` afterwards.
    pub fn stop(&self) -> BoxleaseResult<()> {
        let Some(active) = self.active.lock().take() else {
            return Ok(());
        };

        let runtime = active.runtime.clone();
        let result = active
            .dispatcher
            .run_sync(async move { runtime.shutdown().await });
        active.dispatcher.stop();

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Runtime shutdown incomplete");
        }
        result
    }

    fn active(&self) -> BoxleaseResult<(BoxleaseRuntime, Arc<Dispatcher>)> {
        self.start()?;
        let active = self.active.lock();
        let active = active
            .as_ref()
            .ok_or_else(|| BoxleaseError::InvalidState("runtime closed".into()))?;
        Ok((active.runtime.clone(), Arc::clone(&active.dispatcher)))
    }

    pub fn create(&self, options: BoxOptions, name: Option<String>) -> BoxleaseResult<SyncBox> {
        let (runtime, dispatcher) = self.active()?;
        let handle = dispatcher.run_sync(async move { runtime.create(options, name).await })?;
        Ok(SyncBox::new(handle, dispatcher))
    }

    pub fn get(&self, id_or_name: &str) -> BoxleaseResult<Option<SyncBox>> {
        let (runtime, dispatcher) = self.active()?;
        Ok(runtime
            .get(id_or_name)?
            .map(|handle| SyncBox::new(handle, dispatcher)))
    }

    pub fn get_info(&self, id_or_name: &str) -> BoxleaseResult<Option<BoxInfo>> {
        self.active()?.0.get_info(id_or_name)
    }

    pub fn list_info(&self) -> BoxleaseResult<Vec<BoxInfo>> {
        self.active()?.0.list_info()
    }

    pub fn metrics(&self) -> BoxleaseResult<RuntimeMetrics> {
        Ok(self.active()?.0.metrics())
    }

    pub fn remove(&self, id_or_name: &str, force: bool) -> BoxleaseResult<()> {
        let (runtime, dispatcher) = self.active()?;
        let id_or_name = id_or_name.to_string();
        dispatcher.run_sync(async move { runtime.remove(&id_or_name, force).await })
    }
}

impl Drop for SyncRuntime {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl std::fmt::Debug for SyncRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRuntime")
            .field("home_dir", &self.options.home_dir)
            .field("started", &self.is_started())
            .finish()
    }
}
