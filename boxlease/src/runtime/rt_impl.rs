//! Runtime implementation shared by every runtime handle and box.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::Mutex;

use boxlease_shared::constants::layout as layout_const;
use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

use crate::db::{BoxStore, Database};
use crate::engine::ShimLauncher;
use crate::images::{ImageResolver, ImageSource};
use crate::metrics::{RuntimeMetrics, RuntimeMetricsStorage};
use crate::runtime::layout::FilesystemLayout;
use crate::runtime::lock::RuntimeLock;
use crate::runtime::options::{BoxOptions, BoxleaseOptions, ImageSpec};
use crate::runtime::types::{BoxIdGenerator, BoxStatus};
use crate::sandbox::{BoxConfig, BoxHandle, BoxImpl, BoxState, SharedBoxImpl};
use crate::util::{init_file_logging, is_process_alive, is_same_process};
use crate::{BoxID, BoxInfo};

pub type SharedRuntimeImpl = Arc<RuntimeImpl>;

/// Runtime state: lease, store, resolver, supervisor launcher and box cache.
///
/// Boxes hold a weak reference back, so dropping the last runtime handle
/// releases the lease even while box handles are alive.
pub struct RuntimeImpl {
    pub(crate) options: BoxleaseOptions,
    pub(crate) layout: FilesystemLayout,
    pub(crate) box_store: BoxStore,
    pub(crate) resolver: ImageResolver,
    pub(crate) launcher: ShimLauncher,
    pub(crate) runtime_metrics: RuntimeMetricsStorage,
    id_generator: BoxIdGenerator,
    /// One implementation per box, keyed by id.
    boxes: Mutex<HashMap<BoxID, SharedBoxImpl>>,
    lock: Mutex<Option<RuntimeLock>>,
    closed: AtomicBool,
}

impl RuntimeImpl {
    /// Validate, prepare the home, take the lease, open the store and recover.
    pub(crate) fn new(
        options: BoxleaseOptions,
        image_source: Arc<dyn ImageSource>,
    ) -> BoxleaseResult<SharedRuntimeImpl> {
        options.validate()?;

        let layout = FilesystemLayout::new(options.home_dir.clone());
        layout.prepare()?;

        if options.file_logging {
            init_file_logging(&layout.logs_dir(), layout_const::RUNTIME_LOG_PREFIX);
        }

        let lock = RuntimeLock::acquire(layout.home_dir())?;
        let box_store = BoxStore::new(Database::open(&layout.db_path())?);
        let resolver = ImageResolver::new(options.registries(), image_source);
        let launcher = ShimLauncher::new(options.shim.clone(), layout.home_dir().to_path_buf());

        let rt_impl = Arc::new(Self {
            options,
            layout,
            box_store,
            resolver,
            launcher,
            runtime_metrics: RuntimeMetricsStorage::new(),
            id_generator: BoxIdGenerator::new(),
            boxes: Mutex::new(HashMap::new()),
            lock: Mutex::new(Some(lock)),
            closed: AtomicBool::new(false),
        });

        rt_impl.recover_boxes()?;

        tracing::info!(
            home = %rt_impl.layout.home_dir().display(),
            registries = ?rt_impl.resolver.registries(),
            "Runtime started"
        );
        Ok(rt_impl)
    }

    pub(crate) fn ensure_open(&self) -> BoxleaseResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BoxleaseError::InvalidState("runtime closed".into()));
        }
        Ok(())
    }

    /// Reconcile persisted records with the processes actually running.
    ///
    /// Running records whose supervisor is still alive stay Running and are
    /// attached on first use. Every other active record becomes Failed.
    fn recover_boxes(&self) -> BoxleaseResult<()> {
        for (config, mut state) in self.box_store.list()? {
            if !state.status.is_active() {
                continue;
            }

            let alive = state
                .pid
                .map(|pid| is_process_alive(pid) && is_same_process(pid, &config.id))
                .unwrap_or(false);

            if state.status == BoxStatus::Running && alive {
                tracing::debug!(box_id = %config.id, pid = ?state.pid, "Box still running");
                continue;
            }

            tracing::warn!(
                box_id = %config.id,
                status = %state.status,
                pid = ?state.pid,
                "Supervisor not running, marking box failed"
            );
            state.mark_failed();
            self.box_store.save_state(&config.id, &state)?;

            let pid_file = self.layout.box_layout(&config.id).pid_file();
            if pid_file.exists()
                && let Err(e) = std::fs::remove_file(&pid_file)
            {
                tracing::warn!(
                    box_id = %config.id,
                    path = %pid_file.display(),
                    error = %e,
                    "Failed to remove stale PID file"
                );
            }
        }
        Ok(())
    }

    // ========================================================================
    // BOX OPERATIONS
    // ========================================================================

    pub(crate) async fn create(
        self: &Arc<Self>,
        options: BoxOptions,
        name: Option<String>,
    ) -> BoxleaseResult<BoxHandle> {
        self.ensure_open()?;
        options.validate(&self.options.defaults, &self.options.limits)?;

        if let Some(name) = &name {
            if name.trim().is_empty() {
                return Err(BoxleaseError::Config("box name cannot be empty".into()));
            }
            if self.box_store.name_exists(name)? {
                return Err(BoxleaseError::NameConflict(name.clone()));
            }
        }

        let (image, rootfs) = match &options.image {
            ImageSpec::Image(reference) => (self.resolver.resolve(reference).await?.reference, None),
            ImageSpec::Rootfs(path) => {
                let path = std::fs::canonicalize(path).map_err(|e| {
                    BoxleaseError::Config(format!(
                        "rootfs directory {} is not usable: {}",
                        path.display(),
                        e
                    ))
                })?;
                if !path.is_dir() {
                    return Err(BoxleaseError::Config(format!(
                        "rootfs {} is not a directory",
                        path.display()
                    )));
                }
                (ImageSpec::Rootfs(path.clone()).to_string(), Some(path))
            }
        };

        let (cpus, memory_mib) = options.resources(&self.options.defaults, &self.options.limits);
        let id = self.id_generator.next_id()?;
        let box_layout = self.layout.box_layout(&id);
        box_layout.prepare()?;

        let config = BoxConfig {
            id: id.clone(),
            name,
            created_at: Utc::now(),
            image,
            cpus,
            memory_mib,
            box_home: box_layout.root().to_path_buf(),
            rootfs_dir: rootfs.unwrap_or_else(|| box_layout.rootfs_dir()),
            options,
        };
        let state = BoxState::new();

        if let Err(e) = self.box_store.add(&config, &state) {
            if let Err(cleanup_err) = box_layout.cleanup() {
                tracing::warn!(box_id = %id, error = %cleanup_err, "Failed to clean up box directory");
            }
            return Err(e);
        }
        self.runtime_metrics.record_created();

        let box_impl = Arc::new(BoxImpl::new(config, state, self));
        self.boxes.lock().insert(id.clone(), Arc::clone(&box_impl));

        box_impl.launch().await?;

        tracing::info!(box_id = %id, image = %box_impl.config.image, "Created box");
        Ok(BoxHandle::new(box_impl))
    }

    /// Shared implementation for a box, loading it from the store on first use.
    fn box_impl(self: &Arc<Self>, id_or_name: &str) -> BoxleaseResult<Option<SharedBoxImpl>> {
        self.ensure_open()?;

        if let Some(cached) = self
            .boxes
            .lock()
            .values()
            .find(|b| b.id() == id_or_name || b.config.name.as_deref() == Some(id_or_name))
        {
            return Ok(Some(Arc::clone(cached)));
        }

        let Some((config, state)) = self.box_store.find(id_or_name)? else {
            return Ok(None);
        };

        let mut boxes = self.boxes.lock();
        let box_impl = boxes
            .entry(config.id.clone())
            .or_insert_with(|| Arc::new(BoxImpl::new(config, state, self)));
        Ok(Some(Arc::clone(box_impl)))
    }

    pub(crate) fn get(self: &Arc<Self>, id_or_name: &str) -> BoxleaseResult<Option<BoxHandle>> {
        Ok(self.box_impl(id_or_name)?.map(BoxHandle::new))
    }

    pub(crate) fn get_info(&self, id_or_name: &str) -> BoxleaseResult<Option<BoxInfo>> {
        self.ensure_open()?;
        Ok(self
            .box_store
            .find(id_or_name)?
            .map(|(config, state)| BoxInfo::new(&config, &state)))
    }

    pub(crate) fn list_info(&self) -> BoxleaseResult<Vec<BoxInfo>> {
        self.ensure_open()?;
        Ok(self
            .box_store
            .list()?
            .iter()
            .map(|(config, state)| BoxInfo::new(config, state))
            .collect())
    }

    pub(crate) fn metrics(&self) -> RuntimeMetrics {
        RuntimeMetrics::new(self.runtime_metrics.clone())
    }

    /// Remove a box. `force` stops a running box first.
    pub(crate) async fn remove(self: &Arc<Self>, id_or_name: &str, force: bool) -> BoxleaseResult<()> {
        let box_impl = self
            .box_impl(id_or_name)?
            .ok_or_else(|| BoxleaseError::NotFound(format!("box {}", id_or_name)))?;
        let id = box_impl.id().clone();

        match box_impl.status() {
            BoxStatus::Running if force => {
                box_impl.stop().await?;
                // Stop already removed auto-remove boxes.
                if self.box_store.find(&id)?.is_none() {
                    return Ok(());
                }
            }
            status if !status.can_remove() => {
                return Err(BoxleaseError::InvalidState(format!(
                    "cannot remove box {} while it is {}; stop it first or use force",
                    id, status
                )));
            }
            _ => {}
        }

        self.remove_box(&id)
    }

    /// Delete a stopped or failed box: record, cache entry and workspace.
    pub(crate) fn remove_box(&self, id: &str) -> BoxleaseResult<()> {
        let Some((_, state)) = self.box_store.find(id)? else {
            return Err(BoxleaseError::NotFound(format!("box {}", id)));
        };
        if !state.status.can_remove() {
            return Err(BoxleaseError::InvalidState(format!(
                "cannot remove box {} while it is {}",
                id, state.status
            )));
        }

        self.box_store.remove(id)?;
        if let Some(removed) = self.boxes.lock().remove(id) {
            removed.mark_removed();
        }

        if let Err(e) = self.layout.box_layout(id).cleanup() {
            tracing::warn!(box_id = %id, error = %e, "Failed to remove box directory");
        }

        tracing::info!(box_id = %id, "Removed box");
        Ok(())
    }

    /// Stop boxes tied to this runtime and release the lease.
    ///
    /// Detached boxes keep running. Idempotent.
    pub(crate) async fn shutdown(&self) -> BoxleaseResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }

        let boxes: Vec<SharedBoxImpl> = self.boxes.lock().values().cloned().collect();
        for box_impl in boxes {
            if let Err(e) = box_impl.shutdown().await {
                tracing::warn!(box_id = %box_impl.id(), error = %e, "Failed to stop box during shutdown");
            }
        }

        self.closed.store(true, Ordering::Release);
        self.boxes.lock().clear();
        if let Some(lock) = self.lock.lock().take() {
            lock.release();
        }

        tracing::info!(home = %self.layout.home_dir().display(), "Runtime shut down");
        Ok(())
    }
}
