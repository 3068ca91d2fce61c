//! Box implementation - holds config, state, and lazily attached supervision.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};

use boxlease_shared::constants::env as env_const;
use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

use super::config::BoxConfig;
use super::exec::{BoxCommand, ExecOutput, Execution};
use super::state::{BoxState, BoxStatus};
use crate::engine::{ExecSpec, ShimHandler, Supervisor, SupervisorMetrics, spawn_execution};
use crate::metrics::{BoxMetrics, BoxMetricsStorage};
use crate::runtime::rt_impl::{RuntimeImpl, SharedRuntimeImpl};
use crate::{BoxID, BoxInfo};

/// Shared reference to BoxImpl.
pub(crate) type SharedBoxImpl = Arc<BoxImpl>;

const LOG_TAIL_LINES: &str = "20";

/// How long a killed command gets to exit before stop moves on.
const EXEC_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Live supervision of a running box.
pub(crate) struct LiveState {
    handler: Box<dyn Supervisor>,
    /// Commands this runtime started in the box; finished ones are pruned lazily.
    executions: Vec<Execution>,
}

impl LiveState {
    fn new(handler: Box<dyn Supervisor>) -> Self {
        Self {
            handler,
            executions: Vec::new(),
        }
    }

    fn track(&mut self, execution: &Execution) {
        self.executions.retain(|e| !e.is_finished());
        self.executions.push(execution.clone());
    }
}

/// Box implementation - one per box per runtime.
///
/// Config and state are always available. Supervision is attached on demand:
/// spawned at creation or restart, or attached by pid when the box was left
/// running by another process.
pub(crate) struct BoxImpl {
    pub(crate) config: BoxConfig,
    pub(crate) state: RwLock<BoxState>,
    runtime: Weak<RuntimeImpl>,
    /// Held across start/stop so concurrent callers never launch twice.
    live: Mutex<Option<LiveState>>,
    metrics: BoxMetricsStorage,
    /// Whether the runtime's running gauge currently counts this box.
    counted_running: AtomicBool,
    /// Set once the record is deleted; the handle is dead from then on.
    removed: AtomicBool,
}

impl BoxImpl {
    pub(crate) fn new(config: BoxConfig, state: BoxState, runtime: &SharedRuntimeImpl) -> Self {
        Self {
            config,
            state: RwLock::new(state),
            runtime: Arc::downgrade(runtime),
            live: Mutex::new(None),
            metrics: BoxMetricsStorage::default(),
            counted_running: AtomicBool::new(false),
            removed: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> &BoxID {
        &self.config.id
    }

    pub(crate) fn info(&self) -> BoxInfo {
        let state = self.state.read();
        BoxInfo::new(&self.config, &state)
    }

    pub(crate) fn status(&self) -> BoxStatus {
        self.state.read().status
    }

    /// Called by the runtime once the record is deleted.
    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    fn runtime(&self) -> BoxleaseResult<SharedRuntimeImpl> {
        if self.removed.load(Ordering::Acquire) {
            return Err(BoxleaseError::NotFound(format!("box {}", self.id())));
        }
        let runtime = self
            .runtime
            .upgrade()
            .ok_or_else(|| BoxleaseError::InvalidState("runtime closed".into()))?;
        runtime.ensure_open()?;
        Ok(runtime)
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Launch the supervisor of a freshly persisted (Starting) box.
    pub(crate) async fn launch(&self) -> BoxleaseResult<()> {
        let runtime = self.runtime()?;
        let mut live = self.live.lock().await;
        *live = Some(self.spawn_supervisor(&runtime).await?);
        Ok(())
    }

    /// Make sure the box is running, restarting a stopped one.
    pub(crate) async fn start(&self) -> BoxleaseResult<()> {
        let runtime = self.runtime()?;
        self.live_state(&runtime).await.map(|_| ())
    }

    /// Live supervision for this box, restarting or attaching as needed.
    ///
    /// Failed boxes are not runnable; a box still starting is rejected.
    async fn live_state(
        &self,
        runtime: &RuntimeImpl,
    ) -> BoxleaseResult<MutexGuard<'_, Option<LiveState>>> {
        let mut live = self.live.lock().await;

        match self.status() {
            BoxStatus::Running => {
                let pid = self.state.read().pid;
                if live.is_none()
                    && let Some(pid) = pid
                {
                    tracing::debug!(box_id = %self.id(), pid, "Attaching to running supervisor");
                    *live = Some(LiveState::new(Box::new(ShimHandler::from_pid(
                        pid,
                        self.id().clone(),
                    ))));
                }

                let alive = live
                    .as_mut()
                    .map(|state| state.handler.is_running())
                    .unwrap_or(false);
                if alive {
                    self.set_running(runtime, true);
                } else {
                    if let Some(state) = live.take() {
                        terminate_executions(self.id(), state.executions).await;
                    }
                    tracing::warn!(box_id = %self.id(), "Supervisor is gone, marking box failed");
                    self.mark_failed(runtime);
                    return Err(BoxleaseError::NotRunnable(format!(
                        "box {} failed: its supervisor is no longer running",
                        self.id()
                    )));
                }
            }
            BoxStatus::Stopped => {
                tracing::info!(box_id = %self.id(), "Restarting stopped box");
                // Persist first so a vanished record leaves the handle untouched.
                let mut next = self.state.read().clone();
                next.transition_to(BoxStatus::Starting)?;
                runtime.box_store.save_state(self.id(), &next)?;
                *self.state.write() = next;
                *live = Some(self.spawn_supervisor(runtime).await?);
            }
            BoxStatus::Failed => {
                return Err(BoxleaseError::NotRunnable(format!(
                    "box {} is in the failed state; remove it and create a new one",
                    self.id()
                )));
            }
            BoxStatus::Starting => {
                return Err(BoxleaseError::InvalidState(format!(
                    "box {} is still starting",
                    self.id()
                )));
            }
        }

        Ok(live)
    }

    /// Spawn the supervisor for a box in the Starting state and record the outcome.
    async fn spawn_supervisor(&self, runtime: &RuntimeImpl) -> BoxleaseResult<LiveState> {
        let launcher = runtime.launcher.clone();
        let layout = runtime.layout.box_layout(self.id());
        let config = self.config.clone();

        let spawned = tokio::task::spawn_blocking(move || {
            layout.prepare()?;
            launcher.spawn(&config, &layout)
        })
        .await
        .map_err(|e| BoxleaseError::Internal(format!("supervisor spawn task failed: {}", e)))
        .and_then(|result| result);

        match spawned {
            Ok(handler) => {
                {
                    let mut state = self.state.write();
                    state.set_pid(Some(handler.pid()));
                    state.transition_to(BoxStatus::Running)?;
                    runtime.box_store.save_state(self.id(), &state)?;
                }
                self.set_running(runtime, true);
                Ok(LiveState::new(Box::new(handler)))
            }
            Err(e) => {
                tracing::error!(box_id = %self.id(), error = %e, "Failed to start box");
                self.mark_failed(runtime);
                Err(e)
            }
        }
    }

    fn mark_failed(&self, runtime: &RuntimeImpl) {
        {
            let mut state = self.state.write();
            state.mark_failed();
            if let Err(e) = runtime.box_store.save_state(self.id(), &state) {
                tracing::warn!(box_id = %self.id(), error = %e, "Failed to persist failed state");
            }
        }
        self.set_running(runtime, false);
        runtime.runtime_metrics.record_failed();
    }

    /// Keep the runtime's running gauge in step with this box.
    fn set_running(&self, runtime: &RuntimeImpl, running: bool) {
        if self.counted_running.swap(running, Ordering::AcqRel) == running {
            return;
        }
        if running {
            runtime.runtime_metrics.record_running();
        } else {
            runtime.runtime_metrics.record_not_running();
        }
    }

    pub(crate) async fn stop(&self) -> BoxleaseResult<()> {
        let runtime = self.runtime()?;
        let mut live = self.live.lock().await;

        match self.status() {
            // Idempotent: prevents double-counting
            BoxStatus::Stopped => return Ok(()),
            BoxStatus::Running => {}
            BoxStatus::Failed => {
                // Nothing left to stop; auto-remove still applies.
                drop(live);
                if self.config.options.auto_remove {
                    runtime.remove_box(self.id())?;
                }
                return Ok(());
            }
            BoxStatus::Starting => {
                return Err(BoxleaseError::InvalidState(format!(
                    "box {} is still starting",
                    self.id()
                )));
            }
        }

        // Commands go first: a stopped box runs nothing.
        let handler = match live.take() {
            Some(state) => {
                terminate_executions(self.id(), state.executions).await;
                Some(state.handler)
            }
            None => self.state.read().pid.map(|pid| {
                Box::new(ShimHandler::from_pid(pid, self.id().clone())) as Box<dyn Supervisor>
            }),
        };

        if let Some(mut handler) = handler
            && handler.is_running()
        {
            tokio::task::spawn_blocking(move || handler.stop())
                .await
                .map_err(|e| BoxleaseError::Internal(format!("supervisor stop task failed: {}", e)))??;
        }

        let pid_file = runtime.layout.box_layout(self.id()).pid_file();
        if pid_file.exists()
            && let Err(e) = std::fs::remove_file(&pid_file)
        {
            tracing::warn!(
                box_id = %self.id(),
                path = %pid_file.display(),
                error = %e,
                "Failed to remove PID file"
            );
        }

        {
            let mut state = self.state.write();
            state.set_pid(None);
            state.transition_to(BoxStatus::Stopped)?;
            match runtime.box_store.save_state(self.id(), &state) {
                Ok(()) => {}
                Err(BoxleaseError::NotFound(_)) => {
                    tracing::debug!(box_id = %self.id(), "Box already removed during stop");
                }
                Err(e) => return Err(e),
            }
        }
        drop(live);

        tracing::info!(box_id = %self.id(), "Stopped box");
        self.set_running(&runtime, false);
        runtime.runtime_metrics.record_stopped();

        if self.config.options.auto_remove {
            runtime.remove_box(self.id())?;
        }

        Ok(())
    }

    // ========================================================================
    // EXECUTION
    // ========================================================================

    pub(crate) async fn exec(&self, command: BoxCommand) -> BoxleaseResult<Execution> {
        let runtime = self.runtime()?;
        let result = self.dispatch(&runtime, command).await;

        self.metrics.increment_commands_executed();
        runtime.runtime_metrics.record_exec(result.is_err());
        if result.is_err() {
            self.metrics.increment_exec_errors();
        }

        result
    }

    /// Start `command` under live supervision and track it until stop.
    async fn dispatch(&self, runtime: &RuntimeImpl, command: BoxCommand) -> BoxleaseResult<Execution> {
        let mut live = self.live_state(runtime).await?;
        let execution = self.exec_spec(command).and_then(spawn_execution)?;
        if let Some(state) = live.as_mut() {
            state.track(&execution);
        }
        Ok(execution)
    }

    /// Resolve a command against the box root and environment.
    fn exec_spec(&self, command: BoxCommand) -> BoxleaseResult<ExecSpec> {
        let working_dir = command
            .working_dir
            .as_deref()
            .or(self.config.options.working_dir.as_deref());
        let cwd = resolve_in_root(&self.config.rootfs_dir, working_dir)?;
        std::fs::create_dir_all(&cwd).map_err(|e| {
            BoxleaseError::Storage(format!(
                "Failed to create working directory {}: {}",
                cwd.display(),
                e
            ))
        })?;

        let mut env = self.config.options.env.clone();
        env.extend(command.env);
        if !env.iter().any(|(k, _)| k == env_const::BOX_ID) {
            env.push((env_const::BOX_ID.to_string(), self.id().clone()));
        }

        Ok(ExecSpec {
            program: command.command,
            args: command.args,
            env,
            cwd,
            timeout: command.timeout,
            stdin: command.stdin,
        })
    }

    pub(crate) async fn run(&self, command: BoxCommand) -> BoxleaseResult<ExecOutput> {
        self.exec(command).await?.output().await
    }

    /// Poll `readiness` until it exits 0.
    ///
    /// On deadline the error carries the tail of `log_path` (read through the
    /// box), or the readiness command's last stderr when no log is available.
    pub(crate) async fn wait_until_ready(
        &self,
        readiness: BoxCommand,
        timeout: Duration,
        interval: Duration,
        log_path: Option<&str>,
    ) -> BoxleaseResult<()> {
        let deadline = Instant::now() + timeout;
        let mut last_error = String::new();

        loop {
            match self.run(readiness.clone()).await {
                Ok(output) if output.success() => {
                    tracing::debug!(box_id = %self.id(), "Readiness check passed");
                    return Ok(());
                }
                Ok(output) => last_error = output.stderr,
                Err(e @ BoxleaseError::NotRunnable(_)) => return Err(e),
                Err(e) => last_error = e.to_string(),
            }

            if Instant::now() + interval >= deadline {
                break;
            }
            tokio::time::sleep(interval).await;
        }

        let mut context = last_error;
        if let Some(path) = log_path
            && let Some(tail) = self.tail_log(path).await
        {
            context = tail;
        }

        Err(BoxleaseError::Timeout {
            message: format!(
                "box {} not ready after {}s ({})",
                self.id(),
                timeout.as_secs_f64(),
                readiness.display()
            ),
            context,
        })
    }

    async fn tail_log(&self, path: &str) -> Option<String> {
        let command = BoxCommand::new("tail")
            .args(["-n", LOG_TAIL_LINES, path.trim_start_matches('/')])
            .working_dir("/");
        match self.run(command).await {
            Ok(output) if output.success() && !output.stdout.is_empty() => Some(output.stdout),
            _ => None,
        }
    }

    // ========================================================================
    // METRICS
    // ========================================================================

    pub(crate) async fn metrics(&self) -> BoxleaseResult<BoxMetrics> {
        self.runtime()?;
        let live = self.live.lock().await;

        let (status, pid) = {
            let state = self.state.read();
            (state.status, state.pid)
        };
        let raw = match (live.as_ref(), pid) {
            (Some(state), _) => state.handler.metrics()?,
            (None, Some(pid)) if status == BoxStatus::Running => {
                ShimHandler::from_pid(pid, self.id().clone()).metrics()?
            }
            _ => SupervisorMetrics::default(),
        };

        Ok(BoxMetrics::from_storage(
            &self.metrics,
            raw.cpu_percent,
            raw.memory_bytes,
        ))
    }

    /// Runtime shutdown: a box tied to the runtime is stopped. A detached box
    /// keeps its supervisor, but commands this runtime started in it are killed.
    pub(crate) async fn shutdown(&self) -> BoxleaseResult<()> {
        if !self.config.options.detach && self.status() == BoxStatus::Running {
            return self.stop().await;
        }

        let mut live = self.live.lock().await;
        if let Some(state) = live.as_mut() {
            let executions = std::mem::take(&mut state.executions);
            terminate_executions(self.id(), executions).await;
        }
        Ok(())
    }
}

/// Kill commands still running and wait for each to exit.
async fn terminate_executions(box_id: &str, executions: Vec<Execution>) {
    for execution in executions.into_iter().filter(|e| !e.is_finished()) {
        tracing::debug!(box_id, command = %execution.command(), "Killing execution");
        if let Err(e) = execution.kill().await {
            tracing::warn!(box_id, error = %e, "Failed to kill execution");
            continue;
        }
        if tokio::time::timeout(EXEC_KILL_TIMEOUT, execution.wait())
            .await
            .is_err()
        {
            tracing::warn!(box_id, command = %execution.command(), "Execution did not exit after kill");
        }
    }
}

/// Join `dir` under `root`, treating `dir` as absolute inside the box.
fn resolve_in_root(root: &Path, dir: Option<&str>) -> BoxleaseResult<PathBuf> {
    let mut resolved = root.to_path_buf();
    let Some(dir) = dir else {
        return Ok(resolved);
    };

    for component in Path::new(dir).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(BoxleaseError::Config(format!(
                    "working directory must stay inside the box: {}",
                    dir
                )));
            }
        }
    }
    Ok(resolved)
}
