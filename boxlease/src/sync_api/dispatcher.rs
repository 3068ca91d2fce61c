//! Dispatcher - runs async operations to completion for synchronous callers.
//!
//! A caller thread hands a future to the dispatcher and is suspended until
//! the future's output is ready. The future runs on an event loop the
//! dispatcher owns (a current-thread runtime on a dedicated thread) or on a
//! caller-supplied multi-thread runtime.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::thread::JoinHandle;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tokio::sync::oneshot;

use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

const LOOP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Dispatcher lifecycle. Moves forward only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherState {
    Unstarted,
    Running,
    Stopping,
    Terminated,
}

/// The dispatcher's own event loop thread.
struct OwnedLoop {
    stop_tx: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

/// Bridge from blocking callers to an async event loop.
///
/// ```rust,no_run
/// use boxlease::sync_api::Dispatcher;
///
/// let dispatcher = Dispatcher::new();
/// dispatcher.start()?;
/// let answer = dispatcher.run(async { 40 + 2 })?;
/// assert_eq!(answer, 42);
/// dispatcher.stop();
/// # Ok::<(), boxlease::BoxleaseError>(())
/// ```
pub struct Dispatcher {
    state: Mutex<DispatcherState>,
    handle: Mutex<Option<Handle>>,
    owned: Mutex<Option<OwnedLoop>>,
    /// Caller-supplied runtime; never shut down by the dispatcher.
    external: Option<Handle>,
}

impl Dispatcher {
    /// Dispatcher that owns its event loop.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DispatcherState::Unstarted),
            handle: Mutex::new(None),
            owned: Mutex::new(None),
            external: None,
        }
    }

    /// Dispatcher running operations on an existing multi-thread runtime.
    ///
    /// A current-thread runtime is rejected: it makes progress only while
    /// its owner blocks on it, which a suspended caller cannot do.
    pub fn with_handle(handle: Handle) -> BoxleaseResult<Self> {
        if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
            return Err(BoxleaseError::Config(
                "external runtime must be a multi-thread runtime".into(),
            ));
        }
        Ok(Self {
            state: Mutex::new(DispatcherState::Unstarted),
            handle: Mutex::new(None),
            owned: Mutex::new(None),
            external: Some(handle),
        })
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == DispatcherState::Running
    }

    /// Start the event loop. Returns once the loop is accepting work.
    ///
    /// Idempotent while running; a stopped dispatcher cannot be restarted.
    pub fn start(&self) -> BoxleaseResult<()> {
        let mut state = self.state.lock();
        match *state {
            DispatcherState::Running => return Ok(()),
            DispatcherState::Stopping | DispatcherState::Terminated => {
                return Err(BoxleaseError::InvalidState(
                    "dispatcher was stopped and cannot be restarted".into(),
                ));
            }
            DispatcherState::Unstarted => {}
        }

        let handle = match &self.external {
            Some(handle) => handle.clone(),
            None => {
                let (handle, owned) = spawn_loop()?;
                *self.owned.lock() = Some(owned);
                handle
            }
        };

        *self.handle.lock() = Some(handle);
        *state = DispatcherState::Running;
        tracing::debug!(external = self.external.is_some(), "Dispatcher started");
        Ok(())
    }

    /// Stop accepting work. In owned mode, cancel pending operations and
    /// join the loop thread. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                DispatcherState::Running => *state = DispatcherState::Stopping,
                DispatcherState::Unstarted => {
                    *state = DispatcherState::Terminated;
                    return;
                }
                DispatcherState::Stopping | DispatcherState::Terminated => return,
            }
        }

        self.handle.lock().take();

        if let Some(owned) = self.owned.lock().take() {
            let _ = owned.stop_tx.send(());
            if owned.thread.thread().id() == std::thread::current().id() {
                tracing::warn!("Dispatcher stopped from its own loop thread; not joining");
            } else if owned.thread.join().is_err() {
                tracing::warn!("Dispatcher loop thread panicked");
            }
        }

        *self.state.lock() = DispatcherState::Terminated;
        tracing::debug!("Dispatcher stopped");
    }

    /// Run `future` on the event loop and block until it completes.
    ///
    /// The output is returned unchanged, and a panic inside the future is
    /// resumed on the caller with its original payload. Fails with
    /// `InvalidState` when called from async code (including the loop
    /// itself), and with `LoopClosed` when the dispatcher is not running;
    /// the future is then dropped without being polled.
    pub fn run<F>(&self, future: F) -> BoxleaseResult<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if Handle::try_current().is_ok() {
            return Err(BoxleaseError::InvalidState(
                "cannot block on the dispatcher from inside an async context".into(),
            ));
        }

        let handle = if self.is_running() {
            self.handle.lock().clone()
        } else {
            None
        };
        let Some(handle) = handle else {
            drop(future);
            return Err(BoxleaseError::LoopClosed(
                "dispatcher is not running".into(),
            ));
        };

        let (tx, rx) = oneshot::channel();
        handle.spawn(async move {
            let outcome = AssertUnwindSafe(future).catch_unwind().await;
            let _ = tx.send(outcome);
        });

        match rx.blocking_recv() {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(payload)) => std::panic::resume_unwind(payload),
            Err(_) => Err(BoxleaseError::LoopClosed(
                "dispatcher stopped before the operation completed".into(),
            )),
        }
    }

    /// [`run`](Self::run) for fallible operations, flattening the result.
    pub fn run_sync<F, T>(&self, future: F) -> BoxleaseResult<T>
    where
        F: Future<Output = BoxleaseResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.run(future)?
    }
}

/// Spawn the loop thread and wait until the loop itself reports ready.
fn spawn_loop() -> BoxleaseResult<(Handle, OwnedLoop)> {
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<Handle, String>>();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let thread = std::thread::Builder::new()
        .name("boxlease-dispatcher".into())
        .spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };

            runtime.block_on(async move {
                let _ = ready_tx.send(Ok(Handle::current()));
                let _ = stop_rx.await;
            });

            // Drops every task still pending.
            runtime.shutdown_timeout(LOOP_SHUTDOWN_TIMEOUT);
        })
        .map_err(|e| BoxleaseError::Engine(format!("Failed to spawn dispatcher thread: {}", e)))?;

    let handle = ready_rx
        .recv()
        .map_err(|_| BoxleaseError::Engine("dispatcher thread exited during startup".into()))?
        .map_err(|e| BoxleaseError::Engine(format!("Failed to build event loop: {}", e)))?;

    Ok((handle, OwnedLoop { stop_tx, thread }))
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state())
            .field("external", &self.external.is_some())
            .finish()
    }
}
