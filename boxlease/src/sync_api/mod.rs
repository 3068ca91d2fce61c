//! Synchronous facade.
//!
//! Every method hands the matching async operation to a [`Dispatcher`] and
//! blocks the calling thread until it completes. Do not call these from
//! async code; use [`BoxleaseRuntime`](crate::BoxleaseRuntime) there.

mod box_handle;
mod dispatcher;
mod execution;
mod runtime;

pub use box_handle::SyncBox;
pub use dispatcher::{Dispatcher, DispatcherState};
pub use execution::{SyncExecStderr, SyncExecStdin, SyncExecStdout, SyncExecution, SyncLines};
pub use runtime::SyncRuntime;
