//! Boxlease - leased sandbox runtime.
//!
//! A home directory holds persistent box records and is guarded by an
//! exclusive lease: at most one [`BoxleaseRuntime`] per directory, across
//! processes. Boxes outlive the runtime that created them and are reattached
//! by whichever runtime holds the lease next. [`sync_api`] exposes the same
//! operations to blocking callers through a dispatcher thread.

mod db;
mod engine;
mod images;
mod metrics;
mod runtime;
mod sandbox;
pub mod sync_api;
pub mod util;

pub use engine::SupervisorMetrics;
pub use engine::shim;
pub use images::{
    ImageReference, ImageResolver, ImageSource, OciRegistrySource, ResolvedImage,
    StaticImageSource,
};
pub use metrics::{BoxMetrics, RuntimeMetrics};
pub use runtime::BoxleaseRuntime;
pub use runtime::options::{
    BoxDefaults, BoxOptions, BoxleaseOptions, ImageSpec, ResourceLimits, ShimCommand,
};
pub use runtime::types::{BoxID, BoxInfo};
pub use sandbox::{
    BoxCommand, BoxConfig, BoxHandle, BoxState, BoxStatus, ExecOutput, ExecResult, ExecStderr,
    ExecStdin, ExecStdout, Execution, ExecutionId,
};

pub use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};
