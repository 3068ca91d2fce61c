//! Error taxonomy for every boxlease operation.

use thiserror::Error;

/// Result alias used across all boxlease crates.
pub type BoxleaseResult<T> = Result<T, BoxleaseError>;

/// All errors surfaced by the runtime, the synchronous facade and the supervisor.
///
/// Creation-time validation failures (`ImageResolution`, `NameConflict`,
/// `ResourceLimit`) are not retryable without changing the inputs.
#[derive(Debug, Error)]
pub enum BoxleaseError {
    /// Another live runtime holds the exclusive lease on the home directory.
    #[error(
        "another runtime already holds the lease on {0}; dispose of it or use a different home directory"
    )]
    LeaseHeld(String),

    /// No configured registry could resolve the image reference.
    #[error("failed to resolve image '{reference}' (tried: {})", attempts.join(", "))]
    ImageResolution {
        reference: String,
        attempts: Vec<String>,
    },

    #[error("box name '{0}' is already in use")]
    NameConflict(String),

    #[error("resource limit: {0}")]
    ResourceLimit(String),

    /// The box cannot run commands (it is in the failed state).
    #[error("box not runnable: {0}")]
    NotRunnable(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A command exited with a non-zero code.
    #[error("command '{command}' failed with exit code {exit_code}: {stderr}")]
    Execution {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A polling deadline passed. `context` carries diagnostics such as a log tail.
    #[error("{message}\n{context}")]
    Timeout { message: String, context: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("engine error: {0}")]
    Engine(String),

    /// The dispatcher loop is not running; the operation was discarded unstarted.
    #[error("dispatcher loop is closed: {0}")]
    LoopClosed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BoxleaseError {
    /// Process exit code conventionally associated with this error in the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            BoxleaseError::Execution { exit_code, .. } => *exit_code,
            BoxleaseError::NotFound(_) => 2,
            _ => 1,
        }
    }
}
