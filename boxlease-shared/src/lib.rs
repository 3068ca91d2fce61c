//! Boxlease Shared - Types used by the runtime library, the supervisor and the CLI.

pub mod constants;
pub mod errors;

pub use errors::{BoxleaseError, BoxleaseResult};
