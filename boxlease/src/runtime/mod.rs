pub(crate) mod layout;
pub(crate) mod lock;
pub mod options;
pub mod types;

mod core;
pub(crate) mod rt_impl;

pub use core::BoxleaseRuntime;
