//! Image reference handling and registry resolution.
//!
//! Resolution only confirms that a reference exists and pins it to a fully
//! qualified name; fetching layers belongs to the execution environment.

mod reference;
mod resolver;
mod source;

pub use reference::ImageReference;
pub use resolver::{ImageResolver, ResolvedImage};
pub use source::{ImageSource, OciRegistrySource, StaticImageSource};
