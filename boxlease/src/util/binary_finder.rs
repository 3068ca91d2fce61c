//! Runtime binary discovery for boxlease-shim.
//!
//! Search order:
//!
//! 1. `BOXLEASE_RUNTIME_DIR` - explicit override (highest priority)
//! 2. the directory of the running executable
//! 3. that directory's parent (test binaries live in `target/<profile>/deps`)

use std::path::PathBuf;

use boxlease_shared::constants::env as const_env;
use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

/// Builder for configuring [`RuntimeBinaryFinder`] with custom search paths.
///
/// # Example
///
/// ```ignore
/// let finder = RuntimeBinaryFinder::builder()
///     .with_path("/custom/path")
///     .with_path("/another/path")
///     .build();
/// ```
#[derive(Default)]
pub struct BinaryFinderBuilder {
    search_paths: Vec<PathBuf>,
}

impl BinaryFinderBuilder {
    /// Add a search path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Build the finder.
    pub fn build(self) -> RuntimeBinaryFinder {
        RuntimeBinaryFinder {
            search_paths: self.search_paths,
        }
    }
}

/// Finds runtime binaries by searching configured paths in priority order.
///
/// ```ignore
/// let shim_path = RuntimeBinaryFinder::from_env().find("boxlease-shim")?;
/// ```
pub struct RuntimeBinaryFinder {
    search_paths: Vec<PathBuf>,
}

impl RuntimeBinaryFinder {
    /// Create a builder for custom configuration.
    pub fn builder() -> BinaryFinderBuilder {
        BinaryFinderBuilder::default()
    }

    /// Create a finder with the standard search paths.
    pub fn from_env() -> Self {
        let mut builder = Self::builder();

        if let Ok(runtime_dir) = std::env::var(const_env::RUNTIME_DIR) {
            for path in runtime_dir.split(':').filter(|s| !s.is_empty()) {
                builder = builder.with_path(path);
            }
        }

        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.to_path_buf()))
        {
            builder = builder.with_path(&exe_dir);
            if let Some(parent) = exe_dir.parent() {
                builder = builder.with_path(parent);
            }
        }

        builder.build()
    }

    /// Find a binary by name, searching all configured paths.
    pub fn find(&self, binary_name: &str) -> BoxleaseResult<PathBuf> {
        for search_path in &self.search_paths {
            let candidate = search_path.join(binary_name);
            tracing::debug!("Finding binary {:?} in path: {:?}", binary_name, candidate);
            if candidate.is_file() {
                tracing::debug!(binary = %candidate.display(), "Found binary");
                return Ok(candidate);
            }
        }

        let locations = self
            .search_paths
            .iter()
            .map(|p| format!("  - {}", p.join(binary_name).display()))
            .collect::<Vec<_>>()
            .join("\n");

        Err(BoxleaseError::Engine(format!(
            "Binary '{}' not found.\nSearched locations:\n{}",
            binary_name, locations
        )))
    }
}

/// Find a runtime binary with the default search configuration.
pub fn find_binary(binary_name: &str) -> BoxleaseResult<PathBuf> {
    RuntimeBinaryFinder::from_env().find(binary_name)
}
