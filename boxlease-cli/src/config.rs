//! Runtime options loaded from a JSON file (`--config`).

use std::path::Path;

use anyhow::Context;
use boxlease::BoxleaseOptions;

/// Read options from `path`. Keys left out keep their defaults.
pub fn load_config(path: &Path) -> anyhow::Result<BoxleaseOptions> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let options: BoxleaseOptions = serde_json::from_str(&content)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Loaded config file");
    Ok(options)
}
