//! Configuration for the runtime and for individual boxes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use boxlease_shared::constants::{defaults, env as const_env, layout};
use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

/// Configuration options for [`BoxleaseRuntime`](crate::BoxleaseRuntime).
///
/// Every field has a default, so a JSON config file only needs the keys it
/// overrides.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxleaseOptions {
    /// State directory guarded by the lease. Must be absolute.
    pub home_dir: PathBuf,

    /// Registries tried, in order, for unqualified image references.
    /// Empty means `docker.io` only.
    pub image_registries: Vec<String>,

    pub defaults: BoxDefaults,

    pub limits: ResourceLimits,

    /// How to launch the supervisor. `None` searches for `boxlease-shim`.
    pub shim: Option<ShimCommand>,

    /// Write library logs to `<home>/logs`.
    pub file_logging: bool,
}

impl Default for BoxleaseOptions {
    fn default() -> Self {
        let home_dir = std::env::var(const_env::HOME)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
                path.push(layout::HOME_DIR);
                path
            });

        Self {
            home_dir,
            image_registries: Vec::new(),
            defaults: BoxDefaults::default(),
            limits: ResourceLimits::default(),
            shim: None,
            file_logging: true,
        }
    }
}

impl BoxleaseOptions {
    /// Options rooted at `home_dir`, everything else default.
    pub fn with_home(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
            ..Default::default()
        }
    }

    /// Registries in resolution order, falling back to `docker.io`.
    pub fn registries(&self) -> Vec<String> {
        if self.image_registries.is_empty() {
            vec![defaults::REGISTRY.to_string()]
        } else {
            self.image_registries.clone()
        }
    }

    pub(crate) fn validate(&self) -> BoxleaseResult<()> {
        if !self.home_dir.is_absolute() {
            return Err(BoxleaseError::Config(format!(
                "home_dir must be an absolute path, got {}",
                self.home_dir.display()
            )));
        }
        Ok(())
    }
}

/// Resources applied to boxes whose options leave them unset.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxDefaults {
    pub cpus: u8,
    pub memory_mib: u32,
}

impl Default for BoxDefaults {
    fn default() -> Self {
        Self {
            cpus: defaults::CPUS,
            memory_mib: defaults::MEMORY_MIB,
        }
    }
}

/// Host-imposed bounds on box resources.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_cpus: u8,
    pub min_memory_mib: u32,
    pub max_memory_mib: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::from_host()
    }
}

impl ResourceLimits {
    /// Bounds derived from the host's CPU count and physical memory.
    pub fn from_host() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(u8::MAX as usize) as u8;

        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        let total_mib = sys.total_memory() / (1024 * 1024);
        let max_memory_mib = if total_mib == 0 {
            u32::MAX
        } else {
            total_mib.min(u32::MAX as u64) as u32
        };

        Self {
            max_cpus: cpus,
            min_memory_mib: defaults::MIN_MEMORY_MIB,
            max_memory_mib,
        }
    }
}

/// Program and leading arguments used to start a supervisor.
///
/// The CLI points this at itself with the hidden `shim` subcommand.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShimCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ShimCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Where the box's file tree comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSpec {
    /// Resolve this reference against the configured registries.
    Image(String),
    /// Use an already prepared directory; no resolution.
    Rootfs(PathBuf),
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self::Image("alpine:latest".into())
    }
}

impl std::fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSpec::Image(r) => write!(f, "{}", r),
            ImageSpec::Rootfs(p) => write!(f, "rootfs:{}", p.display()),
        }
    }
}

/// Options used when creating a box.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxOptions {
    pub image: ImageSpec,
    pub cpus: Option<u8>,
    pub memory_mib: Option<u32>,
    /// Default working directory for commands, relative to the box root.
    pub working_dir: Option<String>,
    pub env: Vec<(String, String)>,
    /// Remove the record when the box stops.
    pub auto_remove: bool,
    /// Keep the box alive after the creating process exits.
    pub detach: bool,
}

impl Default for BoxOptions {
    fn default() -> Self {
        Self {
            image: ImageSpec::default(),
            cpus: None,
            memory_mib: None,
            working_dir: None,
            env: Vec::new(),
            auto_remove: true,
            detach: false,
        }
    }
}

impl BoxOptions {
    pub fn image(reference: impl Into<String>) -> Self {
        Self {
            image: ImageSpec::Image(reference.into()),
            ..Default::default()
        }
    }

    pub fn rootfs(path: impl Into<PathBuf>) -> Self {
        Self {
            image: ImageSpec::Rootfs(path.into()),
            ..Default::default()
        }
    }

    /// Effective cpus and memory. Unset values take the defaults, capped to
    /// what the host offers.
    pub fn resources(&self, defaults: &BoxDefaults, limits: &ResourceLimits) -> (u8, u32) {
        let cpus = self
            .cpus
            .unwrap_or_else(|| defaults.cpus.min(limits.max_cpus.max(1)));
        let memory_mib = self
            .memory_mib
            .unwrap_or_else(|| defaults.memory_mib.min(limits.max_memory_mib));
        (cpus, memory_mib)
    }

    /// Check flags and resources against the host bounds.
    pub fn validate(&self, defaults: &BoxDefaults, limits: &ResourceLimits) -> BoxleaseResult<()> {
        if self.auto_remove && self.detach {
            return Err(BoxleaseError::Config(
                "auto_remove=true is incompatible with detach=true: a detached box must not \
                 remove itself when the creating process exits"
                    .into(),
            ));
        }

        let (cpus, memory) = self.resources(defaults, limits);
        if cpus == 0 || cpus > limits.max_cpus {
            return Err(BoxleaseError::ResourceLimit(format!(
                "cpus must be between 1 and {}, got {}",
                limits.max_cpus, cpus
            )));
        }

        if memory < limits.min_memory_mib || memory > limits.max_memory_mib {
            return Err(BoxleaseError::ResourceLimit(format!(
                "memory_mib must be between {} and {}, got {}",
                limits.min_memory_mib, limits.max_memory_mib, memory
            )));
        }

        if let ImageSpec::Image(reference) = &self.image
            && reference.trim().is_empty()
        {
            return Err(BoxleaseError::Config("image reference is empty".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ResourceLimits {
        ResourceLimits {
            max_cpus: 4,
            min_memory_mib: 128,
            max_memory_mib: 4096,
        }
    }

    #[test]
    fn test_auto_remove_with_detach_rejected() {
        let opts = BoxOptions {
            detach: true,
            auto_remove: true,
            ..Default::default()
        };
        let err = opts.validate(&BoxDefaults::default(), &limits()).unwrap_err();
        assert!(matches!(err, BoxleaseError::Config(_)));
    }

    #[test]
    fn test_detach_without_auto_remove_accepted() {
        let opts = BoxOptions {
            detach: true,
            auto_remove: false,
            ..Default::default()
        };
        assert!(opts.validate(&BoxDefaults::default(), &limits()).is_ok());
    }

    #[test]
    fn test_resource_bounds() {
        let defaults = BoxDefaults::default();

        let too_many = BoxOptions {
            cpus: Some(8),
            ..Default::default()
        };
        assert!(matches!(
            too_many.validate(&defaults, &limits()),
            Err(BoxleaseError::ResourceLimit(_))
        ));

        let zero = BoxOptions {
            cpus: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            zero.validate(&defaults, &limits()),
            Err(BoxleaseError::ResourceLimit(_))
        ));

        let tiny = BoxOptions {
            memory_mib: Some(16),
            ..Default::default()
        };
        assert!(matches!(
            tiny.validate(&defaults, &limits()),
            Err(BoxleaseError::ResourceLimit(_))
        ));

        let ok = BoxOptions {
            cpus: Some(4),
            memory_mib: Some(4096),
            ..Default::default()
        };
        assert!(ok.validate(&defaults, &limits()).is_ok());
    }

    #[test]
    fn test_defaults_capped_to_host() {
        let small_host = ResourceLimits {
            max_cpus: 2,
            min_memory_mib: 128,
            max_memory_mib: 1024,
        };
        let defaults = BoxDefaults {
            cpus: 4,
            memory_mib: 2048,
        };

        let opts = BoxOptions::default();
        assert_eq!(opts.resources(&defaults, &small_host), (2, 1024));
        assert!(opts.validate(&defaults, &small_host).is_ok());

        // Explicit values are never adjusted.
        let explicit = BoxOptions {
            memory_mib: Some(2048),
            ..Default::default()
        };
        assert!(matches!(
            explicit.validate(&defaults, &small_host),
            Err(BoxleaseError::ResourceLimit(_))
        ));
    }

    #[test]
    fn test_registries_fallback() {
        let mut opts = BoxleaseOptions::with_home("/tmp/x");
        assert_eq!(opts.registries(), vec!["docker.io".to_string()]);

        opts.image_registries = vec!["ghcr.io".into(), "quay.io".into()];
        assert_eq!(opts.registries(), vec!["ghcr.io", "quay.io"]);
    }

    #[test]
    fn test_relative_home_rejected() {
        let opts = BoxleaseOptions::with_home("relative/home");
        assert!(matches!(opts.validate(), Err(BoxleaseError::Config(_))));
    }

    #[test]
    fn test_options_deserialize_partial() {
        let opts: BoxleaseOptions = serde_json::from_str(
            r#"{"home_dir": "/srv/boxlease", "image_registries": ["quay.io"]}"#,
        )
        .unwrap();
        assert_eq!(opts.home_dir, PathBuf::from("/srv/boxlease"));
        assert_eq!(opts.image_registries, vec!["quay.io"]);
        assert_eq!(opts.defaults.cpus, 1);
        assert!(opts.file_logging);
    }

    #[test]
    fn test_image_spec_display() {
        assert_eq!(ImageSpec::Image("alpine".into()).to_string(), "alpine");
        assert_eq!(
            ImageSpec::Rootfs(PathBuf::from("/srv/root")).to_string(),
            "rootfs:/srv/root"
        );
    }
}
