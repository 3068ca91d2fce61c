//! CLI definition and argument parsing for boxlease-cli.
//! This module contains the main CLI structure, subcommands, and the flag
//! groups shared between them.

use std::io::Write;
use std::path::{Path, PathBuf};

use boxlease::sync_api::SyncRuntime;
use boxlease::{BoxCommand, BoxOptions, BoxleaseOptions, ShimCommand};
use boxlease_shared::constants::{env as const_env, shim as shim_const};
use clap::{Args, Command, Parser, Subcommand, ValueEnum};
use clap_complete::shells::{Bash, Fish, Zsh};

use crate::formatter::OutputFormat;

/// Helper to parse CLI environment variables and apply them to BoxOptions
pub fn apply_env_vars(env: &[String], opts: &mut BoxOptions) {
    apply_env_vars_with_lookup(env, opts, |k| std::env::var(k).ok())
}

/// Helper to parse CLI environment variables with custom lookup for host variables
pub fn apply_env_vars_with_lookup<F>(env: &[String], opts: &mut BoxOptions, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (k, v) in parse_env_vars(env, lookup) {
        opts.env.push((k, v));
    }
}

/// `KEY=VALUE` pairs, or `KEY` taken from the host. Unknown host keys are skipped.
fn parse_env_vars<F>(env: &[String], lookup: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    let mut pairs = Vec::with_capacity(env.len());
    for env_str in env {
        if let Some((k, v)) = env_str.split_once('=') {
            pairs.push((k.to_string(), v.to_string()));
        } else if let Some(val) = lookup(env_str) {
            pairs.push((env_str.to_string(), val));
        } else {
            tracing::warn!(
                "Environment variable '{}' not found on host, skipping",
                env_str
            );
        }
    }
    pairs
}

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "boxlease", author, version, about = "Boxlease CLI")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
#[non_exhaustive]
pub enum Commands {
    /// Create a box, run a command in it, then stop it
    Run(crate::commands::run::RunArgs),

    /// Execute a command in a box (a stopped box is restarted first)
    Exec(crate::commands::exec::ExecArgs),

    /// Create a new box
    Create(crate::commands::create::CreateArgs),

    /// List boxes
    #[command(visible_alias = "ls", visible_alias = "ps")]
    List(crate::commands::list::ListArgs),

    /// Remove one or more boxes
    Rm(crate::commands::rm::RmArgs),

    /// Start one or more stopped boxes
    Start(crate::commands::start::StartArgs),

    /// Stop one or more running boxes
    Stop(crate::commands::stop::StopArgs),

    /// Restart one or more boxes
    Restart(crate::commands::restart::RestartArgs),

    /// Show details of a box
    Info(crate::commands::info::InfoArgs),

    /// Show runtime counters
    Metrics(crate::commands::metrics::MetricsArgs),

    /// Generate shell completion script (hidden from help)
    #[command(hide = true)]
    Completion(CompletionArgs),
}

/// Shell for which to generate completion script.
#[derive(ValueEnum, Clone, Debug)]
#[value(rename_all = "lower")]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

/// Arguments for the completion subcommand.
#[derive(Args, Debug)]
pub struct CompletionArgs {
    /// Shell to generate completion for (bash, zsh, fish).
    pub shell: Shell,
}

/// Writes a completion script for the given shell to `out`.
pub fn generate_completion(shell: &Shell, cmd: &mut Command, name: &str, out: &mut dyn Write) {
    match shell {
        Shell::Bash => clap_complete::generate(Bash, cmd, name, out),
        Shell::Zsh => clap_complete::generate(Zsh, cmd, name, out),
        Shell::Fish => clap_complete::generate(Fish, cmd, name, out),
    }
}

// ============================================================================
// GLOBAL FLAGS
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Boxlease home directory
    #[arg(long, global = true, env = const_env::HOME)]
    pub home: Option<PathBuf>,

    /// Image registry to use (can be specified multiple times)
    #[arg(long, global = true, value_name = "REGISTRY")]
    pub registry: Vec<String>,

    /// Configuration file path (optional)
    ///
    /// JSON file with runtime options such as image_registries or defaults.
    /// If not provided, default options are used.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl GlobalFlags {
    /// Runtime options after layering config file, `--home` and `--registry`.
    pub fn runtime_options(&self) -> anyhow::Result<BoxleaseOptions> {
        let mut options = match &self.config {
            Some(config_path) => crate::config::load_config(config_path)?,
            None => BoxleaseOptions::default(),
        };

        // CLI --home overrides home_dir; relative paths are taken from the cwd
        if let Some(cli_home) = &self.home {
            options.home_dir = absolute(cli_home)?;
        }

        // CLI --registry prepends to image_registries (highest priority)
        if !self.registry.is_empty() {
            options.image_registries = self
                .registry
                .iter()
                .cloned()
                .chain(options.image_registries)
                .collect();
        }

        // Unless configured, supervisors are this binary running its hidden
        // `shim` subcommand.
        if options.shim.is_none() {
            let exe = std::env::current_exe()
                .map_err(|e| anyhow::anyhow!("cannot locate the boxlease executable: {}", e))?;
            options.shim = Some(ShimCommand::new(exe).arg(shim_const::SUBCOMMAND));
        }

        Ok(options)
    }

    /// Synchronous runtime. The lease is taken on first use.
    pub fn create_runtime(&self) -> anyhow::Result<SyncRuntime> {
        Ok(SyncRuntime::new(self.runtime_options()?))
    }
}

pub(crate) fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| anyhow::anyhow!("cannot resolve {}: {}", path.display(), e))?;
    Ok(cwd.join(path))
}

// ============================================================================
// PROCESS FLAGS
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct ProcessFlags {
    /// Set environment variables
    #[arg(short = 'e', long = "env")]
    pub env: Vec<String>,

    /// Working directory inside the box
    #[arg(short = 'w', long = "workdir")]
    pub workdir: Option<String>,

    /// Keep STDIN open and forward it to the command
    #[arg(short = 'i', long = "interactive")]
    pub interactive: bool,
}

impl ProcessFlags {
    /// Apply process configuration to BoxOptions
    pub fn apply_to(&self, opts: &mut BoxOptions) {
        opts.working_dir = self.workdir.clone();
        apply_env_vars(&self.env, opts);
    }

    /// Configures a BoxCommand with process flags (env, workdir, stdin)
    pub fn configure_command(&self, cmd: BoxCommand) -> BoxCommand {
        self.configure_command_with_lookup(cmd, |k| std::env::var(k).ok())
    }

    fn configure_command_with_lookup<F>(&self, mut cmd: BoxCommand, lookup: F) -> BoxCommand
    where
        F: Fn(&str) -> Option<String>,
    {
        for (k, v) in parse_env_vars(&self.env, lookup) {
            cmd = cmd.env(k, v);
        }
        if let Some(ref w) = self.workdir {
            cmd = cmd.working_dir(w);
        }
        cmd.interactive(self.interactive)
    }
}

// ============================================================================
// RESOURCE FLAGS
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct ResourceFlags {
    /// Number of CPUs
    #[arg(long)]
    pub cpus: Option<u32>,

    /// Memory limit (in MiB)
    #[arg(long)]
    pub memory: Option<u32>,
}

impl ResourceFlags {
    pub fn apply_to(&self, opts: &mut BoxOptions) {
        if let Some(cpus) = self.cpus {
            if cpus > 255 {
                tracing::warn!("CPU limit capped at 255 (requested {})", cpus);
            }
            opts.cpus = Some(cpus.min(255) as u8);
        }
        if let Some(mem) = self.memory {
            opts.memory_mib = Some(mem);
        }
    }
}

// ============================================================================
// IMAGE FLAGS
// ============================================================================

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct ImageFlags {
    /// Image to create the box from
    #[arg(index = 1)]
    pub image: Option<String>,

    /// Use a prepared directory as the box root instead of an image
    #[arg(long, value_name = "DIR")]
    pub rootfs: Option<PathBuf>,
}

impl ImageFlags {
    pub fn apply_to(&self, opts: &mut BoxOptions) -> anyhow::Result<()> {
        opts.image = match (&self.image, &self.rootfs) {
            (_, Some(dir)) => boxlease::ImageSpec::Rootfs(absolute(dir)?),
            (Some(image), None) => boxlease::ImageSpec::Image(image.clone()),
            (None, None) => anyhow::bail!("an image or --rootfs is required"),
        };
        Ok(())
    }
}

// ============================================================================
// MANAGEMENT FLAGS
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct ManagementFlags {
    /// Assign a name to the box
    #[arg(long)]
    pub name: Option<String>,

    /// Automatically remove the box when it stops
    #[arg(long)]
    pub rm: bool,
}

impl ManagementFlags {
    pub fn apply_to(&self, opts: &mut BoxOptions, detach: bool) {
        opts.detach = detach;
        opts.auto_remove = self.rm;
    }
}

// ============================================================================
// OUTPUT FLAGS
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct FormatFlags {
    /// Output format
    #[arg(long, value_enum, ignore_case = true, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_env_vars_with_lookup() {
        let mut opts = BoxOptions::default();
        let current_env = vec![
            "TEST_VAR=test_value".to_string(),
            "TEST_HOST_VAR".to_string(),
            "NON_EXISTENT_VAR".to_string(),
        ];

        apply_env_vars_with_lookup(&current_env, &mut opts, |k| {
            if k == "TEST_HOST_VAR" {
                Some("host_value".to_string())
            } else {
                None
            }
        });

        assert!(
            opts.env
                .contains(&("TEST_VAR".to_string(), "test_value".to_string()))
        );

        assert!(
            opts.env
                .contains(&("TEST_HOST_VAR".to_string(), "host_value".to_string()))
        );

        assert!(!opts.env.iter().any(|(k, _)| k == "NON_EXISTENT_VAR"));
    }

    #[test]
    fn test_env_value_may_contain_equals() {
        let pairs = parse_env_vars(&["A=b=c".to_string()], |_| None);
        assert_eq!(pairs, vec![("A".to_string(), "b=c".to_string())]);
    }

    #[test]
    fn test_resource_flags_cpu_cap() {
        let flags = ResourceFlags {
            cpus: Some(1000),
            memory: None,
        };
        let mut opts = BoxOptions::default();
        flags.apply_to(&mut opts);
        assert_eq!(opts.cpus, Some(255));
        assert_eq!(opts.memory_mib, None);
    }

    #[test]
    fn test_management_flags_detached_create() {
        let flags = ManagementFlags {
            name: None,
            rm: false,
        };
        let mut opts = BoxOptions::default();
        flags.apply_to(&mut opts, true);
        assert!(opts.detach);
        assert!(!opts.auto_remove);
    }

    #[test]
    fn test_registry_flags_prepend_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        std::fs::write(&config, r#"{"image_registries": ["quay.io"]}"#).unwrap();

        let flags = GlobalFlags {
            debug: false,
            home: Some(dir.path().join("home")),
            registry: vec!["ghcr.io".into()],
            config: Some(config),
        };
        let options = flags.runtime_options().unwrap();

        assert_eq!(options.image_registries, vec!["ghcr.io", "quay.io"]);
        assert_eq!(options.home_dir, dir.path().join("home"));
        let shim = options.shim.unwrap();
        assert_eq!(shim.args, vec!["shim".to_string()]);
    }

    #[test]
    fn test_configured_shim_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        std::fs::write(
            &config,
            r#"{"shim": {"program": "/opt/boxd/supervise", "args": ["--quiet"]}}"#,
        )
        .unwrap();

        let flags = GlobalFlags {
            debug: false,
            home: None,
            registry: Vec::new(),
            config: Some(config),
        };
        let shim = flags.runtime_options().unwrap().shim.unwrap();
        assert_eq!(shim.program, PathBuf::from("/opt/boxd/supervise"));
        assert_eq!(shim.args, vec!["--quiet".to_string()]);
    }

    #[test]
    fn test_relative_home_made_absolute() {
        let flags = GlobalFlags {
            debug: false,
            home: Some(PathBuf::from("relative-home")),
            registry: Vec::new(),
            config: None,
        };
        let options = flags.runtime_options().unwrap();
        assert!(options.home_dir.is_absolute());
        assert!(options.home_dir.ends_with("relative-home"));
    }

    #[test]
    fn test_process_flags_configure_command() {
        let flags = ProcessFlags {
            env: vec!["FOO=bar".into(), "FROM_HOST".into()],
            workdir: Some("/srv".into()),
            interactive: true,
        };
        let cmd = flags.configure_command_with_lookup(BoxCommand::new("env"), |k| {
            (k == "FROM_HOST").then(|| "yes".to_string())
        });
        let expected = BoxCommand::new("env")
            .env("FOO", "bar")
            .env("FROM_HOST", "yes")
            .working_dir("/srv")
            .interactive(true);
        assert_eq!(cmd, expected);
    }

    #[test]
    fn test_cli_parses_rootfs_create() {
        let cli = Cli::try_parse_from([
            "boxlease", "create", "--name", "web", "--rootfs", "/srv/root",
        ])
        .unwrap();
        match cli.command {
            Commands::Create(args) => {
                assert_eq!(args.management.name.as_deref(), Some("web"));
                assert_eq!(args.image.rootfs, Some(PathBuf::from("/srv/root")));
                assert!(args.image.image.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_image_and_rootfs() {
        assert!(
            Cli::try_parse_from(["boxlease", "create", "alpine", "--rootfs", "/srv/root"])
                .is_err()
        );
    }
}
