use crate::cli::GlobalFlags;
use boxlease::BoxleaseError;
use boxlease::sync_api::SyncRuntime;
use clap::Args;

/// Restart one or more boxes
#[derive(Args, Debug)]
pub struct RestartArgs {
    /// Box IDs or names
    #[arg(required = true, value_name = "BOX")]
    pub targets: Vec<String>,
}

pub fn execute(args: RestartArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let rt = global.create_runtime()?;
    let outcome = super::for_each_target(&args.targets, |target| restart(&rt, target));
    super::finish(&rt, outcome)
}

/// Stop, then start again. A box whose stop failed is left alone.
fn restart(rt: &SyncRuntime, target: &str) -> boxlease::BoxleaseResult<()> {
    let handle = rt
        .get(target)?
        .ok_or_else(|| BoxleaseError::NotFound(format!("box {}", target)))?;
    handle.stop()?;

    // Boxes created with --rm are gone once stopped.
    let handle = rt.get(target)?.ok_or_else(|| {
        BoxleaseError::NotFound(format!("box {} was removed when it stopped", target))
    })?;
    handle.start()
}
