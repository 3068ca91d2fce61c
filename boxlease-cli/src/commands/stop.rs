use crate::cli::GlobalFlags;
use boxlease::BoxleaseError;
use clap::Args;

/// Stop one or more running boxes
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Box IDs or names
    #[arg(required = true, value_name = "BOX")]
    pub targets: Vec<String>,
}

pub fn execute(args: StopArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let rt = global.create_runtime()?;

    let outcome = super::for_each_target(&args.targets, |target| {
        let handle = rt
            .get(target)?
            .ok_or_else(|| BoxleaseError::NotFound(format!("box {}", target)))?;
        handle.stop()
    });

    super::finish(&rt, outcome)
}
