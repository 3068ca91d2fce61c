use crate::cli::GlobalFlags;
use boxlease::BoxleaseError;
use clap::Args;

/// Start one or more stopped boxes
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Box IDs or names
    #[arg(required = true, value_name = "BOX")]
    pub targets: Vec<String>,
}

pub fn execute(args: StartArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let rt = global.create_runtime()?;

    let outcome = super::for_each_target(&args.targets, |target| {
        let handle = rt
            .get(target)?
            .ok_or_else(|| BoxleaseError::NotFound(format!("box {}", target)))?;
        handle.start()
    });

    super::finish(&rt, outcome)
}
