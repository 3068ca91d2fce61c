use crate::cli::GlobalFlags;
use clap::Args;

/// Remove one or more boxes
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Stop running boxes before removing them
    #[arg(short, long)]
    pub force: bool,

    /// Box IDs or names
    #[arg(required = true, value_name = "BOX")]
    pub targets: Vec<String>,
}

pub fn execute(args: RmArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let rt = global.create_runtime()?;

    let outcome = super::for_each_target(&args.targets, |target| rt.remove(target, args.force));

    super::finish(&rt, outcome)
}
