use crate::cli::{GlobalFlags, ImageFlags, ManagementFlags, ProcessFlags, ResourceFlags};
use boxlease::BoxOptions;
use clap::Args;

/// Create a new box
///
/// The box keeps running after this command exits unless `--rm` is given,
/// in which case it is tied to this invocation and removed when it stops.
#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub image: ImageFlags,

    #[command(flatten)]
    pub management: ManagementFlags,

    #[command(flatten)]
    pub process: ProcessFlags,

    #[command(flatten)]
    pub resource: ResourceFlags,
}

pub fn execute(args: CreateArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let box_options = args.to_box_options()?;
    let rt = global.create_runtime()?;

    let outcome = rt
        .create(box_options, args.management.name.clone())
        .map(|handle| println!("{}", handle.id()))
        .map_err(Into::into);

    super::finish(&rt, outcome)
}

impl CreateArgs {
    fn to_box_options(&self) -> anyhow::Result<BoxOptions> {
        let mut options = BoxOptions::default();
        self.image.apply_to(&mut options)?;
        self.resource.apply_to(&mut options);
        self.management.apply_to(&mut options, !self.management.rm);
        self.process.apply_to(&mut options);
        Ok(options)
    }
}
