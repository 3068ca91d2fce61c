use crate::cli::{FormatFlags, GlobalFlags};
use crate::formatter;
use boxlease::{BoxInfo, BoxleaseError};
use clap::Args;
use tabled::Tabled;

/// Show details of a box
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Box ID or name
    #[arg(value_name = "BOX")]
    pub target: String,

    #[command(flatten)]
    pub format: FormatFlags,
}

#[derive(Tabled)]
struct Field {
    #[tabled(rename = "FIELD")]
    name: &'static str,
    #[tabled(rename = "VALUE")]
    value: String,
}

pub fn execute(args: InfoArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let rt = global.create_runtime()?;
    let outcome = rt.get_info(&args.target).map_err(anyhow::Error::from);
    let info = super::finish(&rt, outcome)?
        .ok_or_else(|| BoxleaseError::NotFound(format!("box {}", args.target)))?;

    let rendered = args
        .format
        .format
        .render(&info, |info| formatter::grid(fields(info)))?;
    println!("{}", rendered);
    Ok(())
}

fn fields(info: &BoxInfo) -> Vec<Field> {
    vec![
        Field {
            name: "ID",
            value: info.id.clone(),
        },
        Field {
            name: "Name",
            value: formatter::or_dash(info.name.as_deref()),
        },
        Field {
            name: "Status",
            value: info.status.to_string(),
        },
        Field {
            name: "Image",
            value: info.image.clone(),
        },
        Field {
            name: "Resources",
            value: formatter::resources(info.cpus, info.memory_mib),
        },
        Field {
            name: "Supervisor PID",
            value: formatter::or_dash(info.pid),
        },
        Field {
            name: "Detached",
            value: info.detach.to_string(),
        },
        Field {
            name: "Auto remove",
            value: info.auto_remove.to_string(),
        },
        Field {
            name: "Created",
            value: formatter::timestamp(&info.created_at),
        },
        Field {
            name: "Updated",
            value: formatter::timestamp(&info.last_updated),
        },
    ]
}
