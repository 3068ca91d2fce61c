use crate::cli::{FormatFlags, GlobalFlags};
use crate::formatter;
use boxlease::BoxInfo;
use chrono::{DateTime, Utc};
use clap::Args;
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets};

/// List boxes
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show all boxes (default just shows running)
    #[arg(short = 'a', long)]
    pub all: bool,

    /// Only show IDs
    #[arg(short, long)]
    pub quiet: bool,

    #[command(flatten)]
    pub format: FormatFlags,
}

pub fn execute(args: ListArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let rt = global.create_runtime()?;
    let outcome = rt.list_info().map_err(anyhow::Error::from);
    let boxes: Vec<BoxInfo> = super::finish(&rt, outcome)?
        .into_iter()
        .filter(|info| args.all || info.status.is_active())
        .collect();

    if args.quiet {
        for info in boxes {
            println!("{}", info.id);
        }
        return Ok(());
    }

    let now = Utc::now();
    let rendered = args
        .format
        .format
        .render(&boxes, |boxes| render_table(boxes, now).to_string())?;
    println!("{}", rendered);
    Ok(())
}

fn render_table(boxes: &[BoxInfo], now: DateTime<Utc>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_NO_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        ["ID", "NAME", "STATUS", "PID", "RESOURCES", "IMAGE", "CREATED"]
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
    );

    for info in boxes {
        table.add_row(vec![
            Cell::new(&info.id),
            Cell::new(formatter::or_dash(info.name.as_deref())),
            Cell::new(info.status).fg(formatter::status_color(info.status)),
            Cell::new(formatter::or_dash(info.pid)),
            Cell::new(formatter::resources(info.cpus, info.memory_mib)),
            Cell::new(&info.image),
            Cell::new(formatter::age(info.created_at, now)),
        ]);
    }

    table
}
