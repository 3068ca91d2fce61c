use crate::cli::{FormatFlags, GlobalFlags};
use crate::formatter;
use boxlease::{BoxMetrics, BoxleaseError, RuntimeMetrics};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

/// Show runtime counters, or a single box's usage
#[derive(Args, Debug)]
pub struct MetricsArgs {
    /// Box ID or name (omit for runtime-wide counters)
    #[arg(value_name = "BOX")]
    pub target: Option<String>,

    #[command(flatten)]
    pub format: FormatFlags,
}

/// Counters of the runtime opened by this invocation.
#[derive(Clone, Serialize, Tabled)]
struct RuntimeMetricsView {
    #[tabled(rename = "CREATED")]
    boxes_created_total: u64,
    #[tabled(rename = "FAILED")]
    boxes_failed_total: u64,
    #[tabled(rename = "STOPPED")]
    boxes_stopped_total: u64,
    #[tabled(rename = "RUNNING")]
    num_running_boxes: u64,
    #[tabled(rename = "COMMANDS")]
    total_commands_executed: u64,
    #[tabled(rename = "EXEC ERRORS")]
    total_exec_errors: u64,
}

impl From<&RuntimeMetrics> for RuntimeMetricsView {
    fn from(m: &RuntimeMetrics) -> Self {
        Self {
            boxes_created_total: m.boxes_created_total(),
            boxes_failed_total: m.boxes_failed_total(),
            boxes_stopped_total: m.boxes_stopped_total(),
            num_running_boxes: m.num_running_boxes(),
            total_commands_executed: m.total_commands_executed(),
            total_exec_errors: m.total_exec_errors(),
        }
    }
}

#[derive(Tabled)]
struct BoxMetricsRow {
    #[tabled(rename = "COMMANDS")]
    commands_executed: u64,
    #[tabled(rename = "EXEC ERRORS")]
    exec_errors: u64,
    #[tabled(rename = "CPU %")]
    cpu_percent: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
}

impl From<&BoxMetrics> for BoxMetricsRow {
    fn from(m: &BoxMetrics) -> Self {
        Self {
            commands_executed: m.commands_executed,
            exec_errors: m.exec_errors,
            cpu_percent: formatter::or_dash(m.cpu_percent.map(|c| format!("{:.1}", c))),
            memory: formatter::or_dash(m.memory_bytes.map(formatter::bytes)),
        }
    }
}

pub fn execute(args: MetricsArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let rt = global.create_runtime()?;
    let format = args.format.format;

    match &args.target {
        Some(target) => {
            let outcome = rt
                .get(target)
                .and_then(|handle| {
                    handle
                        .ok_or_else(|| BoxleaseError::NotFound(format!("box {}", target)))?
                        .metrics()
                })
                .map_err(anyhow::Error::from);
            let metrics = super::finish(&rt, outcome)?;
            let rendered = format.render(&metrics, |m| formatter::grid([BoxMetricsRow::from(m)]))?;
            println!("{}", rendered);
            Ok(())
        }
        None => {
            let outcome = rt
                .metrics()
                .map(|m| RuntimeMetricsView::from(&m))
                .map_err(anyhow::Error::from);
            let view = super::finish(&rt, outcome)?;
            let rendered = format.render(&view, |v| formatter::grid([v.clone()]))?;
            println!("{}", rendered);
            Ok(())
        }
    }
}
