use crate::cli::{GlobalFlags, ProcessFlags};
use crate::commands::run::{forward_stdin, shell_exit_code, stream_output};
use boxlease::BoxCommand;
use boxlease::BoxleaseError;
use boxlease::sync_api::SyncRuntime;
use clap::Args;

/// Execute a command in an existing box
#[derive(Args, Debug)]
pub struct ExecArgs {
    #[command(flatten)]
    pub process: ProcessFlags,

    /// Box ID or name
    #[arg(index = 1, value_name = "BOX")]
    pub target: String,

    /// Command to run inside the box
    #[arg(
        index = 2,
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

/// Entry point. Returns the exit code of the command.
pub fn execute(args: ExecArgs, global: &GlobalFlags) -> anyhow::Result<i32> {
    let rt = global.create_runtime()?;
    let result = exec_in_box(&args, &rt);
    super::finish(&rt, result).map(shell_exit_code)
}

fn exec_in_box(args: &ExecArgs, rt: &SyncRuntime) -> anyhow::Result<i32> {
    let handle = rt
        .get(&args.target)?
        .ok_or_else(|| BoxleaseError::NotFound(format!("box {}", args.target)))?;

    let command = args.process.configure_command(
        BoxCommand::new(&args.command[0]).args(args.command[1..].iter().cloned()),
    );

    let execution = handle.exec(command)?;
    forward_stdin(&execution);
    stream_output(&execution);
    Ok(execution.wait()?.exit_code)
}
