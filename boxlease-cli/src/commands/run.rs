use std::io::{self, Write};
use std::path::PathBuf;

use crate::cli::{GlobalFlags, ManagementFlags, ProcessFlags, ResourceFlags, absolute};
use boxlease::sync_api::{SyncExecution, SyncRuntime};
use boxlease::{BoxCommand, BoxOptions, ImageSpec};
use clap::Args;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub process: ProcessFlags,

    #[command(flatten)]
    pub resource: ResourceFlags,

    #[command(flatten)]
    pub management: ManagementFlags,

    /// Use a prepared directory as the box root instead of an image
    #[arg(long, value_name = "DIR")]
    pub rootfs: Option<PathBuf>,

    /// IMAGE followed by the command to run (just the command with --rootfs)
    #[arg(
        value_name = "IMAGE|CMD",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub args: Vec<String>,
}

/// Entry point. Returns the exit code of the command.
pub fn execute(args: RunArgs, global: &GlobalFlags) -> anyhow::Result<i32> {
    let rt = global.create_runtime()?;
    // The box is tied to this process: shutdown stops it (and removes it
    // with --rm) before the lease is released.
    let result = run_in_box(&args, &rt);
    super::finish(&rt, result).map(shell_exit_code)
}

fn run_in_box(args: &RunArgs, rt: &SyncRuntime) -> anyhow::Result<i32> {
    let (options, command) = args.split()?;
    let handle = rt.create(options, args.management.name.clone())?;
    tracing::debug!(box_id = %handle.id(), command = %command.display(), "Running command");

    let execution = handle.exec(command)?;
    forward_stdin(&execution);
    stream_output(&execution);
    let status = execution.wait()?;

    if let Err(e) = handle.stop() {
        tracing::warn!(box_id = %handle.id(), error = %e, "Failed to stop box");
    }
    Ok(status.exit_code)
}

/// Copy this process's stdin into an interactive command until EOF.
///
/// The copier is detached: it may sit in a blocking read after the command
/// exits, and the process exit ends it.
pub(crate) fn forward_stdin(execution: &SyncExecution) {
    let Some(mut stdin) = execution.stdin() else {
        return;
    };
    std::thread::spawn(move || {
        if let Err(e) = io::copy(&mut io::stdin().lock(), &mut stdin) {
            tracing::debug!("Stopped forwarding stdin: {}", e);
        }
    });
}

/// Forward stdout and stderr as lines arrive; returns once both are drained.
pub(crate) fn stream_output(execution: &SyncExecution) {
    let stdout = execution.stdout();
    let stderr = execution.stderr();

    std::thread::scope(|scope| {
        if let Some(stderr) = stderr {
            scope.spawn(move || {
                let mut err = io::stderr();
                for line in stderr {
                    let _ = err.write_all(line.as_bytes());
                    let _ = err.flush();
                }
            });
        }

        if let Some(stdout) = stdout {
            let mut out = io::stdout();
            for line in stdout {
                let _ = out.write_all(line.as_bytes());
                let _ = out.flush();
            }
        }
    });
}

impl RunArgs {
    fn split(&self) -> anyhow::Result<(BoxOptions, BoxCommand)> {
        let mut options = BoxOptions::default();
        self.resource.apply_to(&mut options);
        self.management.apply_to(&mut options, false);
        self.process.apply_to(&mut options);

        let rest = match &self.rootfs {
            Some(dir) => {
                options.image = ImageSpec::Rootfs(absolute(dir)?);
                &self.args[..]
            }
            None => {
                let (image, rest) = self
                    .args
                    .split_first()
                    .ok_or_else(|| anyhow::anyhow!("an image or --rootfs is required"))?;
                options.image = ImageSpec::Image(image.clone());
                rest
            }
        };

        let (program, cmd_args) = parse_command_args(rest);
        let command = BoxCommand::new(program)
            .args(cmd_args)
            .interactive(self.process.interactive);
        Ok((options, command))
    }
}

fn parse_command_args(input: &[String]) -> (&str, &[String]) {
    if input.is_empty() {
        ("sh", &[])
    } else {
        (&input[0], &input[1..])
    }
}

/// Signal terminations are reported as negative codes; shells use 128 + n.
pub(crate) fn shell_exit_code(code: i32) -> i32 {
    match code {
        // e.g. -9 (SIGKILL) -> 128 + 9 = 137
        code if code < 0 => 128 + code.abs(),
        code => code,
    }
}
