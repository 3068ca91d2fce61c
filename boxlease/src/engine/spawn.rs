//! Command spawning for executions.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

use crate::sandbox::{ExecResult, ExecStderr, ExecStdin, ExecStdout, Execution};
use crate::util::signal_process_group;

/// Fully resolved command for one execution.
#[derive(Debug)]
pub(crate) struct ExecSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: PathBuf,
    pub timeout: Option<Duration>,
    /// Pipe stdin instead of reading EOF.
    pub stdin: bool,
}

impl ExecSpec {
    fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Start the command and hand back its execution handle.
///
/// Must be called inside a tokio runtime: the stdin feeder, output pumps and
/// exit waiter run as tasks. The command leads its own process group.
pub(crate) fn spawn_execution(spec: ExecSpec) -> BoxleaseResult<Execution> {
    let command_line = spec.display();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(&spec.cwd)
        .stdin(if spec.stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    let mut child = cmd.spawn().map_err(|e| {
        BoxleaseError::Engine(format!("failed to spawn '{}': {}", spec.program, e))
    })?;
    let pid = child.id();
    tracing::debug!(command = %command_line, ?pid, "Execution started");

    let stdin = child.stdin.take().map(|writer| {
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        feed(writer, stdin_rx);
        ExecStdin::new(stdin_tx)
    });

    let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
    let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        pump(stdout, stdout_tx);
    }
    if let Some(stderr) = child.stderr.take() {
        pump(stderr, stderr_tx);
    }

    let finished = Arc::new(AtomicBool::new(false));
    let (result_tx, result_rx) = oneshot::channel();
    let timeout = spec.timeout;
    let waiter_finished = Arc::clone(&finished);
    let waiter_command = command_line.clone();
    tokio::spawn(async move {
        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    tracing::warn!(
                        command = %waiter_command,
                        timeout_ms = limit.as_millis(),
                        "Execution timed out, killing"
                    );
                    if let Some(pid) = pid
                        && let Err(e) = signal_process_group(pid, libc::SIGKILL)
                    {
                        tracing::warn!(command = %waiter_command, "Failed to kill execution: {}", e);
                    }
                    child.wait().await
                }
            },
            None => child.wait().await,
        };
        waiter_finished.store(true, Ordering::Release);

        let exit_code = match status {
            Ok(status) => exit_code_of(status),
            Err(e) => {
                tracing::warn!(command = %waiter_command, "Failed to wait for execution: {}", e);
                -1
            }
        };
        tracing::debug!(command = %waiter_command, exit_code, "Execution finished");
        let _ = result_tx.send(ExecResult { exit_code });
    });

    Ok(Execution::new(
        command_line,
        pid,
        finished,
        result_rx,
        stdin,
        ExecStdout::new(stdout_rx),
        ExecStderr::new(stderr_rx),
    ))
}

/// Process exit code, or the negative signal number on a signal death.
fn exit_code_of(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => -status.signal().unwrap_or(0),
    }
}

/// Write queued input until the sender is dropped, then close the pipe.
fn feed<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            let written = match writer.write_all(&data).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                tracing::debug!("Input stream closed: {}", e);
                break;
            }
        }
    });
}

/// Forward lines until EOF. Keeps draining after the consumer goes away so
/// the process never blocks on a full pipe.
fn pump<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
                }
                Err(e) => {
                    tracing::debug!("Output stream closed: {}", e);
                    break;
                }
            }
        }
    });
}
