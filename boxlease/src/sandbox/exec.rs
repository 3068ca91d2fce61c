//! Command execution types.

use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

use crate::util::signal_process_group;

/// Command builder for executing programs in a box.
///
/// ```rust,no_run
/// # use boxlease::BoxCommand;
/// # use std::time::Duration;
/// let cmd = BoxCommand::new("python3")
///     .args(["-c", "print('hello')"])
///     .env("PYTHONPATH", "/app")
///     .timeout(Duration::from_secs(30))
///     .working_dir("/workspace");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxCommand {
    pub(crate) command: String,
    pub(crate) args: Vec<String>,
    pub(crate) env: Vec<(String, String)>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) working_dir: Option<String>,
    #[serde(default)]
    pub(crate) stdin: bool,
}

impl BoxCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec![],
            env: vec![],
            timeout: None,
            working_dir: None,
            stdin: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.env.push((key.into(), val.into()));
        self
    }

    /// Kill the command if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Working directory, relative to the box root.
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Keep stdin open for [`Execution::stdin`]. Otherwise the command reads EOF.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.stdin = interactive;
        self
    }

    pub fn program(&self) -> &str {
        &self.command
    }

    /// Program and arguments joined for messages.
    pub fn display(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Unique identifier for an execution.
pub type ExecutionId = String;

/// Handle to a running or finished command.
///
/// Cloning shares the handle. Each stream can be taken once. The command runs
/// as its own process group, and signals reach the whole group.
///
/// ```rust,no_run
/// # async fn example(sandbox: &boxlease::BoxHandle) -> boxlease::BoxleaseResult<()> {
/// use boxlease::BoxCommand;
/// use futures::StreamExt;
///
/// let execution = sandbox.exec(BoxCommand::new("ls").arg("-la")).await?;
/// let mut stdout = execution.stdout().unwrap();
/// while let Some(line) = stdout.next().await {
///     print!("{}", line);
/// }
/// let status = execution.wait().await?;
/// println!("exit code: {}", status.exit_code);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Execution {
    id: ExecutionId,
    inner: Arc<ExecutionInner>,
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("id", &self.id)
            .field("command", &self.inner.command)
            .field("pid", &self.inner.pid)
            .finish_non_exhaustive()
    }
}

struct ExecutionInner {
    command: String,
    pid: Option<u32>,
    finished: Arc<AtomicBool>,
    result: tokio::sync::Mutex<ResultSlot>,
    stdin: Mutex<Option<ExecStdin>>,
    stdout: Mutex<Option<ExecStdout>>,
    stderr: Mutex<Option<ExecStderr>>,
}

struct ResultSlot {
    rx: Option<oneshot::Receiver<ExecResult>>,
    cached: Option<ExecResult>,
}

impl Execution {
    pub(crate) fn new(
        command: String,
        pid: Option<u32>,
        finished: Arc<AtomicBool>,
        result_rx: oneshot::Receiver<ExecResult>,
        stdin: Option<ExecStdin>,
        stdout: ExecStdout,
        stderr: ExecStderr,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            inner: Arc::new(ExecutionInner {
                command,
                pid,
                finished,
                result: tokio::sync::Mutex::new(ResultSlot {
                    rx: Some(result_rx),
                    cached: None,
                }),
                stdin: Mutex::new(stdin),
                stdout: Mutex::new(Some(stdout)),
                stderr: Mutex::new(Some(stderr)),
            }),
        }
    }

    pub fn id(&self) -> &ExecutionId {
        &self.id
    }

    /// The command line this execution runs.
    pub fn command(&self) -> &str {
        &self.inner.command
    }

    /// Whether the command has exited.
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Take the stdin writer. `None` for commands not built with
    /// [`BoxCommand::interactive`], and after the first call.
    pub fn stdin(&self) -> Option<ExecStdin> {
        self.inner.stdin.lock().take()
    }

    /// Take the stdout stream (returns `None` after the first call).
    pub fn stdout(&self) -> Option<ExecStdout> {
        self.inner.stdout.lock().take()
    }

    /// Take the stderr stream (returns `None` after the first call).
    pub fn stderr(&self) -> Option<ExecStderr> {
        self.inner.stderr.lock().take()
    }

    /// Wait for the command to exit. The result is cached and never changes.
    pub async fn wait(&self) -> BoxleaseResult<ExecResult> {
        let mut slot = self.inner.result.lock().await;
        if let Some(result) = &slot.cached {
            return Ok(result.clone());
        }

        // Polled in place: a wait dropped mid-flight leaves the receiver for the next one.
        let rx = slot
            .rx
            .as_mut()
            .ok_or_else(|| BoxleaseError::Internal("result channel closed".into()))?;
        let received = rx.await;
        slot.rx = None;

        let result =
            received.map_err(|_| BoxleaseError::Internal("result channel closed".into()))?;
        slot.cached = Some(result.clone());
        Ok(result)
    }

    /// Request SIGKILL. Call [`wait`](Self::wait) to observe the exit.
    pub async fn kill(&self) -> BoxleaseResult<()> {
        self.signal(libc::SIGKILL).await
    }

    /// Deliver `signal` to the command's process group. A no-op once it has exited.
    pub async fn signal(&self, signal: i32) -> BoxleaseResult<()> {
        if self.is_finished() {
            return Ok(());
        }
        let Some(pid) = self.inner.pid else {
            return Ok(());
        };
        signal_process_group(pid, signal).map_err(|e| {
            BoxleaseError::Engine(format!("failed to signal execution {}: {}", self.id, e))
        })
    }

    /// Collect both streams concurrently, then wait for the exit code.
    ///
    /// Streams already taken by the caller contribute nothing. Stdin the
    /// caller never took is closed first.
    pub async fn output(&self) -> BoxleaseResult<ExecOutput> {
        drop(self.stdin());
        let stdout = self.stdout();
        let stderr = self.stderr();
        let (stdout, stderr) = futures::join!(collect(stdout), collect(stderr));
        let result = self.wait().await?;
        Ok(ExecOutput {
            exit_code: result.exit_code,
            stdout,
            stderr,
        })
    }
}

async fn collect<S>(stream: Option<S>) -> String
where
    S: Stream<Item = String> + Unpin,
{
    match stream {
        Some(stream) => stream.collect::<Vec<_>>().await.concat(),
        None => String::new(),
    }
}

/// Exit status of a process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    /// Exit code (0 = success). A signal death is the negative signal number.
    pub exit_code: i32,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn code(&self) -> i32 {
        self.exit_code
    }
}

/// Everything a finished command produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into `BoxleaseError::Execution`.
    pub fn check(self, command: &str) -> BoxleaseResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(BoxleaseError::Execution {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }

    /// Parse trimmed stdout, e.g. the output of a diagnostic command.
    pub fn parse<T>(&self) -> BoxleaseResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let text = self.stdout.trim();
        text.parse::<T>()
            .map_err(|e| BoxleaseError::Parse(format!("unexpected output '{}': {}", text, e)))
    }
}

/// Standard input of an interactive command.
///
/// Writes are queued in order. Dropping the writer closes the command's stdin.
pub struct ExecStdin {
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

impl ExecStdin {
    pub(crate) fn new(sender: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { sender }
    }

    /// Queue `data` for the command. Fails once the command stopped reading.
    pub async fn write(&mut self, data: &[u8]) -> BoxleaseResult<()> {
        self.sender
            .send(data.to_vec())
            .map_err(|_| BoxleaseError::Internal("stdin closed".into()))
    }

    pub async fn write_all(&mut self, data: &[u8]) -> BoxleaseResult<()> {
        self.write(data).await
    }

    /// Close stdin; the command reads EOF.
    pub fn close(self) {}
}

/// Standard output stream, one line per item (terminator included).
pub struct ExecStdout {
    receiver: mpsc::UnboundedReceiver<String>,
}

impl ExecStdout {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<String>) -> Self {
        Self { receiver }
    }
}

impl Stream for ExecStdout {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Standard error stream, one line per item (terminator included).
pub struct ExecStderr {
    receiver: mpsc::UnboundedReceiver<String>,
}

impl ExecStderr {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<String>) -> Self {
        Self { receiver }
    }
}

impl Stream for ExecStderr {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
