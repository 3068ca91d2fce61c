//! Synchronous execution handle, stdin writer and line iterators.

use std::io;
use std::sync::Arc;

use futures::{Stream, StreamExt};

use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

use super::Dispatcher;
use crate::sandbox::{
    ExecOutput, ExecResult, ExecStderr, ExecStdin, ExecStdout, Execution, ExecutionId,
};

/// Blocking counterpart of [`Execution`].
#[derive(Clone)]
pub struct SyncExecution {
    execution: Execution,
    dispatcher: Arc<Dispatcher>,
}

impl SyncExecution {
    pub(crate) fn new(execution: Execution, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            execution,
            dispatcher,
        }
    }

    pub fn id(&self) -> &ExecutionId {
        self.execution.id()
    }

    pub fn is_finished(&self) -> bool {
        self.execution.is_finished()
    }

    /// Take the stdin writer (interactive commands only, `None` after the first call).
    pub fn stdin(&self) -> Option<SyncExecStdin> {
        self.execution
            .stdin()
            .map(|stdin| SyncExecStdin::new(stdin, Arc::clone(&self.dispatcher)))
    }

    /// Take stdout as a blocking line iterator (`None` after the first call).
    pub fn stdout(&self) -> Option<SyncExecStdout> {
        self.execution
            .stdout()
            .map(|stream| SyncLines::new(stream, Arc::clone(&self.dispatcher)))
    }

    /// Take stderr as a blocking line iterator (`None` after the first call).
    pub fn stderr(&self) -> Option<SyncExecStderr> {
        self.execution
            .stderr()
            .map(|stream| SyncLines::new(stream, Arc::clone(&self.dispatcher)))
    }

    pub fn wait(&self) -> BoxleaseResult<ExecResult> {
        let execution = self.execution.clone();
        self.dispatcher
            .run_sync(async move { execution.wait().await })
    }

    pub fn kill(&self) -> BoxleaseResult<()> {
        let execution = self.execution.clone();
        self.dispatcher
            .run_sync(async move { execution.kill().await })
    }

    pub fn signal(&self, signal: i32) -> BoxleaseResult<()> {
        let execution = self.execution.clone();
        self.dispatcher
            .run_sync(async move { execution.signal(signal).await })
    }

    pub fn output(&self) -> BoxleaseResult<ExecOutput> {
        let execution = self.execution.clone();
        self.dispatcher
            .run_sync(async move { execution.output().await })
    }
}

/// Blocking counterpart of [`ExecStdin`]. Dropping it closes the command's stdin.
pub struct SyncExecStdin {
    stdin: Option<ExecStdin>,
    dispatcher: Arc<Dispatcher>,
}

impl SyncExecStdin {
    fn new(stdin: ExecStdin, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            stdin: Some(stdin),
            dispatcher,
        }
    }

    pub fn write(&mut self, data: &[u8]) -> BoxleaseResult<()> {
        let mut stdin = self
            .stdin
            .take()
            .ok_or_else(|| BoxleaseError::Internal("stdin closed".into()))?;
        let data = data.to_vec();
        let (stdin, result) = self.dispatcher.run(async move {
            let result = stdin.write(&data).await;
            (stdin, result)
        })?;
        if result.is_ok() {
            self.stdin = Some(stdin);
        }
        result
    }

    pub fn write_all(&mut self, data: &[u8]) -> BoxleaseResult<()> {
        self.write(data)
    }

    /// Close stdin; the command reads EOF.
    pub fn close(self) {}
}

impl io::Write for SyncExecStdin {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        SyncExecStdin::write(self, buf)
            .map(|()| buf.len())
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e.to_string()))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Blocking iterator over an output stream; each step is one dispatch.
///
/// Ends at end of stream, or when the dispatcher has stopped.
pub struct SyncLines<S> {
    stream: Option<S>,
    dispatcher: Arc<Dispatcher>,
}

pub type SyncExecStdout = SyncLines<ExecStdout>;
pub type SyncExecStderr = SyncLines<ExecStderr>;

impl<S> SyncLines<S> {
    fn new(stream: S, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            stream: Some(stream),
            dispatcher,
        }
    }
}

impl<S> Iterator for SyncLines<S>
where
    S: Stream<Item = String> + Unpin + Send + 'static,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut stream = self.stream.take()?;
        let step = self.dispatcher.run(async move {
            let line = stream.next().await;
            (stream, line)
        });

        match step {
            Ok((stream, line)) => {
                if line.is_some() {
                    self.stream = Some(stream);
                }
                line
            }
            Err(e) => {
                tracing::warn!(error = %e, "Output stream interrupted");
                None
            }
        }
    }
}
