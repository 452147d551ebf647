//! External tool execution.
//!
//! The [`CommandRunner`] trait is the seam between command assembly and the
//! process that actually runs it. The production implementation is
//! [`ShellRunner`], which hands the rendered line to `sh -c` via tokio.
//! Tests swap in a recording mock so command assembly can be checked without
//! ImageMagick installed.
//!
//! ## Buffering
//!
//! Output that is not streamed to a destination is buffered in memory, capped
//! at [`ExecutionTuning::max_buffer`] bytes per pipe. Going over the cap kills
//! the child and fails the call; output is never silently truncated.

use crate::command::CommandLine;
use crate::config::ExecutionTuning;
use crate::error::{Error, Result};
use crate::stream::{ByteReader, ByteWriter};
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Everything a runner needs for one invocation.
pub struct Invocation<'a> {
    pub command: &'a CommandLine,
    pub tuning: &'a ExecutionTuning,
    /// Fed to the child's stdin, then closed.
    pub stdin: Option<&'a mut ByteReader>,
    /// Receives the child's stdout instead of the in-memory buffer.
    pub stdout: Option<&'a mut ByteWriter>,
}

/// Captured output of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Empty when stdout was streamed to a destination.
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs one rendered command line.
///
/// Implementations resolve exactly once: with the captured output when the
/// tool exits successfully, with [`Error::ExternalTool`] otherwise.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: Invocation<'_>) -> Result<RunOutput>;
}

/// Runs commands through the configured shell (`sh -c <line>`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, invocation: Invocation<'_>) -> Result<RunOutput> {
        let timeout = invocation.tuning.timeout();
        let run = run_in_shell(invocation);
        match timeout {
            // Dropping the run future drops the child, which kills it.
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => run.await,
        }
    }
}

async fn run_in_shell(invocation: Invocation<'_>) -> Result<RunOutput> {
    let Invocation {
        command,
        tuning,
        stdin: input,
        stdout: output,
    } = invocation;
    let line = command.to_string();

    let mut cmd = Command::new(&tuning.shell);
    cmd.arg("-c")
        .arg(&line)
        .envs(&tuning.env)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &tuning.current_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| Error::Spawn {
        program: tuning.shell.clone(),
        source,
    })?;
    let child_stdin = child.stdin.take();
    let mut child_stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let mut child_stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;
    let limit = tuning.max_buffer;

    let feed = async move {
        if let (Some(reader), Some(mut pipe)) = (input, child_stdin) {
            match tokio::io::copy(reader, &mut pipe).await {
                Ok(_) => {}
                // The tool may exit without reading all of its input; its
                // exit status decides the outcome.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(Error::Io(e)),
            }
            // `pipe` dropped here: the child sees EOF.
        }
        Ok::<(), Error>(())
    };
    let drain = async move {
        match output {
            Some(writer) => {
                tokio::io::copy(&mut child_stdout, writer).await?;
                writer.flush().await?;
                Ok::<_, Error>(Vec::new())
            }
            None => read_limited(&mut child_stdout, limit).await,
        }
    };

    let ((), stdout, stderr) =
        tokio::try_join!(feed, drain, read_limited(&mut child_stderr, limit))?;
    let status = child.wait().await?;

    if !status.success() {
        return Err(Error::ExternalTool {
            command: line,
            status: status.code(),
            stderr: String::from_utf8_lossy(&stderr).trim_end().to_string(),
        });
    }
    Ok(RunOutput { stdout, stderr })
}

/// Read everything from `reader`, failing once more than `limit` bytes arrive.
async fn read_limited<R: AsyncRead + Unpin>(reader: &mut R, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let read = reader.take(limit as u64 + 1).read_to_end(&mut buf).await?;
    if read > limit {
        return Err(Error::MaxBufferExceeded { limit });
    }
    Ok(buf)
}
