//! Bazel invocation.
//!
//! Runs `bazel build <target>` in a workspace and forwards the process output
//! to a sink as it is produced.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::cancel::Cancellation;
use crate::consts::DEFAULT_BAZEL_PROGRAM;
use crate::error::{BuildError, ProcessError};

const READ_BUF_SIZE: usize = 8 * 1024;

/// How to launch Bazel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BazelConfig {
  /// Program to run, resolved through `PATH` when not absolute.
  pub program: PathBuf,
  /// Startup options, placed before the `build` verb.
  pub startup_args: Vec<String>,
}

impl Default for BazelConfig {
  fn default() -> Self {
    Self {
      program: PathBuf::from(DEFAULT_BAZEL_PROGRAM),
      startup_args: Vec::new(),
    }
  }
}

/// Runs Bazel builds.
#[derive(Debug, Clone, Default)]
pub struct Bazel {
  config: BazelConfig,
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
  Stdout,
  Stderr,
}

enum Event {
  Read(Pipe, std::io::Result<usize>),
  Cancelled,
}

impl Bazel {
  pub fn new(config: BazelConfig) -> Self {
    Self { config }
  }

  /// Run `build <target>` with `workspace` as the working directory.
  ///
  /// Output from both stdout and stderr is written to `sink` chunk by chunk
  /// and flushed after each write. Returns once the process has exited.
  ///
  /// # Errors
  ///
  /// * [`BuildError::BuildFailed`] if the process cannot start, its output
  ///   cannot be read, or it exits unsuccessfully.
  /// * [`BuildError::Cancelled`] if `cancel` fires; the process is killed.
  /// * [`BuildError::Sink`] if writing to `sink` fails.
  pub async fn invoke_build<W>(
    &self,
    workspace: &Path,
    target: &str,
    sink: &mut W,
    cancel: &Cancellation,
  ) -> Result<(), BuildError>
  where
    W: AsyncWrite + Unpin + ?Sized,
  {
    info!(target = %target, workspace = %workspace.display(), "running bazel build");

    let mut command = Command::new(&self.config.program);
    command
      .args(&self.config.startup_args)
      .arg("build")
      .arg(target)
      .current_dir(workspace)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    debug!(program = ?self.config.program, args = ?self.config.startup_args, "spawning process");

    let mut child = command.spawn().map_err(|source| {
      BuildError::BuildFailed(ProcessError::Spawn {
        program: self.config.program.display().to_string(),
        source,
      })
    })?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out_buf = vec![0u8; READ_BUF_SIZE];
    let mut err_buf = vec![0u8; READ_BUF_SIZE];

    while stdout.is_some() || stderr.is_some() {
      let event = tokio::select! {
        read = read_pipe(stdout.as_mut(), &mut out_buf) => Event::Read(Pipe::Stdout, read),
        read = read_pipe(stderr.as_mut(), &mut err_buf) => Event::Read(Pipe::Stderr, read),
        _ = cancel.cancelled() => Event::Cancelled,
      };

      match event {
        Event::Read(pipe, Ok(0)) => match pipe {
          Pipe::Stdout => stdout = None,
          Pipe::Stderr => stderr = None,
        },
        Event::Read(pipe, Ok(n)) => {
          let chunk = match pipe {
            Pipe::Stdout => &out_buf[..n],
            Pipe::Stderr => &err_buf[..n],
          };
          forward(sink, chunk).await?;
        }
        Event::Read(_, Err(e)) => return Err(BuildError::BuildFailed(ProcessError::Output(e))),
        Event::Cancelled => return Err(abort(&mut child).await),
      }
    }

    let status = tokio::select! {
      status = child.wait() => status.map_err(|e| BuildError::BuildFailed(ProcessError::Output(e)))?,
      _ = cancel.cancelled() => return Err(abort(&mut child).await),
    };

    if !status.success() {
      debug!(code = ?status.code(), "bazel exited unsuccessfully");
      return Err(BuildError::BuildFailed(ProcessError::Exit(status)));
    }

    info!(target = %target, "bazel build finished");
    Ok(())
  }
}

/// Read from a pipe that may already be closed. A closed pipe never resolves,
/// which disables its `select!` branch.
async fn read_pipe<R>(pipe: Option<&mut R>, buf: &mut [u8]) -> std::io::Result<usize>
where
  R: AsyncRead + Unpin,
{
  match pipe {
    Some(pipe) => pipe.read(buf).await,
    None => std::future::pending().await,
  }
}

async fn forward<W>(sink: &mut W, chunk: &[u8]) -> Result<(), BuildError>
where
  W: AsyncWrite + Unpin + ?Sized,
{
  sink.write_all(chunk).await.map_err(BuildError::Sink)?;
  sink.flush().await.map_err(BuildError::Sink)
}

async fn abort(child: &mut Child) -> BuildError {
  info!("build cancelled, killing bazel");
  if let Err(e) = child.kill().await {
    debug!(error = %e, "failed to kill bazel");
  }
  BuildError::Cancelled
}
