//! Error types for building and loading images.
//!
//! [`BuildError`] says what went wrong; [`Error`] adds the pipeline stage it
//! went wrong in.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Failures of the Bazel process itself.
#[derive(Debug, Error)]
pub enum ProcessError {
  /// The program could not be started.
  #[error("failed to start '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// Reading the process output or waiting on it failed.
  #[error("failed to read process output: {0}")]
  Output(#[source] std::io::Error),

  /// The process ran and exited unsuccessfully.
  #[error("{0}")]
  Exit(ExitStatus),
}

/// Failures talking to the daemon below the HTTP status level.
#[derive(Debug, Error)]
pub enum TransportError {
  /// Request over TCP failed.
  #[error(transparent)]
  Http(#[from] reqwest::Error),

  /// The daemon socket could not be connected to.
  #[error("failed to connect to {}: {source}", path.display())]
  Connect {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Request or response over the daemon socket failed.
  #[error(transparent)]
  Socket(#[from] hyper::Error),

  /// The request could not be assembled.
  #[error(transparent)]
  Request(#[from] hyper::http::Error),
}

/// Errors that can occur while building and loading an image.
#[derive(Debug, Error)]
pub enum BuildError {
  /// Bazel could not be run or exited with a failure.
  #[error("bazel build failed: {0}")]
  BuildFailed(#[source] ProcessError),

  /// The archive derived from the target does not exist or is unreadable.
  #[error("{path}: {source}")]
  ArchiveNotFound {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The request to the daemon failed in transport.
  #[error("request to daemon failed: {0}")]
  Daemon(#[source] TransportError),

  /// The daemon rejected the request.
  #[error("daemon returned {status}: {message}")]
  DaemonStatus { status: u16, message: String },

  /// The daemon reported an error while loading.
  #[error("{message}")]
  LoadError { message: String },

  /// A load response record could not be decoded.
  #[error("malformed load response: {0}")]
  Protocol(#[source] serde_json::Error),

  /// The cancellation context fired.
  #[error("cancelled")]
  Cancelled,

  /// Writing to the output sink failed.
  #[error("writing build output: {0}")]
  Sink(#[source] std::io::Error),
}

/// A step of [`ImageBuilder::build`](crate::build::ImageBuilder::build).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  RunningCommand,
  OpeningTarball,
  LoadingImage,
  ReadingLoadResponse,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Stage::RunningCommand => "running command",
      Stage::OpeningTarball => "opening image tarball",
      Stage::LoadingImage => "loading image into docker daemon",
      Stage::ReadingLoadResponse => "reading from image load response",
    };
    f.write_str(name)
  }
}

/// A [`BuildError`] tagged with the stage it occurred in.
#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct Error {
  pub stage: Stage,
  #[source]
  pub source: BuildError,
}

impl Error {
  /// The underlying failure.
  pub fn kind(&self) -> &BuildError {
    &self.source
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self.source, BuildError::Cancelled)
  }
}

/// Tags a stage onto the error of a result.
pub trait StageExt<T> {
  fn stage(self, stage: Stage) -> Result<T, Error>;
}

impl<T> StageExt<T> for Result<T, BuildError> {
  fn stage(self, stage: Stage) -> Result<T, Error> {
    self.map_err(|source| Error { stage, source })
  }
}

impl BuildError {
  pub(crate) fn transport(err: impl Into<TransportError>) -> Self {
    BuildError::Daemon(err.into())
  }
}

/// Errors from resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// The daemon address uses a transport the HTTP client cannot reach.
  #[error("unsupported docker host '{0}': only unix://, tcp://, http:// and https:// hosts are supported")]
  UnsupportedHost(String),

  /// The HTTP client could not be constructed.
  #[error("failed to create docker client: {0}")]
  Client(#[source] reqwest::Error),
}
