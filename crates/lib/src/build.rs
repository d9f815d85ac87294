//! Building a Bazel image target and loading it into the Docker daemon.
//!
//! [`ImageBuilder::build`] runs four stages in order, stopping at the first
//! failure:
//!
//! 1. `bazel build <target>` in the workspace, output streamed to the sink
//! 2. open the archive under `bazel-bin` derived from the target
//! 3. upload the archive to the daemon's image-load endpoint
//! 4. stream the daemon's progress records to the sink
//!
//! and then returns the image reference derived from the target.
//!
//! # Concurrency
//!
//! Builds share no state and take no locks. Running several builds against
//! the same workspace is only as safe as Bazel and the daemon make it, and
//! callers that need serialization must provide it themselves.

use std::path::PathBuf;
use std::time::Instant;

use tokio::io::AsyncWrite;
use tracing::info;

use crate::archive::open_first_archive;
use crate::cancel::Cancellation;
use crate::config::Config;
use crate::docker::{DockerClient, stream_load_response};
use crate::error::{ConfigError, Error, Stage, StageExt};
use crate::invoke::Bazel;
use crate::target::{archive_paths, image_reference};

/// A Bazel target producing an image archive, and the workspace it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BazelArtifact {
  /// Bazel label, e.g. `//app:image.tar`.
  pub build_target: String,
  /// Root of the Bazel workspace.
  pub workspace: PathBuf,
}

impl BazelArtifact {
  pub fn new(build_target: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
    Self {
      build_target: build_target.into(),
      workspace: workspace.into(),
    }
  }
}

/// Builds Bazel image targets and loads them into a daemon.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
  bazel: Bazel,
  docker: DockerClient,
}

impl ImageBuilder {
  pub fn new(bazel: Bazel, docker: DockerClient) -> Self {
    Self { bazel, docker }
  }

  pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
    Ok(Self::new(
      Bazel::new(config.bazel.clone()),
      DockerClient::new(&config.docker)?,
    ))
  }

  /// Build `artifact`, load it into the daemon and return its image
  /// reference (`bazel:<name>` or `bazel/<pkg>:<name>`).
  ///
  /// Bazel output and daemon progress are written to `sink` as they arrive.
  /// Nothing is cached; every call runs the full pipeline.
  pub async fn build<W>(&self, cancel: &Cancellation, sink: &mut W, artifact: &BazelArtifact) -> Result<String, Error>
  where
    W: AsyncWrite + Unpin + ?Sized,
  {
    let started = Instant::now();
    let target = artifact.build_target.as_str();
    let workspace = artifact.workspace.as_path();

    self
      .bazel
      .invoke_build(workspace, target, sink, cancel)
      .await
      .stage(Stage::RunningCommand)?;

    let archive = open_first_archive(workspace, &archive_paths(target))
      .await
      .stage(Stage::OpeningTarball)?;

    let mut response = self
      .docker
      .image_load(archive, false, cancel)
      .await
      .stage(Stage::LoadingImage)?;

    let summary = stream_load_response(&mut response, sink, cancel)
      .await
      .stage(Stage::ReadingLoadResponse)?;

    let image = image_reference(target);
    info!(
      image = %image,
      loaded = ?summary.images,
      elapsed_ms = started.elapsed().as_millis() as u64,
      "image loaded"
    );
    Ok(image)
  }
}
