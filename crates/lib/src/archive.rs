//! Locating and opening the image archive Bazel produced.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tracing::debug;

use crate::consts::BAZEL_BIN_DIR;
use crate::error::BuildError;

/// `<workspace>/bazel-bin/<archive_path>`.
pub fn archive_location(workspace: &Path, archive_path: &str) -> PathBuf {
  workspace.join(BAZEL_BIN_DIR).join(archive_path)
}

/// Open the archive at `archive_path` under the workspace's `bazel-bin`.
///
/// The returned handle closes when dropped; handing it to
/// [`DockerClient::image_load`](crate::docker::DockerClient::image_load)
/// moves that responsibility into the request body.
pub async fn open_archive(workspace: &Path, archive_path: &str) -> Result<File, BuildError> {
  let path = archive_location(workspace, archive_path);
  debug!(path = %path.display(), "opening image archive");

  File::open(&path)
    .await
    .map_err(|source| BuildError::ArchiveNotFound { path, source })
}

/// Open the first of `candidates` that exists.
///
/// When none can be opened the error names the first candidate, the path the
/// target derives to.
pub async fn open_first_archive(workspace: &Path, candidates: &[String]) -> Result<File, BuildError> {
  let mut first_err = None;
  for candidate in candidates {
    match open_archive(workspace, candidate).await {
      Ok(file) => return Ok(file),
      Err(e) => {
        first_err.get_or_insert(e);
      }
    }
  }

  Err(first_err.unwrap_or_else(|| BuildError::ArchiveNotFound {
    path: workspace.join(BAZEL_BIN_DIR),
    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no archive path derived from target"),
  }))
}
