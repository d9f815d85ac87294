//! Fixed names of the Bazel and Docker integration.

pub const APP_NAME: &str = "bzlimage";

/// Program invoked when no override is configured.
pub const DEFAULT_BAZEL_PROGRAM: &str = "bazel";

/// Bazel's output directory, relative to the workspace root.
pub const BAZEL_BIN_DIR: &str = "bazel-bin";

/// Repository prefix of every image reference this crate returns.
pub const IMAGE_REF_PREFIX: &str = "bazel";

/// Suffix stripped from a target when deriving its image tag.
pub const ARCHIVE_SUFFIX: &str = ".tar";

/// Daemon endpoint used when `DOCKER_HOST` is not set.
#[cfg(unix)]
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";
#[cfg(not(unix))]
pub const DEFAULT_DOCKER_HOST: &str = "tcp://localhost:2375";

pub const ENV_BAZEL: &str = "BZLIMAGE_BAZEL";
pub const ENV_DOCKER_HOST: &str = "DOCKER_HOST";
pub const ENV_DOCKER_API_VERSION: &str = "DOCKER_API_VERSION";
