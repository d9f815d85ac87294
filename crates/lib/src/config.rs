//! Configuration resolved from the environment.
//!
//! The build pipeline never reads the environment itself. Callers build a
//! [`Config`], usually with [`Config::from_env`], and override fields as they
//! see fit before constructing the clients.

use std::path::PathBuf;

use tracing::debug;

use crate::consts::{DEFAULT_DOCKER_HOST, ENV_BAZEL, ENV_DOCKER_API_VERSION, ENV_DOCKER_HOST};
use crate::error::ConfigError;

pub use crate::invoke::BazelConfig;

/// Where and how to reach the Docker daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DockerConfig {
  /// Daemon address in `DOCKER_HOST` syntax. `None` uses the default.
  pub host: Option<String>,
  /// Engine API version to pin requests to, e.g. `1.43`.
  pub api_version: Option<String>,
}

/// A daemon address resolved from `DOCKER_HOST` syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonAddress {
  /// HTTP base URL, without a trailing slash.
  Http(String),
  /// Unix domain socket the daemon listens on.
  #[cfg(unix)]
  Unix(PathBuf),
}

impl DockerConfig {
  /// Resolve the configured host, falling back to the platform default.
  ///
  /// `unix://` hosts use the socket path, `tcp://` hosts become `http://`
  /// URLs and `http(s)://` hosts are kept as they are.
  pub fn address(&self) -> Result<DaemonAddress, ConfigError> {
    let host = self
      .host
      .as_deref()
      .map(str::trim)
      .filter(|h| !h.is_empty())
      .unwrap_or(DEFAULT_DOCKER_HOST);
    let unsupported = || ConfigError::UnsupportedHost(host.to_string());

    if let Some(path) = host.strip_prefix("unix://") {
      return socket_address(path).ok_or_else(unsupported);
    }

    let url = if let Some(rest) = host.strip_prefix("tcp://") {
      format!("http://{}", rest)
    } else if host.starts_with("http://") || host.starts_with("https://") {
      host.to_string()
    } else {
      return Err(unsupported());
    };

    Ok(DaemonAddress::Http(url.trim_end_matches('/').to_string()))
  }
}

#[cfg(unix)]
fn socket_address(path: &str) -> Option<DaemonAddress> {
  (!path.is_empty()).then(|| DaemonAddress::Unix(PathBuf::from(path)))
}

#[cfg(not(unix))]
fn socket_address(_path: &str) -> Option<DaemonAddress> {
  None
}

/// Everything needed to construct an [`ImageBuilder`](crate::build::ImageBuilder).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
  pub bazel: BazelConfig,
  pub docker: DockerConfig,
}

impl Config {
  /// Read `BZLIMAGE_BAZEL`, `DOCKER_HOST` and `DOCKER_API_VERSION`.
  ///
  /// Unset or empty variables leave the defaults in place.
  pub fn from_env() -> Self {
    let mut config = Config::default();

    if let Some(program) = env_var(ENV_BAZEL) {
      config.bazel.program = PathBuf::from(program);
    }
    config.docker.host = env_var(ENV_DOCKER_HOST);
    config.docker.api_version = env_var(ENV_DOCKER_API_VERSION);

    debug!(?config, "resolved configuration from environment");
    config
  }
}

fn env_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  fn docker(host: &str) -> DockerConfig {
    DockerConfig {
      host: Some(host.to_string()),
      api_version: None,
    }
  }

  fn http(url: &str) -> DaemonAddress {
    DaemonAddress::Http(url.to_string())
  }

  #[test]
  #[cfg(unix)]
  fn default_host_is_local_socket() {
    let socket = DaemonAddress::Unix(PathBuf::from("/var/run/docker.sock"));
    assert_eq!(DockerConfig::default().address().unwrap(), socket);
    assert_eq!(docker("  ").address().unwrap(), socket);
  }

  #[test]
  #[cfg(unix)]
  fn unix_host_keeps_socket_path() {
    assert_eq!(
      docker("unix:///run/user/1000/docker.sock").address().unwrap(),
      DaemonAddress::Unix(PathBuf::from("/run/user/1000/docker.sock"))
    );
  }

  #[test]
  fn tcp_host_becomes_http() {
    assert_eq!(docker("tcp://10.0.0.5:2376").address().unwrap(), http("http://10.0.0.5:2376"));
  }

  #[test]
  fn http_hosts_are_kept() {
    assert_eq!(docker("https://docker.internal/").address().unwrap(), http("https://docker.internal"));
    assert_eq!(docker("http://127.0.0.1:2375").address().unwrap(), http("http://127.0.0.1:2375"));
  }

  #[test]
  fn unreachable_hosts_are_rejected() {
    for host in ["unix://", "npipe:////./pipe/docker_engine", "ssh://builder@remote"] {
      assert!(
        matches!(docker(host).address(), Err(ConfigError::UnsupportedHost(h)) if h == host),
        "host {}",
        host
      );
    }
  }

  #[test]
  #[serial]
  fn from_env_reads_variables() {
    temp_env::with_vars(
      [
        (ENV_BAZEL, Some("/opt/bazel/bin/bazelisk")),
        (ENV_DOCKER_HOST, Some("tcp://docker:2375")),
        (ENV_DOCKER_API_VERSION, Some("1.43")),
      ],
      || {
        let config = Config::from_env();
        assert_eq!(config.bazel.program, PathBuf::from("/opt/bazel/bin/bazelisk"));
        assert_eq!(config.docker.host.as_deref(), Some("tcp://docker:2375"));
        assert_eq!(config.docker.api_version.as_deref(), Some("1.43"));
      },
    );
  }

  #[test]
  #[serial]
  fn from_env_defaults_when_unset_or_empty() {
    temp_env::with_vars(
      [
        (ENV_BAZEL, None),
        (ENV_DOCKER_HOST, Some("")),
        (ENV_DOCKER_API_VERSION, None),
      ],
      || {
        let config = Config::from_env();
        assert_eq!(config, Config::default());
      },
    );
  }
}
