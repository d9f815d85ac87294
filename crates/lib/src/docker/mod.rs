//! Docker daemon client for loading image archives.
//!
//! Talks to the Engine API over the daemon's unix socket or over HTTP. The
//! archive is streamed as the request body, and the JSON progress response is
//! handed to [`stream_load_response`].

pub mod message;
#[cfg(unix)]
mod socket;
pub mod stream;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, StatusCode};
use serde::Deserialize;
use tokio::fs::File;
use tracing::{debug, info};

use crate::cancel::Cancellation;
use crate::config::{DaemonAddress, DockerConfig};
use crate::consts::APP_NAME;
use crate::error::{BuildError, ConfigError};

pub use message::{LoadMessage, LoadSummary, MessageDecoder};
pub use stream::{ResponseBody, stream_load_response};

const TAR_CONTENT_TYPE: &str = "application/x-tar";

/// Error body returned by the daemon with non-2xx statuses.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
  message: String,
}

#[derive(Debug, Clone)]
enum Transport {
  Http { client: reqwest::Client, base_url: String },
  #[cfg(unix)]
  Unix(socket::SocketClient),
}

/// Client for a Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerClient {
  transport: Transport,
  api_version: Option<String>,
}

impl DockerClient {
  pub fn new(config: &DockerConfig) -> Result<Self, ConfigError> {
    let transport = match config.address()? {
      DaemonAddress::Http(base_url) => {
        let client = reqwest::Client::builder()
          .user_agent(user_agent())
          .build()
          .map_err(ConfigError::Client)?;
        Transport::Http { client, base_url }
      }
      #[cfg(unix)]
      DaemonAddress::Unix(path) => Transport::Unix(socket::SocketClient::new(path)),
    };

    Ok(Self {
      transport,
      api_version: config.api_version.clone(),
    })
  }

  /// Where requests for an API path go, versioned when an API version is
  /// configured.
  pub fn endpoint(&self, path: &str) -> String {
    let path = self.versioned(path);
    match &self.transport {
      Transport::Http { base_url, .. } => format!("{}{}", base_url, path),
      #[cfg(unix)]
      Transport::Unix(socket) => format!("unix://{}:{}", socket.path().display(), path),
    }
  }

  fn versioned(&self, path: &str) -> String {
    match &self.api_version {
      Some(version) => format!("/v{}{}", version.trim_start_matches('v'), path),
      None => path.to_string(),
    }
  }

  /// Upload `archive` to `POST /images/load`.
  ///
  /// With `quiet` unset the daemon streams progress records back. The archive
  /// handle is owned by the request body and is closed when the request
  /// completes, fails, or is dropped on cancellation. Cancellation is honored
  /// until the response is handed back, including while a rejection's error
  /// body is read.
  pub async fn image_load(
    &self,
    archive: File,
    quiet: bool,
    cancel: &Cancellation,
  ) -> Result<LoadResponse, BuildError> {
    let quiet = if quiet { "1" } else { "0" };
    debug!(endpoint = %self.endpoint("/images/load"), quiet, "uploading image archive");

    let request = self.send_archive(archive, quiet);
    let response = tokio::select! {
      response = request => response?,
      _ = cancel.cancelled() => return Err(upload_cancelled()),
    };

    let status = response.status();
    if !status.is_success() {
      let body = tokio::select! {
        body = response.text() => body?,
        _ = cancel.cancelled() => return Err(upload_cancelled()),
      };
      return Err(BuildError::DaemonStatus {
        status: status.as_u16(),
        message: daemon_error_message(status, &body),
      });
    }

    Ok(response)
  }

  async fn send_archive(&self, archive: File, quiet: &str) -> Result<LoadResponse, BuildError> {
    let path = self.versioned("/images/load");
    match &self.transport {
      Transport::Http { client, base_url } => {
        let response = client
          .post(format!("{}{}", base_url, path))
          .query(&[("quiet", quiet)])
          .header(CONTENT_TYPE, TAR_CONTENT_TYPE)
          .body(Body::from(archive))
          .send()
          .await
          .map_err(BuildError::transport)?;
        Ok(LoadResponse {
          inner: Inner::Http(response),
        })
      }
      #[cfg(unix)]
      Transport::Unix(socket) => {
        let path_and_query = format!("{}?quiet={}", path, quiet);
        let response = socket
          .post_archive(&path_and_query, TAR_CONTENT_TYPE, &user_agent(), archive)
          .await?;
        Ok(LoadResponse {
          inner: Inner::Socket(response),
        })
      }
    }
  }
}

fn user_agent() -> String {
  format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION"))
}

fn upload_cancelled() -> BuildError {
  info!("image upload cancelled");
  BuildError::Cancelled
}

fn daemon_error_message(status: StatusCode, body: &str) -> String {
  if let Ok(error) = serde_json::from_str::<ErrorResponse>(body) {
    return error.message;
  }
  let body = body.trim();
  if body.is_empty() {
    status.canonical_reason().unwrap_or("unknown error").to_string()
  } else {
    body.to_string()
  }
}

/// Response to an image load. The connection is released when this is
/// dropped.
#[derive(Debug)]
pub struct LoadResponse {
  inner: Inner,
}

#[derive(Debug)]
enum Inner {
  Http(reqwest::Response),
  #[cfg(unix)]
  Socket(socket::SocketResponse),
}

impl LoadResponse {
  fn status(&self) -> StatusCode {
    match &self.inner {
      Inner::Http(response) => response.status(),
      #[cfg(unix)]
      Inner::Socket(response) => response.status(),
    }
  }

  async fn text(self) -> Result<String, BuildError> {
    match self.inner {
      Inner::Http(response) => response.text().await.map_err(BuildError::transport),
      #[cfg(unix)]
      Inner::Socket(response) => response.text().await,
    }
  }
}

impl ResponseBody for LoadResponse {
  async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, BuildError> {
    let chunk = match &mut self.inner {
      Inner::Http(response) => response.chunk().await.map_err(BuildError::transport)?,
      #[cfg(unix)]
      Inner::Socket(response) => response.chunk().await?,
    };
    Ok(chunk.map(|bytes| bytes.to_vec()))
  }
}
