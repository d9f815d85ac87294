//! Engine API requests over the daemon's unix domain socket.
//!
//! One connection is opened per request. The connection is driven by a
//! spawned task that is aborted when the request or its response is dropped,
//! which closes the socket and the archive streamed into it.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::client::conn::http1;
use hyper::header::{CONTENT_TYPE, HOST, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::fs::File;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{BuildError, TransportError};

type RequestBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// `Host` header sent over the socket, where there is no real host name.
const SOCKET_HOST: &str = "docker";

#[derive(Debug, Clone)]
pub(crate) struct SocketClient {
  path: PathBuf,
}

impl SocketClient {
  pub(crate) fn new(path: PathBuf) -> Self {
    Self { path }
  }

  pub(crate) fn path(&self) -> &Path {
    &self.path
  }

  /// POST `archive` as an `application/x-tar` body to `path_and_query`.
  pub(crate) async fn post_archive(
    &self,
    path_and_query: &str,
    content_type: &str,
    user_agent: &str,
    archive: File,
  ) -> Result<SocketResponse, BuildError> {
    let stream = UnixStream::connect(&self.path).await.map_err(|source| {
      BuildError::Daemon(TransportError::Connect {
        path: self.path.clone(),
        source,
      })
    })?;

    let (mut sender, connection) = http1::handshake::<_, RequestBody>(TokioIo::new(stream))
      .await
      .map_err(BuildError::transport)?;
    let connection = ConnectionTask::spawn(connection);

    let body = StreamBody::new(ReaderStream::new(archive).map_ok(Frame::data)).boxed_unsync();
    let request = Request::builder()
      .method(Method::POST)
      .uri(path_and_query)
      .header(HOST, SOCKET_HOST)
      .header(USER_AGENT, user_agent)
      .header(CONTENT_TYPE, content_type)
      .body(body)
      .map_err(BuildError::transport)?;

    let response = sender.send_request(request).await.map_err(BuildError::transport)?;
    Ok(SocketResponse {
      response,
      _connection: connection,
    })
  }
}

/// Response to a socket request. Holds the connection open until dropped.
#[derive(Debug)]
pub(crate) struct SocketResponse {
  response: Response<Incoming>,
  _connection: ConnectionTask,
}

impl SocketResponse {
  pub(crate) fn status(&self) -> StatusCode {
    self.response.status()
  }

  /// Next data frame of the body, `None` once the body has ended.
  pub(crate) async fn chunk(&mut self) -> Result<Option<Bytes>, BuildError> {
    while let Some(frame) = self.response.body_mut().frame().await {
      let frame = frame.map_err(BuildError::transport)?;
      if let Ok(data) = frame.into_data() {
        return Ok(Some(data));
      }
    }
    Ok(None)
  }

  /// The whole remaining body as text.
  pub(crate) async fn text(self) -> Result<String, BuildError> {
    let body = self
      .response
      .into_body()
      .collect()
      .await
      .map_err(BuildError::transport)?
      .to_bytes();
    Ok(String::from_utf8_lossy(&body).into_owned())
  }
}

#[derive(Debug)]
struct ConnectionTask(JoinHandle<()>);

impl ConnectionTask {
  fn spawn(connection: http1::Connection<TokioIo<UnixStream>, RequestBody>) -> Self {
    Self(tokio::spawn(async move {
      if let Err(e) = connection.await {
        debug!(error = %e, "daemon connection closed with error");
      }
    }))
  }
}

impl Drop for ConnectionTask {
  fn drop(&mut self) {
    self.0.abort();
  }
}
