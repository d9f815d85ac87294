//! Shared test helpers for bzlimage-lib.
//!
//! Compiled into the library's unit tests as well as the integration tests.
//! Stub Bazel runs are plain `/bin/sh -c` scripts so tests never write and
//! exec a file of their own.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use bzlimage_lib::consts::BAZEL_BIN_DIR;
use bzlimage_lib::invoke::{Bazel, BazelConfig};

/// A [`Bazel`] that runs `script` instead of bazel.
///
/// The script sees `$1 = build` and `$2 = <target>`.
#[cfg(unix)]
pub fn sh_bazel(script: &str) -> Bazel {
  Bazel::new(BazelConfig {
    program: PathBuf::from("/bin/sh"),
    startup_args: vec!["-c".to_string(), script.to_string(), "bazel".to_string()],
  })
}

/// Create `bazel-bin/<relative>` under `workspace` with `content`.
pub fn write_archive(workspace: &Path, relative: &str, content: &[u8]) -> PathBuf {
  let path = workspace.join(BAZEL_BIN_DIR).join(relative);
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(&path, content).unwrap();
  path
}

/// A complete HTTP/1.1 response that closes the connection.
pub fn http_response(status_line: &str, body: &str) -> String {
  format!(
    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
    status_line,
    body.len(),
    body
  )
}

/// A daemon listening on `<dir>/docker.sock` that answers one request.
///
/// It reads the request up to the end of the chunked archive body, replies
/// with `response` and closes. The join handle yields the raw request.
#[cfg(unix)]
pub fn socket_daemon(dir: &Path, response: String) -> (PathBuf, tokio::task::JoinHandle<String>) {
  use tokio::io::{AsyncReadExt, AsyncWriteExt};

  let path = dir.join("docker.sock");
  let listener = tokio::net::UnixListener::bind(&path).unwrap();
  let task = tokio::spawn(async move {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    while !request.ends_with(b"0\r\n\r\n") {
      let n = stream.read(&mut buf).await.unwrap();
      if n == 0 {
        break;
      }
      request.extend_from_slice(&buf[..n]);
    }
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();
    String::from_utf8_lossy(&request).into_owned()
  });
  (path, task)
}

/// A TCP daemon that sends the head of a response and part of its body,
/// then holds the connection open without sending the rest.
pub async fn stalling_daemon(head: &'static str) -> String {
  use tokio::io::{AsyncReadExt, AsyncWriteExt};

  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    let mut held = Vec::new();
    while let Ok((mut socket, _)) = listener.accept().await {
      let mut buf = [0u8; 4096];
      let _ = socket.read(&mut buf).await;
      let _ = socket.write_all(head.as_bytes()).await;
      held.push(socket);
    }
  });
  format!("http://{}", addr)
}
