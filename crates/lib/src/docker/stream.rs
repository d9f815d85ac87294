//! Forwarding the image-load response to the output sink.

use std::future::Future;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::cancel::Cancellation;
use crate::docker::message::{LoadSummary, MessageDecoder};
use crate::error::BuildError;

/// A response body read chunk by chunk.
pub trait ResponseBody {
  /// The next chunk of the body, or `None` at the end.
  fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, BuildError>> + Send;
}

/// Decode progress records from `body` and write each one to `sink` as soon
/// as it is complete.
///
/// Stops at the first record carrying an error and returns it as
/// [`BuildError::LoadError`]; everything before it has already been written.
pub async fn stream_load_response<B, W>(
  body: &mut B,
  sink: &mut W,
  cancel: &Cancellation,
) -> Result<LoadSummary, BuildError>
where
  B: ResponseBody,
  W: AsyncWrite + Unpin + ?Sized,
{
  let mut decoder = MessageDecoder::new();
  let mut summary = LoadSummary::default();

  loop {
    let chunk = tokio::select! {
      chunk = body.next_chunk() => chunk?,
      _ = cancel.cancelled() => return Err(BuildError::Cancelled),
    };
    let Some(chunk) = chunk else {
      break;
    };
    decoder.extend(&chunk);

    while let Some(message) = decoder.next_message().map_err(BuildError::Protocol)? {
      if let Some(error) = message.error_message() {
        warn!(error = %error, "daemon reported load error");
        return Err(BuildError::LoadError {
          message: error.to_string(),
        });
      }

      if let Some(text) = message.display_text() {
        sink.write_all(text.as_bytes()).await.map_err(BuildError::Sink)?;
        sink.flush().await.map_err(BuildError::Sink)?;
      }
      summary.record(&message);
    }
  }

  decoder.finish().map_err(BuildError::Protocol)?;
  debug!(images = ?summary.images, image_ids = ?summary.image_ids, "load response complete");
  Ok(summary)
}

#[cfg(test)]
mod tests {
  use std::collections::VecDeque;
  use std::time::Duration;

  use super::*;
  use crate::cancel::cancellation;

  /// In-memory body yielding fixed chunks.
  struct Chunks(VecDeque<Vec<u8>>);

  impl Chunks {
    fn new(chunks: &[&str]) -> Self {
      Self(chunks.iter().map(|c| c.as_bytes().to_vec()).collect())
    }
  }

  impl ResponseBody for Chunks {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, BuildError> {
      Ok(self.0.pop_front())
    }
  }

  /// Body that never yields.
  struct Stalled;

  impl ResponseBody for Stalled {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, BuildError> {
      std::future::pending().await
    }
  }

  #[tokio::test]
  async fn forwards_status_records() {
    let mut body = Chunks::new(&[
      "{\"status\":\"Loading layer\",\"id\":\"abc\"}\n",
      "{\"stream\":\"Loaded image: bazel:hello\\n\"}\n",
    ]);
    let mut sink = Vec::new();

    let summary = stream_load_response(&mut body, &mut sink, &Cancellation::never())
      .await
      .unwrap();

    assert_eq!(
      String::from_utf8(sink).unwrap(),
      "abc: Loading layer\nLoaded image: bazel:hello\n"
    );
    assert_eq!(summary.images, vec!["bazel:hello"]);
  }

  #[tokio::test]
  async fn record_split_across_chunks() {
    let mut body = Chunks::new(&["{\"stat", "us\":\"Done\"}", "\n"]);
    let mut sink = Vec::new();

    stream_load_response(&mut body, &mut sink, &Cancellation::never())
      .await
      .unwrap();

    assert_eq!(String::from_utf8(sink).unwrap(), "Done\n");
  }

  #[tokio::test]
  async fn error_record_stops_after_forwarding_prior_status() {
    let mut body = Chunks::new(&[
      "{\"status\":\"Loading layer\"}\n{\"errorDetail\":{\"message\":\"unexpected EOF\"},\"error\":\"unexpected EOF\"}\n",
      "{\"status\":\"never shown\"}\n",
    ]);
    let mut sink = Vec::new();

    let err = stream_load_response(&mut body, &mut sink, &Cancellation::never())
      .await
      .unwrap_err();

    match err {
      BuildError::LoadError { message } => assert_eq!(message, "unexpected EOF"),
      other => panic!("expected LoadError, got {:?}", other),
    }
    assert_eq!(String::from_utf8(sink).unwrap(), "Loading layer\n");
  }

  #[tokio::test]
  async fn malformed_record_is_protocol_error() {
    let mut body = Chunks::new(&["{\"status\":\"ok\"}\n<html>bad gateway</html>"]);
    let mut sink = Vec::new();

    let err = stream_load_response(&mut body, &mut sink, &Cancellation::never())
      .await
      .unwrap_err();

    assert!(matches!(err, BuildError::Protocol(_)));
    assert_eq!(String::from_utf8(sink).unwrap(), "ok\n");
  }

  #[tokio::test]
  async fn truncated_stream_is_protocol_error() {
    let mut body = Chunks::new(&["{\"status\":\"Load"]);

    let err = stream_load_response(&mut body, &mut tokio::io::sink(), &Cancellation::never())
      .await
      .unwrap_err();

    assert!(matches!(err, BuildError::Protocol(_)));
  }

  #[tokio::test]
  async fn empty_body_is_success() {
    let mut body = Chunks::new(&[]);

    let summary = stream_load_response(&mut body, &mut tokio::io::sink(), &Cancellation::never())
      .await
      .unwrap();

    assert_eq!(summary, LoadSummary::default());
  }

  #[tokio::test]
  async fn cancel_while_waiting_for_body() {
    let (handle, cancel) = cancellation();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      handle.cancel();
    });

    let result = tokio::time::timeout(
      Duration::from_secs(5),
      stream_load_response(&mut Stalled, &mut tokio::io::sink(), &cancel),
    )
    .await
    .expect("cancellation should end the stream");

    assert!(matches!(result, Err(BuildError::Cancelled)));
  }
}
