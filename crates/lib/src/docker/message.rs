//! Progress records of the daemon's image-load response.
//!
//! The daemon writes a sequence of JSON objects, usually one per line but
//! without any framing guarantee, so [`MessageDecoder`] works on raw bytes.

use serde::Deserialize;
use serde_json::Deserializer;

const LOADED_IMAGE: &str = "Loaded image: ";
const LOADED_IMAGE_ID: &str = "Loaded image ID: ";

/// Structured error attached to a record.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
  #[serde(default)]
  pub code: Option<i64>,
  #[serde(default)]
  pub message: Option<String>,
}

/// A single progress record.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LoadMessage {
  #[serde(default)]
  pub id: Option<String>,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub progress: Option<String>,
  #[serde(default)]
  pub stream: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default, rename = "errorDetail")]
  pub error_detail: Option<ErrorDetail>,
}

impl LoadMessage {
  /// The in-band error, if this record reports one.
  ///
  /// `errorDetail.message` takes precedence over the flat `error` string.
  pub fn error_message(&self) -> Option<&str> {
    self
      .error_detail
      .as_ref()
      .and_then(|detail| detail.message.as_deref())
      .filter(|message| !message.is_empty())
      .or_else(|| self.error.as_deref().filter(|message| !message.is_empty()))
  }

  /// Text to show for this record, or `None` if it has nothing to show.
  ///
  /// `stream` is passed through untouched since it carries its own newlines.
  /// Status records become `id: status progress` lines.
  pub fn display_text(&self) -> Option<String> {
    if let Some(stream) = &self.stream {
      return Some(stream.clone());
    }

    let status = self.status.as_deref()?;
    let mut line = String::new();
    if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
      line.push_str(id);
      line.push_str(": ");
    }
    line.push_str(status);
    if let Some(progress) = self.progress.as_deref().filter(|p| !p.is_empty()) {
      line.push(' ');
      line.push_str(progress);
    }
    line.push('\n');
    Some(line)
  }
}

/// Images the daemon reported as loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
  /// Names from `Loaded image: <name>`.
  pub images: Vec<String>,
  /// IDs from `Loaded image ID: <id>`, reported for untagged archives.
  pub image_ids: Vec<String>,
}

impl LoadSummary {
  pub fn record(&mut self, message: &LoadMessage) {
    let text = message.stream.as_deref().or(message.status.as_deref());
    let Some(text) = text else {
      return;
    };

    for line in text.lines().map(str::trim) {
      if let Some(id) = line.strip_prefix(LOADED_IMAGE_ID) {
        self.image_ids.push(id.to_string());
      } else if let Some(name) = line.strip_prefix(LOADED_IMAGE) {
        self.images.push(name.to_string());
      }
    }
  }
}

/// Incremental decoder for a stream of concatenated JSON records.
#[derive(Debug, Default)]
pub struct MessageDecoder {
  buf: Vec<u8>,
  /// The buffer ends in a partial record; no new record can complete until a
  /// `}` or newline arrives.
  incomplete: bool,
}

impl MessageDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append bytes received from the response body.
  pub fn extend(&mut self, chunk: &[u8]) {
    if chunk.iter().any(|&b| matches!(b, b'}' | b'\n')) {
      self.incomplete = false;
    }
    self.buf.extend_from_slice(chunk);
  }

  /// Decode the next complete record.
  ///
  /// Returns `Ok(None)` when the buffer holds only whitespace or a record
  /// that has not fully arrived yet.
  pub fn next_message(&mut self) -> Result<Option<LoadMessage>, serde_json::Error> {
    if self.incomplete {
      return Ok(None);
    }

    let (message, consumed) = {
      let mut records = Deserializer::from_slice(&self.buf).into_iter::<LoadMessage>();
      match records.next() {
        Some(Ok(message)) => (Some(message), records.byte_offset()),
        Some(Err(e)) if e.is_eof() => {
          self.incomplete = true;
          return Ok(None);
        }
        Some(Err(e)) => return Err(e),
        None => (None, self.buf.len()),
      }
    };

    self.buf.drain(..consumed);
    Ok(message)
  }

  /// Check that nothing but whitespace is left once the stream has ended.
  pub fn finish(&self) -> Result<(), serde_json::Error> {
    if self.buf.iter().all(u8::is_ascii_whitespace) {
      return Ok(());
    }
    serde_json::from_slice::<LoadMessage>(&self.buf).map(|_| ())
  }
}
