//! Bazel label transformations.
//!
//! Everything here is a pure function of the label string. Nothing is
//! validated: a label the rules below do not understand still yields a path and
//! a tag, and the mismatch surfaces later when the archive cannot be opened.

use std::path::MAIN_SEPARATOR_STR;

use crate::consts::{ARCHIVE_SUFFIX, IMAGE_REF_PREFIX};

/// Strip a leading `//` and then a leading `:`.
///
/// The root package's targets are written `//:name`, so removing `//` alone
/// would leave the colon behind.
pub fn trim_address_prefix(target: &str) -> &str {
  let trimmed = target.strip_prefix("//").unwrap_or(target);
  trimmed.strip_prefix(':').unwrap_or(trimmed)
}

/// Location of the target's archive relative to `bazel-bin`.
///
/// A trailing `.tar` is dropped, and only the first `:` becomes a path
/// separator. A label with more colons gives a path that does not match
/// Bazel's output layout; this is kept as-is since callers rely on the current
/// derivation.
pub fn derive_path(target: &str) -> String {
  separate_package(strip_archive_suffix(trim_address_prefix(target)))
}

/// Paths to try, in order, when opening the target's archive.
///
/// The first is [`derive_path`]. A `.tar` label also gets the unstripped name,
/// which is where `container_image` rules write their implicit tarball.
pub fn archive_paths(target: &str) -> Vec<String> {
  let derived = derive_path(target);
  let literal = separate_package(trim_address_prefix(target));
  if literal == derived {
    vec![derived]
  } else {
    vec![derived, literal]
  }
}

fn separate_package(label: &str) -> String {
  label.replacen(':', MAIN_SEPARATOR_STR, 1)
}

fn strip_archive_suffix(label: &str) -> &str {
  label.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(label)
}

/// Tag suffix appended to [`IMAGE_REF_PREFIX`].
///
/// Root targets become a tag (`:name`), packaged targets become a repository
/// path (`/pkg:name`).
pub fn derive_tag_suffix(target: &str) -> String {
  let tag = trim_address_prefix(target);
  let tag = tag.strip_prefix(':').unwrap_or(tag);
  let tag = strip_archive_suffix(tag);

  if tag.contains(':') {
    format!("/{}", tag)
  } else {
    format!(":{}", tag)
  }
}

/// Full image reference for a target, e.g. `bazel:hello` or `bazel/pkg:name`.
pub fn image_reference(target: &str) -> String {
  format!("{}{}", IMAGE_REF_PREFIX, derive_tag_suffix(target))
}
