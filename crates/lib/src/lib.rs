//! bzlimage-lib: build Bazel image targets and load them into Docker.
//!
//! This crate provides:
//! - `target`: pure derivation of archive paths and image tags from labels
//! - `invoke`: running `bazel build` with live output
//! - `archive`: opening the archive under `bazel-bin`
//! - `docker`: uploading archives and streaming load progress
//! - `build`: the `ImageBuilder` pipeline tying them together

pub mod archive;
pub mod build;
pub mod cancel;
pub mod config;
pub mod consts;
pub mod docker;
pub mod error;
pub mod invoke;
pub mod target;

#[cfg(test)]
extern crate self as bzlimage_lib;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod testutil;

pub use build::{BazelArtifact, ImageBuilder};
pub use cancel::{CancelHandle, Cancellation, cancellation};
pub use config::{BazelConfig, Config, DaemonAddress, DockerConfig};
pub use error::{BuildError, ConfigError, Error, Stage, TransportError};
