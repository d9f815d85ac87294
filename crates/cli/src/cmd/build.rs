//! Implementation of the `bzlimage build` command.
//!
//! Resolves configuration from the environment and flags, runs the build
//! pipeline with Bazel and daemon output on stderr, and prints the image
//! reference alone on stdout (or a JSON result with `--format json`).

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use bzlimage_lib::{BazelArtifact, Config, ImageBuilder, cancellation};

use crate::output::{OutputFormat, format_duration, print_error, print_json, print_stat, print_success};

pub struct BuildArgs {
  pub target: String,
  pub workspace: PathBuf,
  pub bazel: Option<PathBuf>,
  pub startup_args: Vec<String>,
  pub docker_host: Option<String>,
  pub api_version: Option<String>,
  pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct BuildOutput {
  image: String,
  target: String,
  duration_ms: u64,
}

/// Flags override the environment.
fn resolve_config(args: &BuildArgs) -> Config {
  let mut config = Config::from_env();
  if let Some(bazel) = &args.bazel {
    config.bazel.program = bazel.clone();
  }
  if !args.startup_args.is_empty() {
    config.bazel.startup_args = args.startup_args.clone();
  }
  if let Some(host) = &args.docker_host {
    config.docker.host = Some(host.clone());
  }
  if let Some(version) = &args.api_version {
    config.docker.api_version = Some(version.clone());
  }
  config
}

/// Execute the build command.
///
/// Ctrl-C cancels the build in flight: a running Bazel is killed and an
/// in-progress upload is aborted.
pub fn cmd_build(args: BuildArgs) -> Result<()> {
  let config = resolve_config(&args);
  debug!(?config, "build configuration");

  let builder = ImageBuilder::from_config(&config).context("Invalid docker configuration")?;
  let workspace = std::path::absolute(&args.workspace)
    .with_context(|| format!("Failed to resolve workspace {}", args.workspace.display()))?;
  let artifact = BazelArtifact::new(args.target.clone(), workspace);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  let result = rt.block_on(async {
    let (handle, cancel) = cancellation();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        info!("received Ctrl-C, cancelling build");
        handle.cancel();
      }
    });

    let mut sink = tokio::io::stderr();
    builder.build(&cancel, &mut sink, &artifact).await
  });
  let elapsed = started.elapsed();

  let image = match result {
    Ok(image) => image,
    Err(e) => {
      print_error(&format!("Build of {} failed: {}", args.target, e));
      std::process::exit(1);
    }
  };

  if args.format.is_json() {
    print_json(&BuildOutput {
      image,
      target: args.target,
      duration_ms: elapsed.as_millis() as u64,
    })?;
  } else {
    print_success(&format!("Loaded {}", image));
    print_stat("Target", &args.target);
    print_stat("Duration", &format_duration(elapsed));
    println!("{}", image);
  }

  Ok(())
}
