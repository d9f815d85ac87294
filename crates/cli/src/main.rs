mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::OutputFormat;

/// bzlimage - build Bazel image targets and load them into Docker
#[derive(Parser)]
#[command(name = "bzlimage")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a target with Bazel and load the resulting image archive
  Build {
    /// Bazel label of the image archive, e.g. //app:image.tar
    target: String,

    /// Bazel workspace root (default: current directory)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Bazel program to run [env: BZLIMAGE_BAZEL]
    #[arg(long)]
    bazel: Option<PathBuf>,

    /// Bazel startup option, placed before `build` (repeatable)
    #[arg(long = "startup-arg", value_name = "ARG", allow_hyphen_values = true)]
    startup_args: Vec<String>,

    /// Docker daemon address, unix://, tcp:// or http(s):// [env: DOCKER_HOST]
    #[arg(long)]
    docker_host: Option<String>,

    /// Docker Engine API version [env: DOCKER_API_VERSION]
    #[arg(long)]
    api_version: Option<String>,

    /// Output format for the result
    #[arg(short, long, value_enum, default_value_t)]
    format: OutputFormat,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Build {
      target,
      workspace,
      bazel,
      startup_args,
      docker_host,
      api_version,
      format,
    } => cmd::cmd_build(cmd::BuildArgs {
      target,
      workspace,
      bazel,
      startup_args,
      docker_host,
      api_version,
      format,
    }),
  }
}
