mod cmd;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use externa_lib::config::Config;

use crate::cmd::*;
use crate::output::{OutputFormat, print_error};

/// externa - versioned external tools and shared prebuilt artifacts
#[derive(Parser)]
#[command(name = "externa")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging (overridden by RUST_LOG)
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// List archive names, or the versions of one archive
  Versions {
    /// Archive name
    name: Option<String>,
  },

  /// Unpack an archive version if it is not unpacked yet
  Unpack { name: String, version: String },

  /// Add an archive to the store from a URL or a local file
  Fetch {
    name: String,
    version: String,
    /// http(s) URL or path of the archive
    source: String,
  },

  /// Compare archives with the peer stores; fails on any difference
  Audit,

  /// List prebuilt artifacts of a name on every host
  Prebuilds { name: String },

  /// Show the versions recorded for the current directory
  Ledger,

  /// Show the resolved configuration
  Info,
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(e) = run(cli) {
    print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<()> {
  let output = cli.output;

  if let Commands::Ledger = cli.command {
    return cmd_ledger(output);
  }

  let config = Config::from_env()?;
  debug!(?config, "configuration resolved");
  match cli.command {
    Commands::Versions { name } => cmd_versions(&config, name.as_deref(), output),
    Commands::Unpack { name, version } => cmd_unpack(&config, &name, &version, output),
    Commands::Fetch { name, version, source } => cmd_fetch(&config, &name, &version, &source, output),
    Commands::Audit => cmd_audit(&config, output),
    Commands::Prebuilds { name } => cmd_prebuilds(&config, &name, output),
    Commands::Info => cmd_info(&config, output),
    Commands::Ledger => cmd_ledger(output),
  }
}
