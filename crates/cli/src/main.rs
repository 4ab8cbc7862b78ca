//! Mirra CLI - mirra command

use anyhow::Result;
use clap::{Parser, Subcommand};
use mirra_engine::resync::DEFAULT_RESYNC_INTERVAL_SECS;
use std::path::PathBuf;

mod cmd;
mod util;

/// Mirra - near-real-time one-way directory mirroring
#[derive(Parser)]
#[command(name = "mirra")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a mirror configuration file
    Init {
        /// Directory tree to mirror
        source: PathBuf,

        /// Directory tree to mirror into
        destination: PathBuf,

        /// Where to write the configuration (default: the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Gitignore-style pattern for entries to leave out (repeatable)
        #[arg(long = "exclude", value_name = "PATTERN")]
        exclude: Vec<String>,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
    /// Mirror the configured source until 'q' or Ctrl-C
    Run {
        /// Configuration file to load (default: the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seconds between reconciliation passes (0 disables them)
        #[arg(long, default_value_t = DEFAULT_RESYNC_INTERVAL_SECS)]
        resync_interval: u64,

        /// Skip the reconciliation pass normally run at startup
        #[arg(long)]
        skip_initial_sync: bool,
    },
    /// Show the configuration file path and contents
    Config {
        /// Configuration file to inspect (default: the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            source,
            destination,
            config,
            exclude,
            force,
        } => cmd::init::run(source, destination, config, exclude, force).await,
        Commands::Run {
            config,
            resync_interval,
            skip_initial_sync,
        } => cmd::run::run(config, resync_interval, skip_initial_sync).await,
        Commands::Config { config } => cmd::config::run(config).await,
    }
}
