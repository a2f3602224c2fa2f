//! ghad-daemon - GitHub Actions runner dispatcher.
//!
//! Two entry points share this binary:
//!
//! - `serve` runs the dispatch plane: the webhook ingress and the on-demand
//!   JIT endpoint, configured entirely from the environment.
//! - `discover` runs exactly one discovery cycle and exits; the scheduler
//!   owns periodicity and retries.

mod discover;
mod serve;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// GitHub Actions runner dispatcher.
#[derive(Parser, Debug)]
#[command(name = "ghad-daemon")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the webhook and JIT config endpoints
    Serve,

    /// Run one registry reconcile cycle and exit
    Discover {
        /// Abort the cycle if it runs longer than this many seconds
        #[arg(long)]
        deadline_seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve => serve::run().await,
        Commands::Discover { deadline_seconds } => discover::run(deadline_seconds).await,
    }
}
