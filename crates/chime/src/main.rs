//! Chime: reminder scheduling and delivery daemon.
//!
//! Subcommands:
//! - `daemon`: background polling loop until ctrl-c
//! - `tick`: run a single poll and print its stats

use clap::{Args, Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod daemon;
mod data;

#[derive(Parser)]
#[command(name = "chime")]
#[command(about = "Reminder scheduling and delivery daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Arguments shared by `daemon` and `tick`.
#[derive(Args)]
struct EngineArgs {
    /// Path to the JSON item data file
    #[arg(long, env = "CHIME_DATA_PATH")]
    data: std::path::PathBuf,

    /// Path to the JSON delivery ledger file
    #[arg(long, env = "CHIME_LEDGER_PATH", default_value = "chime-ledger.json")]
    ledger: std::path::PathBuf,

    /// Scan lookahead past "now" in seconds
    #[arg(long, default_value = "30")]
    lookahead: u64,

    /// Scan catch-up before "now" in seconds.
    /// Accepted for compatibility; catch-up delivery is currently disabled.
    #[arg(long, default_value = "0")]
    catchup: u64,

    /// Maximum candidates per poll
    #[arg(long, default_value = "200")]
    batch_limit: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the polling loop until interrupted
    Daemon {
        #[command(flatten)]
        engine: EngineArgs,

        /// Poll interval in seconds
        #[arg(long, default_value = "15")]
        poll_interval: u64,
    },

    /// Run a single poll and print its stats
    Tick {
        #[command(flatten)]
        engine: EngineArgs,
    },
}

impl EngineArgs {
    fn into_config(self, poll_interval: u64) -> daemon::DaemonConfig {
        daemon::DaemonConfig {
            data_path: self.data,
            ledger_path: self.ledger,
            poll_interval,
            lookahead: self.lookahead,
            catchup: self.catchup,
            batch_limit: self.batch_limit,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chime=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            engine,
            poll_interval,
        } => daemon::run(engine.into_config(poll_interval)).await,

        Commands::Tick { engine } => daemon::tick(engine.into_config(0)).await,
    }
}
