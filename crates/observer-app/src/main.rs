//! Observer binary: wires sources, engine, and storage together.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "observer", about = "Real-time news correlation engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full ingestion pipeline until interrupted.
    Run,
    /// Embed stored items that lack embeddings, in resumable batches.
    Backfill {
        /// Override the configured batch size.
        #[arg(long)]
        batch: Option<usize>,
    },
    /// Print engine statistics for the stored corpus as JSON.
    Stats,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let result = match cli.command {
        Command::Run => commands::run(config).await,
        Command::Backfill { batch } => commands::backfill(config, batch).await,
        Command::Stats => commands::stats(config).await,
    };

    result.map_err(|err| {
        tracing::error!(%err, "command failed");
        std::io::Error::other(err)
    })
}
