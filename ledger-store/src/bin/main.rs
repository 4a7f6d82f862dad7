use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ledger_store::{LedgerConfig, LedgerService, SessionAuth};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Ledger Store CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Set the log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Commands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the ledger store
    Start {
        /// Cache directory for the local snapshot files
        #[arg(short, long)]
        cache_dir: Option<PathBuf>,

        /// Run without remote replication
        #[arg(short, long)]
        offline: bool,

        /// Owner identity to sign in with (random when omitted)
        #[arg(long)]
        owner: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("ledger_store={}", cli.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Process commands
    match cli.command {
        Commands::Start { cache_dir, offline, owner } => {
            let mut config = LedgerConfig::from_env();
            if cache_dir.is_some() {
                config.cache_dir = cache_dir;
            }
            config.offline = config.offline || offline;

            info!(
                "Starting ledger store (offline: {}, cache dir: {:?})",
                config.offline, config.cache_dir
            );

            let auth = Arc::new(SessionAuth::new());
            let service = LedgerService::with_config(&config, auth.clone())?;
            LedgerService::start(&service);

            let owner = owner.unwrap_or_else(Uuid::new_v4);
            auth.sign_in(owner);

            // Wait for ctrl-c
            info!("Ledger store started for owner {}. Press Ctrl+C to stop.", owner);
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutting down ledger store...");
                }
                Err(err) => {
                    error!("Error waiting for Ctrl+C: {}", err);
                }
            }
        }
    }

    Ok(())
}
