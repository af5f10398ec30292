use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod db;
mod models;
mod remote;
mod sync;

use commands::{ConfigCommand, EntryCommand, SyncCommand};
use config::Config;
use db::{init_db, EntryRepository};
use remote::RemoteClient;
use sync::DiaryService;

#[derive(Parser)]
#[command(name = "diaryme")]
#[command(version)]
#[command(about = "Local-first personal diary with background sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage diary entries
    Entry(EntryCommand),

    /// Synchronize with the remote backend
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("diaryme=warn")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Entry(cmd)) => {
            let mut service = build_service(&config).await?;
            if config.auto_sync && config.remote.is_configured() {
                // Best-effort: entries stay usable offline
                if service.refresh_connectivity().await {
                    service.initialize().await?;
                }
            }
            cmd.run(&mut service).await?;
        }
        Some(Commands::Sync(cmd)) => {
            let mut service = build_service(&config).await?;
            cmd.run(&mut service, &config).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

async fn build_service(
    config: &Config,
) -> Result<DiaryService<RemoteClient>, Box<dyn std::error::Error>> {
    let pool = init_db(config.database_path.clone()).await?;
    let store = EntryRepository::new(pool);
    let remote = RemoteClient::new(
        config.remote.base_url.clone().unwrap_or_default(),
        config.remote.api_key.clone().unwrap_or_default(),
        config.remote.bucket.clone(),
    );

    Ok(DiaryService::new(store, remote, config.owner_id)
        .with_online(config.remote.is_configured()))
}
