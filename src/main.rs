use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use netdrive_connector::index::WorkplaceSearchClient;
use netdrive_connector::share::MountedShareClient;
use netdrive_connector::{Config, Connector};

#[derive(Parser, Debug)]
#[command(name = "netdrive-connector")]
#[command(about = "Sync a network drive into Enterprise Search Workplace Search")]
struct Args {
    /// Config file (defaults to $NETDRIVE_CONFIG, then ./config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index every file changed inside the configured time window
    FullSync,
    /// Index files changed since the last checkpoint
    IncrementalSync,
    /// Remove files deleted from the drive since the last sync
    DeletionSync,
    /// Replace index permissions with the user mapping table
    PermissionSync,
    /// Create a content source
    Bootstrap {
        /// Content source name
        #[arg(short, long)]
        name: String,
    },
    /// Check access to the network drive and Enterprise Search
    TestConnectivity,
}

/// Log to stderr at `level` unless `RUST_LOG` overrides it
fn init_logger(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", level)).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            init_logger("info");
            log::error!("Failed to load configuration: {:#}", e);
            return Err(e);
        }
    };

    init_logger(&config.log_level);
    log::info!("Configuration loaded for {}", config.source_name());

    let share = Arc::new(MountedShareClient::new(&config.network_drive.mount_root));
    let index = Arc::new(WorkplaceSearchClient::new(
        &config.enterprise_search.host_url,
        config.api_key()?,
        config.retry_count,
    )?);
    let connector = Connector::new(config, share, index);

    match args.command {
        Command::FullSync => {
            let summary = connector.full_sync().await?;
            log::info!(
                "Full sync done: {} indexed, {} failed",
                summary.indexed,
                summary.failed
            );
        }
        Command::IncrementalSync => {
            let summary = connector.incremental_sync().await?;
            log::info!(
                "Incremental sync done: {} indexed, {} failed",
                summary.indexed,
                summary.failed
            );
        }
        Command::DeletionSync => {
            let deleted = connector.deletion_sync().await?;
            log::info!("Deletion sync done: {} documents removed", deleted);
        }
        Command::PermissionSync => {
            connector.permission_sync().await?;
        }
        Command::Bootstrap { name } => {
            let source = connector.bootstrap(&name).await?;
            println!("{}", source.id);
        }
        Command::TestConnectivity => {
            connector.test_connectivity().await?;
            println!("Connectivity OK");
        }
    }

    Ok(())
}
