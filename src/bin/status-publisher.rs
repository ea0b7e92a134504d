//! Status Publisher CLI Tool
//!
//! Command-line stand-in for the data-sync producer. Publishes player
//! status messages on the status channel and can watch the channel.
//!
//! Usage:
//!   cargo run --bin status-publisher -- --help
//!   cargo run --bin status-publisher publish --player 1b4e28ba-2fa1-11d2-883f-0016d3cca427
//!   cargo run --bin status-publisher publish --player <uuid> --status syncing
//!   cargo run --bin status-publisher raw "<uuid> safe"
//!   cargo run --bin status-publisher listen --duration 30
//!   cargo run --bin status-publisher check-config --dir config/lobby-transit

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use lobby_transit::config::{ConfigStore, RedisSettings};
use lobby_transit::metrics::MetricsCollector;
use lobby_transit::service::init_logging;
use lobby_transit::status::{
    ChannelState, PlayerStatus, StatusEvent, StatusHandler, StatusListener, StatusPublisher,
    SAFE_TOKEN, STATUS_TOPIC,
};
use lobby_transit::TransitError;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "status-publisher", version)]
#[command(about = "Publish and watch player status messages on the lobby-transit status channel")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Redis host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Redis port
    #[arg(long, default_value = "6379")]
    port: u16,

    /// Redis password (empty for none)
    #[arg(long, default_value = "")]
    password: String,

    /// Redis database index
    #[arg(long, default_value = "0")]
    database: i64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a status for one player
    Publish {
        /// Player UUID
        #[arg(short, long)]
        player: Uuid,
        /// Status token
        #[arg(short, long, default_value = SAFE_TOKEN)]
        status: String,
    },
    /// Validate and publish a raw `<uuid> <status>` payload
    Raw {
        payload: String,
    },
    /// Print status messages as they arrive
    Listen {
        /// Duration to listen in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },
    /// Load and validate a configuration directory, then print it
    CheckConfig {
        #[arg(short, long, default_value = lobby_transit::config::DEFAULT_CONFIG_DIR)]
        dir: PathBuf,
    },
}

struct PrintingHandler;

#[async_trait]
impl StatusHandler for PrintingHandler {
    async fn handle_status(&self, event: StatusEvent) -> lobby_transit::Result<()> {
        println!("{} -> {}", event.player_id, event.status);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let settings = RedisSettings {
        host: cli.host.clone(),
        port: cli.port,
        password: cli.password.clone(),
        database: cli.database,
        ..RedisSettings::default()
    };

    match cli.command {
        Commands::Publish { player, status } => {
            let publisher = StatusPublisher::new(&settings)?;
            let receivers = publisher
                .publish_status(player, PlayerStatus::from_token(&status))
                .await?;
            println!("Published '{} {}' to {} subscribers", player, status, receivers);
        }
        Commands::Raw { payload } => {
            let event = StatusEvent::parse(&payload).map_err(TransitError::from)?;
            let publisher = StatusPublisher::new(&settings)?;
            let receivers = publisher.publish_event(&event).await?;
            println!("Published '{}' to {} subscribers", event.encode(), receivers);
        }
        Commands::Listen { duration } => {
            let state = ChannelState::new();
            let listener = StatusListener::new(
                &settings,
                Arc::new(PrintingHandler),
                state.clone(),
                Arc::new(MetricsCollector::new()?),
            )?;
            let token = listener.cancellation_token();
            let task = listener.spawn();

            println!("Listening on {} for {}s...", STATUS_TOPIC, duration);
            tokio::time::sleep(Duration::from_secs(duration)).await;
            if !state.is_connected() {
                println!("Warning: never connected to {}:{}", settings.host, settings.port);
            }

            token.cancel();
            task.await?;
        }
        Commands::CheckConfig { dir } => {
            let store = ConfigStore::new(dir);
            let config = store.load_or_init()?;
            println!("Configuration at {} is valid", store.path().display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
