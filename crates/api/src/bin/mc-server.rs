//! Mission Control hub binary entry point.
//!
//! Loads configuration, wires the storage backends to the broadcaster, and
//! starts the axum server.

use anyhow::Result;
use clap::Parser;
use mc_api::{router, AppState, InMemoryMessageStore, OpenMembershipProvider};
use mc_common::SystemConfig;
use mc_core::Broadcaster;
use mc_storage::{PostgresEventLog, RedisConnectionRegistry, RedisFabric, RedisRingBuffer};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mc-server")]
#[command(version = "0.1.0")]
#[command(about = "Mission Control real-time coordination hub")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.dev.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = cli.log_level.as_deref().unwrap_or("info");
    mc_common::init_tracing("mc_server", log_level);

    let config = SystemConfig::load(&cli.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    info!("Configuration loaded from {}", cli.config);

    let event_log = Arc::new(PostgresEventLog::new(&config.storage.postgres_url).await?);
    event_log.run_migrations().await?;

    let ring_buffer = Arc::new(RedisRingBuffer::new(&config.storage.redis_url, config.limits.ring_buffer_size).await?);
    let fabric = Arc::new(RedisFabric::new(&config.storage.redis_url).await?);
    let registry = Arc::new(RedisConnectionRegistry::new(&config.storage.redis_url).await?);

    let broadcaster = Arc::new(Broadcaster::new(event_log.clone(), ring_buffer.clone(), fabric.clone()));

    let state = AppState {
        broadcaster,
        event_log,
        ring_buffer,
        fabric,
        registry,
        message_store: Arc::new(InMemoryMessageStore::new()),
        membership: Arc::new(OpenMembershipProvider::new()),
        config: Arc::new(config.clone()),
    };

    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Mission Control hub listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
