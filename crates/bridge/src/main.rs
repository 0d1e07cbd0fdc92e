//! Comms Bridge process entry point.

use clap::Parser;
use mc_bridge::{BridgeConfig, CommsBridge};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mc-bridge")]
#[command(version = "0.1.0")]
#[command(about = "Relays agent runtime conversations through a Mission Control organization")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "comms-bridge.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match BridgeConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            std::process::exit(1);
        }
    };

    mc_common::init_tracing("mc_bridge", &config.logging.level);
    info!(config_path = cli.config, agents = config.agents.len(), "bridge configuration loaded");

    let bridge = CommsBridge::new(config).await?;
    if let Err(err) = bridge.run_forever().await {
        error!(error = %err, "bridge exited with error");
        return Err(err);
    }
    Ok(())
}
