//! Agent gateway binary entry point.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agent_gateway::{Config, Server};

#[derive(Parser, Debug)]
#[command(
    name = "agent-gateway",
    about = "HTTP-to-message-bus gateway driven by agent manifests",
    version
)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("agent_gateway=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    tracing::info!("loaded config: {} v{}", config.name, config.version);

    let server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
