use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use outpost_server::{InMemoryAuthenticator, MapDescriptor, Server, ServerConfig};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8888")]
    addr: SocketAddr,

    /// Path to a map descriptor JSON file. Without it the server starts the
    /// built-in default world.
    #[arg(long)]
    map: Option<PathBuf>,

    /// Maximum number of simultaneous connections.
    #[arg(long, default_value_t = 1024)]
    max_connections: usize,

    /// Number of packet dispatcher workers.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Register unknown credentials on first login instead of rejecting
    /// them. Useful with the in-memory authenticator.
    #[arg(long)]
    allow_auto_register: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    let mut config = ServerConfig::default();
    config.network.address = args.addr;
    config.network.max_connections = args.max_connections;
    config.network.worker_count = args.workers;
    config.game.allow_auto_register = args.allow_auto_register;
    config.descriptor = args.map.map(MapDescriptor::from_file).transpose()?;

    let authenticator = Arc::new(InMemoryAuthenticator::new());

    let server = Server::start(config, authenticator).await?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received");

    server.shutdown().await;

    Ok(())
}
