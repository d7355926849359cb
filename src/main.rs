//! posterd - isometric miniature poster generation daemon

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use posterd::{Config, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Isometric miniature poster generation daemon
#[derive(Parser, Debug)]
#[command(name = "posterd", version, about = "Poster generation daemon")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "posterd=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }

    // Create and run server
    let server = Server::new(config);
    server.run().await?;

    Ok(())
}
