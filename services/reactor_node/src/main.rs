//! Reactor node entry point

use anyhow::{Context, Result};
use clap::Parser;
use config::RuntimeConfig;
use reactor_node::logging::init_logging;
use reactor_node::Node;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML); NUCLEUS_* variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override node.listen
    #[arg(long)]
    listen: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs)?;

    let mut config = RuntimeConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.node.listen = listen;
    }
    info!(
        node_id = %config.node.id,
        listen = %config.node.listen,
        version = env!("CARGO_PKG_VERSION"),
        "Starting reactor node"
    );

    let listener = TcpListener::bind(&config.node.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.node.listen))?;
    let node = Node::new(config)?;
    node.announce().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Keep the sender alive: dropping it reads as shutdown
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    node.serve(listener, shutdown_rx).await
}
