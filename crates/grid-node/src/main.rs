//! Grid Node binary
//!
//! Runs a grid kernel with the configured mounts and an admin socket.

use grid_node::{GridNode, NodeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grid_node=info,grid=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Grid Node");

    let config = NodeConfig::from_env();

    let node = GridNode::new(config)?;
    node.run().await?;

    Ok(())
}
