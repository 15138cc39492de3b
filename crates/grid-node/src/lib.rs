//! Grid Node - a runnable grid daemon
//!
//! Hosts one kernel and exposes it to local operators.
//!
//! # Architecture
//!
//! - **Config**: environment variables plus a JSON bootstrap of backends and mounts
//! - **Store**: RocksDB-backed persistent backend
//! - **Node**: backend registry and kernel wiring
//! - **Admin Socket**: Unix socket for local admin commands (grid-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use grid_node::{GridNode, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::default();
//!     let node = GridNode::new(config)?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod config;
pub mod error;
pub mod node;
pub mod store;

pub use config::{BackendSpec, BackendSpecKind, Bootstrap, MountSpec, NodeConfig};
pub use error::{Error, Result};
pub use node::{GridNode, NodeBackend, NodeState};
pub use store::StoreBackend;
