//! Grid Router - weighted miss resolution
//!
//! When lookup reaches a mount stub, something has to fetch the region. The
//! router picks which backend to ask:
//!
//! - [`Backend`]: one fetch interface for memory, disk and network peers
//! - [`WeightTable`]: externally written weights, read as versioned snapshots
//! - [`Scorer`]: pluggable ranking function over a snapshot
//! - [`ReputationSink`]: receives one outcome per fetch attempt
//! - [`Router`]: ranks, fetches under a timeout, falls through on failure
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use grid_router::{Backend, Fetched, MemoryBackend, Router, RouterConfig, WeightTable};
//! use grid_trie::Key;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryBackend::new("store"));
//! store.insert("cd", "Y");
//!
//! let router = Router::new(RouterConfig::default(), Arc::new(WeightTable::new()));
//! let candidates: Vec<Arc<dyn Backend>> = vec![store];
//! let resolved = router.resolve_miss(&Key::from("c"), &candidates).await.unwrap();
//! assert!(matches!(resolved.fetched, Fetched::Subtree(_)));
//! # });
//! ```

mod backend;
mod config;
mod error;
mod reputation;
mod router;
mod score;
mod weight;

pub use backend::{Backend, BackendId, BackendKind, Fetched, MemoryBackend};
pub use config::RouterConfig;
pub use error::{MissError, TransportError};
pub use reputation::{NullSink, Outcome, OutcomeLog, Report, ReputationSink};
pub use router::{Ranked, Resolved, Router};
pub use score::{Scorer, WeightScorer};
pub use weight::{BackendStats, Weight, WeightSnapshot, WeightTable};
