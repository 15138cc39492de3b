//! Grid Node - the daemon's wiring.
//!
//! Architecture:
//! - One kernel (resolver + ports) shared by every component
//! - Named backends: in-memory or RocksDB stores under the data directory
//! - Mounts bootstrapped from a JSON file, then managed over the admin socket

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use grid_kernel::{Kernel, Reply};
use grid_router::{Backend, BackendId, MemoryBackend, WeightTable};
use grid_trie::Key;
use tracing::{debug, info};

use crate::admin_socket::AdminSocket;
use crate::config::{BackendSpec, BackendSpecKind, Bootstrap, NodeConfig};
use crate::error::{Error, Result};
use crate::store::StoreBackend;

/// A backend owned by the node.
#[derive(Debug, Clone)]
pub enum NodeBackend {
    /// Process memory.
    Memory(Arc<MemoryBackend>),
    /// RocksDB store.
    Store(Arc<StoreBackend>),
}

impl NodeBackend {
    /// As a fetch source.
    pub fn as_backend(&self) -> Arc<dyn Backend> {
        match self {
            Self::Memory(b) => Arc::clone(b) as Arc<dyn Backend>,
            Self::Store(b) => Arc::clone(b) as Arc<dyn Backend>,
        }
    }

    /// Write a value at an absolute key.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        match self {
            Self::Memory(b) => {
                b.insert(key, value);
                Ok(())
            }
            Self::Store(b) => b.put(key, value),
        }
    }
}

/// Shared state for the node - one kernel, one backend registry.
pub struct NodeState {
    kernel: Kernel,
    backends: RwLock<BTreeMap<BackendId, NodeBackend>>,
}

impl std::fmt::Debug for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeState")
            .field("kernel", &self.kernel)
            .field("backends", &self.backend_ids())
            .finish()
    }
}

impl NodeState {
    /// Create state around a kernel with no backends.
    pub fn new(kernel: Kernel) -> Self {
        Self {
            kernel,
            backends: RwLock::new(BTreeMap::new()),
        }
    }

    /// The kernel.
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Add a named backend.
    pub fn add_backend(&self, backend: NodeBackend) -> Result<()> {
        let id = backend.as_backend().id().clone();
        let mut backends = self.backends.write().unwrap_or_else(PoisonError::into_inner);
        if backends.contains_key(&id) {
            return Err(Error::Config(format!("duplicate backend id {:?}", id.as_str())));
        }
        backends.insert(id, backend);
        Ok(())
    }

    /// Look up a named backend.
    pub fn backend(&self, id: &str) -> Result<NodeBackend> {
        self.backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&BackendId::from(id))
            .cloned()
            .ok_or_else(|| Error::UnknownBackend(id.to_string()))
    }

    /// Ids of every named backend.
    pub fn backend_ids(&self) -> Vec<String> {
        self.backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .map(|id| id.to_string())
            .collect()
    }

    /// Mount named backends at `prefix`.
    pub fn mount(&self, prefix: &str, ids: &[String]) -> Result<()> {
        let backends = ids
            .iter()
            .map(|id| self.backend(id).map(|b| b.as_backend()))
            .collect::<Result<Vec<_>>>()?;
        self.kernel.register_mount(prefix, backends)?;
        Ok(())
    }

    /// Remove the mount at `prefix`.
    pub fn unmount(&self, prefix: &str) -> Result<()> {
        self.kernel.unregister_mount(prefix)?;
        Ok(())
    }

    /// Write through a named backend.
    ///
    /// If the key lies in a region that backend serves, the cached region is
    /// dropped so the next lookup sees the new value. Anything else in the
    /// trie is left alone.
    pub fn put(&self, backend: &str, key: &str, value: &str) -> Result<()> {
        self.backend(backend)?.put(key.as_bytes(), value.as_bytes())?;

        let mounts = self.kernel.resolver().mounts();
        let served = mounts
            .governing(key.as_bytes())
            .is_some_and(|(_, backends)| backends.iter().any(|b| b.id().as_str() == backend));
        if served {
            self.kernel.evict(key)?;
        }
        debug!("Wrote {:?} through backend {} (invalidated: {})", key, backend, served);
        Ok(())
    }

    /// Send `key` through a fresh port and wait for the reply.
    pub async fn request(&self, key: &str) -> Result<Reply> {
        let (port, mut rx) = self.kernel.mint_port();
        self.kernel.send(Key::from(key), port)?;
        rx.recv()
            .await
            .ok_or_else(|| grid_kernel::Error::from(grid_port::Error::Closed(port)).into())
    }

    /// Apply a bootstrap document.
    pub fn bootstrap(&self, bootstrap: &Bootstrap, data_dir: &Path) -> Result<()> {
        let weights = self.kernel.weights();
        for spec in &bootstrap.backends {
            self.add_backend(build_backend(spec, data_dir)?)?;
            weights.set_weight(spec.id.as_str(), spec.weight);
            if let Some(rtt) = spec.rtt_ms {
                weights.set_rtt(spec.id.as_str(), Duration::from_millis(rtt));
            }
        }
        for (key, value) in &bootstrap.local {
            self.kernel.insert_local(key, value.as_str())?;
        }
        for mount in &bootstrap.mounts {
            self.mount(&mount.prefix, &mount.backends)?;
        }
        info!(
            "Bootstrapped {} backends, {} mounts, {} local entries",
            bootstrap.backends.len(),
            bootstrap.mounts.len(),
            bootstrap.local.len()
        );
        Ok(())
    }
}

fn build_backend(spec: &BackendSpec, data_dir: &Path) -> Result<NodeBackend> {
    let backend = match spec.kind {
        BackendSpecKind::Memory => {
            NodeBackend::Memory(Arc::new(MemoryBackend::new(spec.id.as_str())))
        }
        BackendSpecKind::Store => {
            let path = data_dir.join("stores").join(&spec.id);
            std::fs::create_dir_all(&path)?;
            NodeBackend::Store(Arc::new(StoreBackend::open(spec.id.as_str(), &path)?))
        }
    };
    for (key, value) in &spec.entries {
        backend.put(key.as_bytes(), value.as_bytes())?;
    }
    Ok(backend)
}

/// A grid node instance.
pub struct GridNode {
    state: Arc<NodeState>,
    config: NodeConfig,
}

impl GridNode {
    /// Create a node and apply the bootstrap file, if configured.
    pub fn new(config: NodeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let kernel = Kernel::new(config.kernel, Arc::new(WeightTable::new()));
        let state = Arc::new(NodeState::new(kernel));

        if let Some(path) = &config.mounts_file {
            let bootstrap = Bootstrap::load(path)?;
            state.bootstrap(&bootstrap, &config.data_dir)?;
        }

        Ok(Self { state, config })
    }

    /// Shared state (for the admin socket and tests).
    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Run the node (port reaper and admin socket) until ctrl-c.
    pub async fn run(self) -> Result<()> {
        info!("Grid node starting");
        info!("  Admin: {:?}", self.config.admin_socket);
        info!("  Data: {:?}", self.config.data_dir);
        info!("  Mounts: {}", self.state.kernel.resolver().mounts().len());

        let reaper = self.state.kernel.spawn_port_reaper(self.config.reap_interval);

        let admin_socket = AdminSocket::new(self.state(), &self.config.admin_socket);
        let admin = tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
        admin.abort();
        reaper.abort();
        let _ = std::fs::remove_file(&self.config.admin_socket);
        Ok(())
    }
}
