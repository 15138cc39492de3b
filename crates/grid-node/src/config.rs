//! Node configuration: environment variables plus a JSON mount bootstrap.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use grid_kernel::KernelConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Configuration for a grid node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for persistent stores
    pub data_dir: PathBuf,

    /// Admin socket path (for grid-admin CLI)
    pub admin_socket: PathBuf,

    /// Mount bootstrap file, if any
    pub mounts_file: Option<PathBuf>,

    /// Resolver and request limits
    pub kernel: KernelConfig,

    /// How often expired ports are reaped
    pub reap_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable source.
    ///
    /// Unparseable numbers fall back to their defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = PathBuf::from(lookup("GRID_DATA_DIR").unwrap_or_else(|| "./grid-data".to_string()));

        let admin_socket = lookup("GRID_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        let mounts_file = lookup("GRID_MOUNTS").map(PathBuf::from);

        let defaults = KernelConfig::default();
        let fetch_timeout_ms = parse_or(
            &lookup,
            "GRID_FETCH_TIMEOUT_MS",
            defaults.router.fetch_timeout.as_millis() as u64,
        );
        let retry_budget = parse_or(&lookup, "GRID_RETRY_BUDGET", defaults.router.retry_budget);
        let request_timeout_ms = parse_or(
            &lookup,
            "GRID_REQUEST_TIMEOUT_MS",
            defaults.request_timeout.as_millis() as u64,
        );

        let router = defaults
            .router
            .with_fetch_timeout(Duration::from_millis(fetch_timeout_ms))
            .with_retry_budget(retry_budget);
        let kernel = defaults
            .with_router(router)
            .with_request_timeout(Duration::from_millis(request_timeout_ms));

        Self {
            data_dir,
            admin_socket,
            mounts_file,
            kernel,
            reap_interval: Duration::from_secs(1),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {} value {:?} ({}), using default", name, raw, e);
            default
        }),
        None => default,
    }
}

/// Which kind of backend a bootstrap entry creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendSpecKind {
    /// In-memory backend, seeded from `entries`.
    Memory,
    /// RocksDB store under `<data_dir>/stores/<id>`.
    Store,
}

/// One backend in the bootstrap file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSpec {
    /// Backend id, unique per node.
    pub id: String,
    /// Backend kind.
    pub kind: BackendSpecKind,
    /// Initial weight.
    #[serde(default)]
    pub weight: i64,
    /// Initial RTT estimate in milliseconds.
    #[serde(default)]
    pub rtt_ms: Option<u64>,
    /// Seed entries (absolute key -> value).
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

/// One mount in the bootstrap file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Mount prefix.
    pub prefix: String,
    /// Ids of backends serving it. Each id must be declared in `backends`.
    pub backends: Vec<String>,
}

/// Bootstrap file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bootstrap {
    /// Backends to create.
    #[serde(default)]
    pub backends: Vec<BackendSpec>,
    /// Mounts to register, in order.
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
    /// Local (unmounted) entries.
    #[serde(default)]
    pub local: BTreeMap<String, String>,
}

impl Bootstrap {
    /// Parse a bootstrap document.
    pub fn from_json(json: &str) -> Result<Self> {
        let bootstrap: Self = serde_json::from_str(json)?;
        bootstrap.validate()?;
        Ok(bootstrap)
    }

    /// Read and parse a bootstrap file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Check that ids are unique and every mount names known backends.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.id.as_str()) {
                return Err(Error::Config(format!("duplicate backend id {:?}", backend.id)));
            }
        }
        for mount in &self.mounts {
            if mount.backends.is_empty() {
                return Err(Error::Config(format!("mount {:?} lists no backends", mount.prefix)));
            }
            if let Some(missing) = mount.backends.iter().find(|id| !seen.contains(id.as_str())) {
                return Err(Error::Config(format!(
                    "mount {:?} names undeclared backend {:?}",
                    mount.prefix, missing
                )));
            }
        }
        Ok(())
    }
}
