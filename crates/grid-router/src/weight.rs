//! Backend weights as versioned copy-on-write snapshots.
//!
//! An external collaborator (reputation, exchange rates, an operator) writes
//! weights; the router only reads. Readers load the current snapshot without
//! blocking, writers serialize among themselves and publish a new snapshot
//! with the next version number.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::BackendId;

/// A totally ordered backend score. Higher ranks first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Weight(pub i64);

impl Weight {
    /// Weight of backends the table knows nothing about.
    pub const ZERO: Self = Self(0);
}

impl From<i64> for Weight {
    fn from(w: i64) -> Self {
        Self(w)
    }
}

impl From<i32> for Weight {
    fn from(w: i32) -> Self {
        Self(i64::from(w))
    }
}

impl std::fmt::Display for Weight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-backend entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Current weight.
    pub weight: Weight,
    /// Round-trip-time estimate, if one has been measured.
    pub rtt: Option<Duration>,
}

/// Immutable view of every backend's weight at one version.
#[derive(Debug, Clone, Default)]
pub struct WeightSnapshot {
    version: u64,
    entries: HashMap<BackendId, BackendStats>,
}

impl WeightSnapshot {
    /// Snapshot version. Bumped by every write.
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Weight of `backend`, or [`Weight::ZERO`] if unknown.
    pub fn weight(&self, backend: &BackendId) -> Weight {
        self.entries.get(backend).map(|s| s.weight).unwrap_or(Weight::ZERO)
    }

    /// RTT estimate of `backend`.
    pub fn rtt(&self, backend: &BackendId) -> Option<Duration> {
        self.entries.get(backend).and_then(|s| s.rtt)
    }

    /// Full entry for `backend`.
    pub fn stats(&self, backend: &BackendId) -> Option<BackendStats> {
        self.entries.get(backend).copied()
    }

    /// Number of known backends.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no backend is known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared, read-mostly weight table.
#[derive(Debug)]
pub struct WeightTable {
    current: ArcSwap<WeightSnapshot>,
    write: Mutex<()>,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightTable {
    /// Create an empty table at version 0.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(WeightSnapshot::default()),
            write: Mutex::new(()),
        }
    }

    /// Load the current snapshot.
    pub fn snapshot(&self) -> Arc<WeightSnapshot> {
        self.current.load_full()
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<BackendId, BackendStats>)) -> u64 {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let old = self.current.load_full();
        let mut entries = old.entries.clone();
        f(&mut entries);
        let version = old.version + 1;
        self.current.store(Arc::new(WeightSnapshot { version, entries }));
        version
    }

    /// Set the weight of `backend`. Returns the new version.
    pub fn set_weight(&self, backend: impl Into<BackendId>, weight: impl Into<Weight>) -> u64 {
        let backend = backend.into();
        let weight = weight.into();
        debug!(backend = %backend, weight = %weight, "weight updated");
        self.update(|entries| {
            entries.entry(backend).or_default().weight = weight;
        })
    }

    /// Record a round-trip-time estimate for `backend`.
    pub fn set_rtt(&self, backend: impl Into<BackendId>, rtt: Duration) -> u64 {
        let backend = backend.into();
        self.update(|entries| {
            entries.entry(backend).or_default().rtt = Some(rtt);
        })
    }

    /// Forget `backend`. Returns the new version.
    pub fn remove(&self, backend: &BackendId) -> u64 {
        self.update(|entries| {
            entries.remove(backend);
        })
    }
}
