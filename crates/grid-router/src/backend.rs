//! Backend interface and the in-memory backend.
//!
//! Every fetch source (a local store, a persistent cache, a remote peer) is
//! a [`Backend`]. The router and resolver never ask which kind they are
//! talking to; [`BackendKind`] exists for logging only.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use grid_trie::{Key, Subtree, Value};

use crate::TransportError;

/// Stable backend identifier. Orders backends when weights and RTTs tie.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackendId(String);

impl BackendId {
    /// Create an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BackendId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where a backend's data lives. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Process memory.
    Memory,
    /// Local persistent storage.
    Persistent,
    /// A network peer.
    Remote,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Persistent => write!(f, "persistent"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Answer to a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// The region rooted at the requested prefix.
    Subtree(Subtree),
    /// The backend asserts nothing exists at the prefix.
    Absent,
}

/// A source able to resolve the subtree at a prefix.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable identifier, used for weights and reputation reports.
    fn id(&self) -> &BackendId;

    /// Where the data lives (logging only).
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    /// Promise step: whether this backend offers to serve `prefix` at all.
    /// Declining backends are skipped without a fetch.
    fn accepts(&self, _prefix: &Key) -> bool {
        true
    }

    /// Fetch the subtree rooted at `prefix`.
    async fn fetch(&self, prefix: &Key) -> Result<Fetched, TransportError>;
}

/// Backend serving a namespace held in memory.
///
/// Also stands in for a remote peer in tests and simulations: it can add a
/// fixed delay to every fetch and be switched offline.
#[derive(Debug)]
pub struct MemoryBackend {
    id: BackendId,
    kind: BackendKind,
    data: RwLock<Subtree>,
    delay: Option<Duration>,
    online: AtomicBool,
    fetches: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new(id: impl Into<BackendId>) -> Self {
        Self {
            id: id.into(),
            kind: BackendKind::Memory,
            data: RwLock::new(Subtree::new()),
            delay: None,
            online: AtomicBool::new(true),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Report a different kind in logs.
    #[must_use]
    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Delay every fetch.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Store `value` at an absolute key.
    pub fn insert(&self, key: impl AsRef<[u8]>, value: impl Into<Value>) -> Option<Value> {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.as_ref(), value)
    }

    /// Make fetches fail as unreachable (or succeed again).
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of fetches issued against this backend.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn fetch(&self, prefix: &Key) -> Result<Fetched, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable(self.id.to_string()));
        }
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(match data.child(prefix.as_bytes()) {
            Some(region) => Fetched::Subtree(region.clone()),
            None => Fetched::Absent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_fetch_returns_relative_region() {
        let backend = MemoryBackend::new("mem");
        backend.insert("cd", "Y");
        backend.insert("ce", "Z");
        backend.insert("x", "other");

        let fetched = backend.fetch(&Key::from("c")).await.unwrap();
        let Fetched::Subtree(tree) = fetched else {
            panic!("expected subtree");
        };
        assert_eq!(tree.get(b"d"), Some(&Value::from("Y")));
        assert_eq!(tree.get(b"e"), Some(&Value::from("Z")));
        assert!(tree.get(b"x").is_none());
        assert_eq!(backend.fetches(), 1);
    }

    #[tokio::test]
    async fn memory_fetch_absent() {
        let backend = MemoryBackend::new("mem");
        backend.insert("cd", "Y");
        assert_eq!(backend.fetch(&Key::from("q")).await.unwrap(), Fetched::Absent);
    }

    #[tokio::test]
    async fn offline_backend_is_unreachable() {
        let backend = MemoryBackend::new("peer").with_kind(BackendKind::Remote);
        backend.set_online(false);

        let err = backend.fetch(&Key::from("c")).await.unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(id) if id == "peer"));
        assert_eq!(backend.kind(), BackendKind::Remote);
    }

    #[test]
    fn backend_id_orders_lexically() {
        let mut ids = vec![BackendId::from("b"), BackendId::from("a"), BackendId::from("c")];
        ids.sort();
        assert_eq!(ids, vec!["a".into(), "b".into(), "c".into()]);
    }
}
