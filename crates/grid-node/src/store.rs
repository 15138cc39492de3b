//! Persistent backend using RocksDB.
//!
//! Entries are stored under their absolute grid key. A fetch for a prefix is
//! a prefix scan; the hits are assembled into a subtree relative to the
//! prefix.

use std::path::Path;

use async_trait::async_trait;
use grid_router::{Backend, BackendId, BackendKind, Fetched, TransportError};
use grid_trie::{Key, Subtree, Value};
use rocksdb::{Options, DB};
use tracing::trace;

use crate::error::Result;

/// RocksDB-backed store serving one namespace.
pub struct StoreBackend {
    id: BackendId,
    db: DB,
}

impl std::fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBackend").field("id", &self.id).finish()
    }
}

impl StoreBackend {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(id: impl Into<BackendId>, path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { id: id.into(), db })
    }

    /// Store a value at an absolute key.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    /// Get the value at an absolute key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        Ok(self.db.get(key)?.map(Value::from))
    }

    /// Delete the value at an absolute key.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(key)?;
        Ok(())
    }

    /// Collect every entry under `prefix` as a relative subtree.
    ///
    /// Returns `None` when nothing is stored under the prefix.
    pub fn scan(&self, prefix: &[u8]) -> Result<Option<Subtree>> {
        let mut tree = Subtree::new();
        let mut hits = 0usize;

        for item in self.db.prefix_iterator(prefix) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            tree.insert(&key[prefix.len()..], Value::from(value.into_vec()));
            hits += 1;
        }

        trace!(store = %self.id, prefix = %Key::from(prefix), hits, "prefix scan");
        Ok((hits > 0).then_some(tree))
    }
}

#[async_trait]
impl Backend for StoreBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Persistent
    }

    async fn fetch(&self, prefix: &Key) -> std::result::Result<Fetched, TransportError> {
        match self.scan(prefix.as_bytes()) {
            Ok(Some(tree)) => Ok(Fetched::Subtree(tree)),
            Ok(None) => Ok(Fetched::Absent),
            Err(e) => Err(TransportError::Other(e.to_string())),
        }
    }
}
