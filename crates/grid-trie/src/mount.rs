//! Mount table: prefix bindings that compose backends into one namespace.
//!
//! Bindings are keyed by byte prefix. Two byte prefixes are either nested
//! (one starts with the other) or disjoint, so the only possible collision is
//! two bindings claiming the same prefix. Nested bindings are sub-mounts:
//!
//! ```text
//! ""      -> persistent store
//! "peer/" -> remote peers         (nested under "")
//! "peer/x"-> one specific peer    (nested under "peer/")
//! ```
//!
//! The longest binding that prefixes a key governs it.

use std::collections::BTreeMap;

use crate::{Key, MountError};

/// A single (prefix, backends) binding.
#[derive(Debug, Clone)]
pub struct Mount<B> {
    /// Namespace prefix.
    pub prefix: Key,
    /// Backends able to resolve the prefix.
    pub backends: Vec<B>,
}

/// Ordered set of mount bindings.
#[derive(Debug, Clone)]
pub struct MountTable<B> {
    mounts: BTreeMap<Key, Vec<B>>,
}

impl<B> Default for MountTable<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> MountTable<B> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            mounts: BTreeMap::new(),
        }
    }

    /// Insert a binding.
    pub fn register(&mut self, prefix: Key, backends: Vec<B>) -> Result<(), MountError> {
        if backends.is_empty() {
            return Err(MountError::NoBackends { prefix });
        }
        if self.mounts.contains_key(&prefix) {
            return Err(MountError::Overlap {
                existing: prefix.clone(),
                prefix,
            });
        }
        self.mounts.insert(prefix, backends);
        Ok(())
    }

    /// Remove a binding, returning its backends.
    pub fn unregister(&mut self, prefix: &[u8]) -> Result<Vec<B>, MountError> {
        self.mounts.remove(prefix).ok_or_else(|| MountError::NotMounted {
            prefix: Key::from(prefix),
        })
    }

    /// Backends bound at exactly `prefix`.
    pub fn get(&self, prefix: &[u8]) -> Option<&[B]> {
        self.mounts.get(prefix).map(Vec::as_slice)
    }

    /// Longest binding that prefixes `key`.
    pub fn governing(&self, key: &[u8]) -> Option<(&Key, &[B])> {
        (0..=key.len())
            .rev()
            .find_map(|len| self.mounts.get_key_value(&key[..len]))
            .map(|(k, b)| (k, b.as_slice()))
    }

    /// Bindings strictly nested beneath `prefix`, shortest first.
    pub fn nested_under(&self, prefix: &[u8]) -> Vec<Key> {
        let mut nested: Vec<Key> = self
            .mounts
            .keys()
            .filter(|k| k.is_strictly_under(prefix))
            .cloned()
            .collect();
        nested.sort_by_key(Key::len);
        nested
    }

    /// Iterate over bindings in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = Mount<&B>> + '_ {
        self.mounts.iter().map(|(prefix, backends)| Mount {
            prefix: prefix.clone(),
            backends: backends.iter().collect(),
        })
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}
