//! Error types for grid-trie.

use thiserror::Error;

use crate::{Key, NodeId};

/// Errors raised by trie mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrieError {
    /// The path runs through an unresolved mount stub.
    #[error("path runs through unresolved mount {mount}")]
    BehindStub {
        /// Prefix of the stub in the way.
        mount: Key,
    },

    /// The node id no longer refers to a live node.
    #[error("stale node reference {0:?}")]
    StaleNode(NodeId),

    /// The node is live but is not a mount stub.
    #[error("node {0:?} is not a mount stub")]
    NotStub(NodeId),
}

/// Errors raised by mount administration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MountError {
    /// The prefix collides with an existing binding that is not strictly
    /// nested inside (or around) it.
    #[error("mount {prefix} overlaps existing mount {existing}")]
    Overlap {
        /// The prefix being registered.
        prefix: Key,
        /// The binding it collides with.
        existing: Key,
    },

    /// A binding must name at least one backend.
    #[error("mount {prefix} has no backends")]
    NoBackends {
        /// The prefix being registered.
        prefix: Key,
    },

    /// No binding exists at the prefix.
    #[error("nothing mounted at {prefix}")]
    NotMounted {
        /// The prefix that was looked up.
        prefix: Key,
    },
}

impl MountError {
    /// Returns true for administrative overlap errors.
    pub const fn is_overlap(&self) -> bool {
        matches!(self, Self::Overlap { .. })
    }
}
