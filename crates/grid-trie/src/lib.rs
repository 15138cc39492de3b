//! Grid Trie
//!
//! The lookup structure of the grid: an arena-backed byte trie whose regions
//! may be unresolved mount stubs, plus the mount table that says which
//! backends own each stub.
//!
//! # Design
//!
//! - **Keys**: arbitrary byte sequences, one edge per byte.
//! - **Lookup**: longest-valued-prefix descent. The match reports how many
//!   bytes were consumed so the rest of the key can act as call arguments.
//! - **Stubs**: placeholders for regions owned by a mount. A stub has no
//!   children until grafted.
//! - **Graft**: replaces a stub by index with a fetched [`Subtree`], keeping
//!   nested sub-mounts stubbed.
//! - **Eviction**: external, via the [`EvictionPolicy`] hook.
//!
//! The trie is not internally synchronized. Owners wrap it in a lock and
//! only ever hold that lock for in-memory work, never across a fetch.

mod error;
mod evict;
mod key;
mod mount;
mod node;
mod subtree;

pub use error::{MountError, TrieError};
pub use evict::{EvictionPolicy, GraftBudget, GraftRecord, NoEviction};
pub use key::{Key, Value};
pub use mount::{Mount, MountTable};
pub use node::{Lookup, Match, NodeId, NodeState, StubRef, Trie, TrieNode};
pub use subtree::Subtree;
