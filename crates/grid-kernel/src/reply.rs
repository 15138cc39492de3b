//! What a request delivers to its reply port.

use grid_trie::Value;

use crate::ResolveError;

/// A resolved lookup.
///
/// The key bytes past `consumed` were not part of the matched path. When the
/// trie is used for dispatch they are the call's arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Terminal value reached.
    pub value: Value,
    /// Key bytes matched to reach it.
    pub consumed: usize,
}

impl Completion {
    /// The unmatched tail of `key`.
    pub fn args<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        key.get(self.consumed..).unwrap_or_default()
    }
}

/// Reply delivered to a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Resolution reached a value.
    Completed(Completion),
    /// Resolution finished without a value.
    NotFound,
    /// Resolution failed.
    Failed(ResolveError),
    /// The request deadline passed.
    TimedOut,
}

impl Reply {
    /// The completed value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Completed(c) => Some(&c.value),
            _ => None,
        }
    }
}
