//! Portable subtrees exchanged with backends.

use std::collections::BTreeMap;

use crate::Value;

/// An owned, detached region of a trie.
///
/// Backends answer a fetch with a `Subtree` rooted at the requested prefix.
/// Paths inside a subtree are relative to that prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Subtree {
    /// Terminal value at the subtree root.
    pub value: Option<Value>,
    /// Children keyed by edge label.
    pub children: BTreeMap<u8, Subtree>,
}

impl Subtree {
    /// Create an empty subtree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a subtree from relative (path, value) pairs.
    pub fn from_pairs<P, V>(pairs: impl IntoIterator<Item = (P, V)>) -> Self
    where
        P: AsRef<[u8]>,
        V: Into<Value>,
    {
        let mut tree = Self::new();
        for (path, value) in pairs {
            tree.insert(path.as_ref(), value);
        }
        tree
    }

    /// Insert a value at a relative path, creating intermediate nodes.
    /// Returns the previous value at that path.
    pub fn insert(&mut self, path: &[u8], value: impl Into<Value>) -> Option<Value> {
        let mut node = self;
        for &label in path {
            node = node.children.entry(label).or_default();
        }
        node.value.replace(value.into())
    }

    /// Get the subtree at a relative path.
    pub fn child(&self, path: &[u8]) -> Option<&Subtree> {
        let mut node = self;
        for label in path {
            node = node.children.get(label)?;
        }
        Some(node)
    }

    /// Get the value at a relative path.
    pub fn get(&self, path: &[u8]) -> Option<&Value> {
        self.child(path)?.value.as_ref()
    }

    /// Total number of nodes, including the root.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.values());
        }
        count
    }

    /// True if the subtree carries no value anywhere.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.values().all(Subtree::is_empty)
    }

    /// All (relative path, value) pairs in lexicographic order.
    pub fn pairs(&self) -> Vec<(Vec<u8>, Value)> {
        let mut out = Vec::new();
        let mut stack = vec![(Vec::new(), self)];
        while let Some((path, node)) = stack.pop() {
            if let Some(v) = &node.value {
                out.push((path.clone(), v.clone()));
            }
            // Reverse so the stack pops labels in ascending order
            for (&label, child) in node.children.iter().rev() {
                let mut p = path.clone();
                p.push(label);
                stack.push((p, child));
            }
        }
        out
    }
}
