//! Arena-backed prefix trie with mount stubs.
//!
//! # Layout
//!
//! Nodes live in a flat arena addressed by [`NodeId`]. A `NodeId` pairs a
//! slot index with the slot's generation, so an id held across an eviction
//! never aliases whatever node later reuses the slot.
//!
//! Parents own their children through the arena. The only node that refers
//! outside the trie is a mount stub, and it refers by prefix, not by pointer:
//!
//! ```text
//! root ─ 'a' ─ 'b' (value "X")
//!      └ 'c' (Stub { mount: "c" })     <- resolved by the mount's backends
//! ```
//!
//! Grafting replaces a stub in place (same `NodeId`) with the fetched
//! subtree. Callers hold the trie exclusively while grafting, so a reader
//! sees either the stub or the whole subtree.

use std::collections::BTreeMap;

use tracing::trace;

use crate::{Key, Subtree, TrieError, Value};

/// Index of a node in the trie arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Slot index in the arena.
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued.
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// Resolution state of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    /// Children and value are known locally.
    Present,
    /// Known to exist, not yet fetched. Owned by the mount at `mount`.
    Stub {
        /// Prefix of the governing mount binding.
        mount: Key,
    },
}

/// One node of the trie.
#[derive(Debug, Clone)]
pub struct TrieNode {
    children: BTreeMap<u8, NodeId>,
    value: Option<Value>,
    state: NodeState,
}

impl TrieNode {
    fn present() -> Self {
        Self {
            children: BTreeMap::new(),
            value: None,
            state: NodeState::Present,
        }
    }

    /// Terminal value, if any.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Child reached by `label`.
    pub fn child(&self, label: u8) -> Option<NodeId> {
        self.children.get(&label).copied()
    }

    /// Iterate over (label, child) pairs.
    pub fn children(&self) -> impl Iterator<Item = (u8, NodeId)> + '_ {
        self.children.iter().map(|(&l, &id)| (l, id))
    }

    /// Resolution state.
    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Check if this node is an unresolved mount stub.
    pub fn is_stub(&self) -> bool {
        matches!(self.state, NodeState::Stub { .. })
    }

    /// Mount prefix if this node is a stub.
    pub fn mount(&self) -> Option<&Key> {
        match &self.state {
            NodeState::Stub { mount } => Some(mount),
            NodeState::Present => None,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<TrieNode>,
}

/// A successful longest-match lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Value of the deepest valued node on the key's path.
    pub value: Value,
    /// Number of key bytes consumed to reach that node.
    pub consumed: usize,
}

/// A stub reached during descent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubRef {
    /// The stub node.
    pub node: NodeId,
    /// Prefix of the mount that governs it.
    pub mount: Key,
}

/// Result of a local lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The key (or its longest valued prefix) resolved locally.
    Found(Match),
    /// Descent reached an unresolved stub before a decision could be made.
    Stub(StubRef),
    /// No valued node on the key's path.
    NotFound,
}

/// Arena-backed prefix trie.
#[derive(Debug)]
pub struct Trie {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    live: usize,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    /// Create a trie with a single present root.
    pub fn new() -> Self {
        let mut trie = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            live: 0,
        };
        trie.root = trie.alloc(TrieNode::present());
        trie
    }

    /// The root node id.
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, including the root.
    pub const fn node_count(&self) -> usize {
        self.live
    }

    /// Get a live node.
    pub fn node(&self, id: NodeId) -> Option<&TrieNode> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut TrieNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Mount prefix of `id` if it is still a live stub.
    pub fn stub_mount(&self, id: NodeId) -> Option<&Key> {
        self.node(id)?.mount()
    }

    fn alloc(&mut self, node: TrieNode) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Free `id` and everything beneath it. Returns the number of nodes freed.
    fn release(&mut self, id: NodeId) -> usize {
        let mut freed = 0;
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(slot) = self.slots.get_mut(id.index as usize) else {
                continue;
            };
            if slot.generation != id.generation {
                continue;
            }
            if let Some(node) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
                stack.extend(node.children.into_values());
                freed += 1;
            }
        }
        self.live -= freed;
        freed
    }

    /// Drop the children and value of `id`, keeping the node itself.
    fn clear(&mut self, id: NodeId) {
        let children = match self.node_mut(id) {
            Some(node) => {
                node.value = None;
                std::mem::take(&mut node.children)
            }
            None => return,
        };
        for child in children.into_values() {
            self.release(child);
        }
    }

    /// Child of `parent` at `label`, created as a present node if missing.
    fn child_or_insert(&mut self, parent: NodeId, label: u8) -> Result<NodeId, TrieError> {
        let node = self.node(parent).ok_or(TrieError::StaleNode(parent))?;
        if let Some(mount) = node.mount() {
            return Err(TrieError::BehindStub {
                mount: mount.clone(),
            });
        }
        if let Some(child) = node.child(label) {
            return Ok(child);
        }
        let child = self.alloc(TrieNode::present());
        self.node_mut(parent)
            .ok_or(TrieError::StaleNode(parent))?
            .children
            .insert(label, child);
        Ok(child)
    }

    /// Insert a value at `key`, creating present nodes along the path.
    ///
    /// Returns the previous value. Fails if the path runs through a stub:
    /// content beneath a mount belongs to that mount's backends.
    pub fn insert(&mut self, key: &[u8], value: impl Into<Value>) -> Result<Option<Value>, TrieError> {
        let mut id = self.root;
        for &label in key {
            id = self.child_or_insert(id, label)?;
        }
        let node = self.node_mut(id).ok_or(TrieError::StaleNode(id))?;
        if let Some(mount) = node.mount() {
            return Err(TrieError::BehindStub {
                mount: mount.clone(),
            });
        }
        Ok(node.value.replace(value.into()))
    }

    /// Exact node at `key`, following present children only.
    pub fn find(&self, key: &[u8]) -> Option<NodeId> {
        let mut id = self.root;
        for &label in key {
            id = self.node(id)?.child(label)?;
        }
        Some(id)
    }

    /// Longest-match descent over present children.
    pub fn lookup(&self, key: &[u8]) -> Lookup {
        self.lookup_with(key, |_| false)
    }

    /// Longest-match descent, treating stubs for which `dead_end` returns
    /// true as empty leaves instead of reporting them.
    pub fn lookup_with(&self, key: &[u8], mut dead_end: impl FnMut(NodeId) -> bool) -> Lookup {
        let mut id = self.root;
        let mut depth = 0;
        let mut best: Option<(&Value, usize)> = None;

        while let Some(node) = self.node(id) {
            if let Some(mount) = node.mount() {
                if dead_end(id) {
                    break;
                }
                return Lookup::Stub(StubRef {
                    node: id,
                    mount: mount.clone(),
                });
            }
            if let Some(value) = &node.value {
                best = Some((value, depth));
            }
            let Some(&label) = key.get(depth) else {
                break;
            };
            match node.child(label) {
                Some(child) => {
                    id = child;
                    depth += 1;
                }
                None => break,
            }
        }

        match best {
            Some((value, consumed)) => Lookup::Found(Match {
                value: value.clone(),
                consumed,
            }),
            None => Lookup::NotFound,
        }
    }

    /// Replace the stub `id` with `subtree`.
    ///
    /// Prefixes in `nested` that lie strictly beneath the stub's mount are
    /// re-stubbed inside the grafted region, so sub-mounts stay governed by
    /// their own backends. Returns the size of the grafted region.
    pub fn graft(&mut self, id: NodeId, subtree: Subtree, nested: &[Key]) -> Result<usize, TrieError> {
        let mount = self
            .node(id)
            .ok_or(TrieError::StaleNode(id))?
            .mount()
            .cloned()
            .ok_or(TrieError::NotStub(id))?;

        let Subtree { value, children } = subtree;
        {
            let node = self.node_mut(id).ok_or(TrieError::StaleNode(id))?;
            node.value = value;
            node.state = NodeState::Present;
        }

        let mut pending: Vec<(NodeId, u8, Subtree)> =
            children.into_iter().map(|(label, child)| (id, label, child)).collect();
        while let Some((parent, label, Subtree { value, children })) = pending.pop() {
            let child = self.alloc(TrieNode {
                children: BTreeMap::new(),
                value,
                state: NodeState::Present,
            });
            if let Some(p) = self.node_mut(parent) {
                p.children.insert(label, child);
            }
            pending.extend(children.into_iter().map(|(l, s)| (child, l, s)));
        }

        let mut inner: Vec<&Key> = nested
            .iter()
            .filter(|k| k.is_strictly_under(mount.as_bytes()))
            .collect();
        inner.sort_by_key(|k| k.len());
        for prefix in inner {
            self.stub_below(id, &prefix.as_bytes()[mount.len()..], prefix.clone())?;
        }

        let size = self.region_size(id);
        trace!(mount = %mount, nodes = size, "grafted subtree");
        Ok(size)
    }

    /// Turn the node at `rel` beneath `base` into a stub for `mount`.
    ///
    /// Returns `None` when the path crosses another stub first; the stub will
    /// be placed when that region is grafted.
    fn stub_below(&mut self, base: NodeId, rel: &[u8], mount: Key) -> Result<Option<NodeId>, TrieError> {
        let mut id = base;
        for &label in rel {
            if self.stub_mount(id).is_some() {
                return Ok(None);
            }
            id = self.child_or_insert(id, label)?;
        }
        if self.stub_mount(id) == Some(&mount) {
            return Ok(Some(id));
        }
        self.clear(id);
        let node = self.node_mut(id).ok_or(TrieError::StaleNode(id))?;
        node.state = NodeState::Stub { mount };
        Ok(Some(id))
    }

    /// Place a stub at `prefix`, hiding anything previously beneath it.
    ///
    /// Returns `None` if an ancestor is itself a stub.
    pub fn place_stub(&mut self, prefix: &Key) -> Result<Option<NodeId>, TrieError> {
        let root = self.root;
        self.stub_below(root, prefix.as_bytes(), prefix.clone())
    }

    /// Remove the region at `prefix` and prune ancestors left empty.
    ///
    /// Removing the root prefix clears the root in place. Returns false if
    /// nothing was at `prefix`.
    pub fn remove(&mut self, prefix: &[u8]) -> bool {
        let mut path = vec![self.root];
        for &label in prefix {
            let next = self.node(path[path.len() - 1]).and_then(|n| n.child(label));
            match next {
                Some(child) => path.push(child),
                None => return false,
            }
        }

        if prefix.is_empty() {
            let root = self.root;
            self.clear(root);
            if let Some(node) = self.node_mut(root) {
                node.state = NodeState::Present;
            }
            return true;
        }

        // Detach the target, then walk up removing empty present nodes
        let mut depth = prefix.len();
        let mut detach = true;
        while depth > 0 && detach {
            let id = path[depth];
            let parent = path[depth - 1];
            if let Some(p) = self.node_mut(parent) {
                p.children.remove(&prefix[depth - 1]);
            }
            self.release(id);
            depth -= 1;
            detach = depth > 0
                && self
                    .node(path[depth])
                    .is_some_and(|n| !n.is_stub() && n.value.is_none() && n.children.is_empty());
        }
        true
    }

    /// Number of live nodes in the region rooted at `id`.
    pub fn region_size(&self, id: NodeId) -> usize {
        let mut count = 0;
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.node(id) {
                count += 1;
                stack.extend(node.children.values().copied());
            }
        }
        count
    }

    /// All live stubs.
    pub fn stubs(&self) -> Vec<StubRef> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let mount = slot.node.as_ref()?.mount()?;
                Some(StubRef {
                    node: NodeId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    mount: mount.clone(),
                })
            })
            .collect()
    }
}
