//! Eviction hook for grafted regions.
//!
//! The trie itself never evicts. After every graft the owner reports a
//! [`GraftRecord`] to an [`EvictionPolicy`], which answers with mount
//! prefixes to drop. Dropped mount regions become stubs again and are
//! re-fetched on next access.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::Key;

/// A completed graft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraftRecord {
    /// Mount prefix that was grafted.
    pub prefix: Key,
    /// Number of nodes in the grafted region.
    pub nodes: usize,
}

/// Decides which grafted regions to drop.
pub trait EvictionPolicy: Send + Sync {
    /// Called after a graft lands. Returns prefixes to evict.
    fn on_graft(&self, record: &GraftRecord) -> Vec<Key>;

    /// Called when a region disappears for any other reason (unmount,
    /// explicit eviction).
    fn forget(&self, _prefix: &Key) {}
}

/// Keep everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEviction;

impl EvictionPolicy for NoEviction {
    fn on_graft(&self, _record: &GraftRecord) -> Vec<Key> {
        Vec::new()
    }
}

/// Size-bounded policy: once the grafted node total exceeds `max_nodes`,
/// evict the oldest grafts first. The graft that just landed is never
/// its own victim.
#[derive(Debug)]
pub struct GraftBudget {
    max_nodes: usize,
    state: Mutex<BudgetState>,
}

#[derive(Debug, Default)]
struct BudgetState {
    grafts: VecDeque<GraftRecord>,
    total: usize,
}

impl BudgetState {
    fn drop_prefix(&mut self, prefix: &Key) {
        if let Some(pos) = self.grafts.iter().position(|r| &r.prefix == prefix) {
            if let Some(old) = self.grafts.remove(pos) {
                self.total -= old.nodes;
            }
        }
    }
}

impl GraftBudget {
    /// Create a policy with the given node budget.
    pub fn new(max_nodes: usize) -> Self {
        Self {
            max_nodes,
            state: Mutex::new(BudgetState::default()),
        }
    }

    /// Grafted nodes currently accounted for.
    pub fn total_nodes(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).total
    }
}

impl EvictionPolicy for GraftBudget {
    fn on_graft(&self, record: &GraftRecord) -> Vec<Key> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.drop_prefix(&record.prefix);
        state.grafts.push_back(record.clone());
        state.total += record.nodes;

        let mut victims = Vec::new();
        while state.total > self.max_nodes && state.grafts.len() > 1 {
            match state.grafts.pop_front() {
                Some(old) => {
                    state.total -= old.nodes;
                    victims.push(old.prefix);
                }
                None => break,
            }
        }
        victims
    }

    fn forget(&self, prefix: &Key) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drop_prefix(prefix);
    }
}
