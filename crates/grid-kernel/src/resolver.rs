//! Lazy descent over the composed trie.
//!
//! Lookup runs under a short read lock on the trie. When it reaches a mount
//! stub the resolver joins (or starts) the single in-flight miss for that
//! stub, waits for it without holding any lock, then looks the key up again
//! from the root.
//!
//! Each miss runs in its own task. Waiters only hold clones of a shared join
//! future, so a waiter going away never cancels the fetch for the others.
//!
//! Lock order is in-flight map, then trie. The miss task grafts under the
//! trie write lock, releases it, and only then takes the map lock to
//! retire its entry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arc_swap::ArcSwap;
use futures::future::{BoxFuture, FutureExt, Shared};
use grid_router::{Backend, BackendId, Fetched, MissError, Resolved, Router};
use grid_trie::{
    EvictionPolicy, GraftRecord, Key, Lookup, MountTable, NoEviction, NodeId, StubRef, Trie, Value,
};
use tracing::{debug, error, info, trace};

use crate::{Completion, KernelConfig, ResolveError, Result};

/// Mount bindings as the resolver sees them.
pub type Mounts = MountTable<Arc<dyn Backend>>;

/// How a miss ended, as seen by every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissOutcome {
    /// The stub was replaced by a fetched region.
    Grafted {
        /// Backend that answered.
        backend: BackendId,
        /// Nodes in the grafted region.
        nodes: usize,
    },
    /// A backend asserted nothing exists under the stub. Not cached.
    Absent,
    /// The stub changed underneath the fetch (unmounted, evicted, remounted);
    /// the answer was discarded.
    Superseded,
    /// No candidate answered.
    Failed(MissError),
}

type SharedMiss = Shared<BoxFuture<'static, MissOutcome>>;

struct Inner {
    config: KernelConfig,
    router: Router,
    trie: RwLock<Trie>,
    mounts: ArcSwap<Mounts>,
    admin: Mutex<()>,
    eviction: RwLock<Arc<dyn EvictionPolicy>>,
    inflight: Mutex<HashMap<NodeId, SharedMiss>>,
}

/// Resolves keys across local content and mounted backends.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.inner.config)
            .field("nodes", &self.node_count())
            .field("mounts", &self.inner.mounts.load().len())
            .field("inflight", &self.inflight_misses())
            .finish()
    }
}

impl Resolver {
    /// Create a resolver over an empty trie with no mounts.
    pub fn new(config: KernelConfig, router: Router) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                router,
                trie: RwLock::new(Trie::new()),
                mounts: ArcSwap::from_pointee(Mounts::new()),
                admin: Mutex::new(()),
                eviction: RwLock::new(Arc::new(NoEviction)),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &KernelConfig {
        &self.inner.config
    }

    /// The router used for misses.
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Replace the eviction policy.
    pub fn set_eviction_policy(&self, policy: Arc<dyn EvictionPolicy>) {
        *self
            .inner
            .eviction
            .write()
            .unwrap_or_else(PoisonError::into_inner) = policy;
    }

    /// Resolve `key` to its longest-valued-prefix completion.
    ///
    /// `Ok(None)` means the key resolved to no value.
    pub async fn resolve(&self, key: &[u8]) -> std::result::Result<Option<Completion>, ResolveError> {
        self.resolve_observed(key, |_| {}).await
    }

    /// Like [`resolve`](Self::resolve), calling `on_round` with the round
    /// number after every completed miss round.
    pub async fn resolve_observed(
        &self,
        key: &[u8],
        mut on_round: impl FnMut(u32) + Send,
    ) -> std::result::Result<Option<Completion>, ResolveError> {
        self.inner.config.validate_key(key)?;

        let mut rounds = 0u32;
        let mut dead_ends: HashSet<NodeId> = HashSet::new();

        loop {
            let stub = match self.inner.lookup(key, &dead_ends) {
                Lookup::Found(m) => {
                    trace!(key = %Key::from(key), consumed = m.consumed, rounds, "resolved");
                    return Ok(Some(Completion {
                        value: m.value,
                        consumed: m.consumed,
                    }));
                }
                Lookup::NotFound => return Ok(None),
                Lookup::Stub(stub) => stub,
            };

            if rounds >= self.inner.config.max_resolution_depth {
                return Err(ResolveError::DepthExceeded { rounds });
            }
            let Some(miss) = self.inner.join_miss(&stub) else {
                continue;
            };

            let outcome = miss.await;
            rounds += 1;
            on_round(rounds);

            match outcome {
                MissOutcome::Grafted { .. } | MissOutcome::Superseded => {}
                MissOutcome::Absent => {
                    dead_ends.insert(stub.node);
                }
                MissOutcome::Failed(e) => return Err(e.into()),
            }
        }
    }

    /// Insert a value outside every mount.
    ///
    /// Content under a mount belongs to the mount's backends, so keys
    /// governed by a mount are rejected.
    pub fn insert_local(&self, key: &[u8], value: impl Into<Value>) -> Result<Option<Value>> {
        self.inner.config.validate_key(key)?;
        let mounts = self.inner.mounts.load();
        if let Some((mount, _)) = mounts.governing(key) {
            return Err(grid_trie::TrieError::BehindStub {
                mount: mount.clone(),
            }
            .into());
        }
        let previous = self.inner.trie_write().insert(key, value)?;
        trace!(key = %Key::from(key), "inserted local value");
        Ok(previous)
    }

    /// Bind `backends` to `prefix` and stub the region.
    ///
    /// Local content beneath the prefix is discarded; the region belongs to
    /// the mount from now on and is not restored by unregistering.
    pub fn register_mount(&self, prefix: impl Into<Key>, backends: Vec<Arc<dyn Backend>>) -> Result<()> {
        let prefix = prefix.into();
        let _admin = self.inner.admin();
        let previous = self.inner.mounts.load_full();
        let mut table = (*previous).clone();
        let count = backends.len();
        table.register(prefix.clone(), backends)?;
        self.inner.mounts.store(Arc::new(table));

        if let Err(e) = self.inner.trie_write().place_stub(&prefix) {
            self.inner.mounts.store(previous);
            return Err(e.into());
        }
        info!(prefix = %prefix, backends = count, "mount registered");
        Ok(())
    }

    /// Remove the binding at `prefix` and return its backends.
    ///
    /// The region is handed back to whatever governs it now: an enclosing
    /// mount is stubbed again so it re-fetches, otherwise the region is
    /// dropped with nested mounts re-stubbed.
    pub fn unregister_mount(&self, prefix: &[u8]) -> Result<Vec<Arc<dyn Backend>>> {
        let _admin = self.inner.admin();
        let mut table = (*self.inner.mounts.load_full()).clone();
        let backends = table.unregister(prefix)?;
        let table = Arc::new(table);
        self.inner.mounts.store(Arc::clone(&table));

        let key = Key::from(prefix);
        self.inner.restub_region(&table, &key)?;
        self.inner.eviction().forget(&key);
        info!(prefix = %key, "mount unregistered");
        Ok(backends)
    }

    /// Drop the cached region at `prefix`.
    ///
    /// Inside a mount, the whole mount returns to a stub and is re-fetched
    /// on next access. Outside every mount, local content is deleted.
    pub fn evict(&self, prefix: &[u8]) -> Result<bool> {
        let _admin = self.inner.admin();
        self.inner.evict(&Key::from(prefix))
    }

    /// Backends bound exactly at `prefix`.
    pub fn mount(&self, prefix: &[u8]) -> Option<Vec<Arc<dyn Backend>>> {
        self.inner.mounts.load().get(prefix).map(<[_]>::to_vec)
    }

    /// Current mount snapshot.
    pub fn mounts(&self) -> Arc<Mounts> {
        self.inner.mounts.load_full()
    }

    /// Prefixes of every live stub.
    pub fn stubs(&self) -> Vec<Key> {
        let mut stubs: Vec<Key> = self
            .inner
            .trie_read()
            .stubs()
            .into_iter()
            .map(|s| s.mount)
            .collect();
        stubs.sort();
        stubs
    }

    /// Live trie nodes.
    pub fn node_count(&self) -> usize {
        self.inner.trie_read().node_count()
    }

    /// Misses currently in flight.
    pub fn inflight_misses(&self) -> usize {
        self.inner.inflight().len()
    }
}

impl Inner {
    fn trie_read(&self) -> RwLockReadGuard<'_, Trie> {
        self.trie.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn trie_write(&self) -> RwLockWriteGuard<'_, Trie> {
        self.trie.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn inflight(&self) -> MutexGuard<'_, HashMap<NodeId, SharedMiss>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admin(&self) -> MutexGuard<'_, ()> {
        self.admin.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn eviction(&self) -> Arc<dyn EvictionPolicy> {
        Arc::clone(&self.eviction.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn lookup(&self, key: &[u8], dead_ends: &HashSet<NodeId>) -> Lookup {
        self.trie_read().lookup_with(key, |id| dead_ends.contains(&id))
    }

    /// Join the miss for `stub`, starting it if none is running.
    ///
    /// Returns `None` if the stub is gone by the time the map is locked.
    fn join_miss(self: &Arc<Self>, stub: &StubRef) -> Option<SharedMiss> {
        let mut inflight = self.inflight();
        if let Some(miss) = inflight.get(&stub.node) {
            trace!(prefix = %stub.mount, "joining in-flight miss");
            return Some(miss.clone());
        }

        // Graft happens before the entry is retired, so a stub seen here
        // with no entry has no miss running.
        if self.trie_read().stub_mount(stub.node) != Some(&stub.mount) {
            return None;
        }

        let this = Arc::clone(self);
        let owned = stub.clone();
        let task = tokio::spawn(async move { this.run_miss(owned).await });

        let this = Arc::clone(self);
        let owned = stub.clone();
        let miss = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(prefix = %owned.mount, error = %e, "miss task died");
                    this.inflight().remove(&owned.node);
                    MissOutcome::Failed(MissError::exhausted(owned.mount, 0))
                }
            }
        }
        .boxed()
        .shared();

        inflight.insert(stub.node, miss.clone());
        debug!(prefix = %stub.mount, "miss started");
        Some(miss)
    }

    async fn run_miss(self: Arc<Self>, stub: StubRef) -> MissOutcome {
        let outcome = self.fetch_and_graft(&stub).await;
        self.inflight().remove(&stub.node);
        outcome
    }

    async fn fetch_and_graft(&self, stub: &StubRef) -> MissOutcome {
        let mounts = self.mounts.load_full();
        let Some(candidates) = mounts.get(stub.mount.as_bytes()) else {
            debug!(prefix = %stub.mount, "mount vanished before fetch");
            return MissOutcome::Superseded;
        };
        let candidates = candidates.to_vec();

        let resolved = match self.router.resolve_miss(&stub.mount, &candidates).await {
            Ok(resolved) => resolved,
            Err(e) => return MissOutcome::Failed(e),
        };

        let Resolved {
            fetched, backend, ..
        } = resolved;
        let subtree = match fetched {
            Fetched::Subtree(subtree) => subtree,
            Fetched::Absent => {
                debug!(prefix = %stub.mount, backend = %backend, "backend asserts absence");
                return MissOutcome::Absent;
            }
        };

        let nested = mounts.nested_under(stub.mount.as_bytes());
        let grafted = self.trie_write().graft(stub.node, subtree, &nested);
        let nodes = match grafted {
            Ok(nodes) => nodes,
            Err(e) => {
                debug!(prefix = %stub.mount, error = %e, "stub changed during fetch, discarding");
                return MissOutcome::Superseded;
            }
        };
        debug!(prefix = %stub.mount, backend = %backend, nodes, "grafted");

        let victims = self.eviction().on_graft(&GraftRecord {
            prefix: stub.mount.clone(),
            nodes,
        });
        if !victims.is_empty() {
            let _admin = self.admin();
            for victim in victims {
                if let Err(e) = self.evict(&victim) {
                    error!(prefix = %victim, error = %e, "eviction failed");
                }
            }
        }

        MissOutcome::Grafted { backend, nodes }
    }

    /// Caller holds the admin lock.
    fn evict(&self, prefix: &Key) -> Result<bool> {
        let mounts = self.mounts.load_full();
        let evicted = match mounts.governing(prefix.as_bytes()) {
            Some((mount, _)) => {
                let mount = mount.clone();
                let mut trie = self.trie_write();
                let was_present = trie.find(mount.as_bytes()).is_some_and(|id| trie.stub_mount(id).is_none());
                trie.place_stub(&mount)?;
                drop(trie);
                self.forget_region(&mounts, &mount);
                if was_present {
                    debug!(prefix = %mount, "evicted mount region");
                }
                was_present
            }
            None => {
                let removed = self.restub_region(&mounts, prefix)?;
                if removed {
                    debug!(prefix = %prefix, "evicted local region");
                }
                removed
            }
        };
        Ok(evicted)
    }

    /// Hand the region at `prefix` back to `mounts`: stub the enclosing
    /// mount if there is one, otherwise drop the region and re-stub the
    /// mounts nested in it.
    fn restub_region(&self, mounts: &Mounts, prefix: &Key) -> Result<bool> {
        let mut trie = self.trie_write();
        if let Some((enclosing, _)) = mounts.governing(prefix.as_bytes()) {
            trie.place_stub(enclosing)?;
            drop(trie);
            self.forget_region(mounts, enclosing);
            return Ok(true);
        }

        let removed = trie.remove(prefix.as_bytes());
        let nested = mounts.nested_under(prefix.as_bytes());
        for mount in &nested {
            trie.place_stub(mount)?;
        }
        drop(trie);
        self.forget_region(mounts, prefix);
        Ok(removed)
    }

    /// Tell the eviction policy that `region` and every mount nested in it
    /// no longer hold grafted content.
    fn forget_region(&self, mounts: &Mounts, region: &Key) {
        let policy = self.eviction();
        policy.forget(region);
        for nested in mounts.nested_under(region.as_bytes()) {
            policy.forget(&nested);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use crate::Error;
    use grid_router::{MemoryBackend, RouterConfig, TransportError, WeightTable};
    use grid_trie::{GraftBudget, Subtree};

    fn resolver() -> (Resolver, Arc<WeightTable>) {
        let weights = Arc::new(WeightTable::new());
        let config = RouterConfig::fast().with_fetch_timeout(Duration::from_secs(5));
        let router = Router::new(config, Arc::clone(&weights));
        (Resolver::new(KernelConfig::fast(), router), weights)
    }

    fn store(id: &str, pairs: &[(&str, &str)]) -> Arc<MemoryBackend> {
        let backend = MemoryBackend::new(id);
        for (k, v) in pairs {
            backend.insert(k, *v);
        }
        Arc::new(backend)
    }

    fn value(completion: Option<Completion>) -> Option<String> {
        completion.and_then(|c| c.value.as_str().map(str::to_string))
    }

    /// Holds every fetch until the gate opens.
    struct Gated {
        id: BackendId,
        gate: tokio::sync::Notify,
        fetches: AtomicUsize,
        tree: Subtree,
    }

    #[async_trait]
    impl Backend for Gated {
        fn id(&self) -> &BackendId {
            &self.id
        }

        async fn fetch(&self, _prefix: &Key) -> std::result::Result<Fetched, TransportError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Fetched::Subtree(self.tree.clone()))
        }
    }

    #[tokio::test]
    async fn local_values_resolve_without_fetch() {
        let (resolver, _) = resolver();
        resolver.insert_local(b"ab", "X").unwrap();
        let empty = store("empty", &[]);
        resolver.register_mount("zz", vec![empty.clone()]).unwrap();

        assert_eq!(value(resolver.resolve(b"ab").await.unwrap()), Some("X".into()));
        assert_eq!(resolver.resolve(b"q").await.unwrap(), None);
        assert_eq!(empty.fetches(), 0);
    }

    #[tokio::test]
    async fn longest_valued_prefix_reports_consumed() {
        let (resolver, _) = resolver();
        resolver.insert_local(b"exec", "run").unwrap();

        let completion = resolver.resolve(b"exec/ls").await.unwrap().unwrap();
        assert_eq!(completion.value, Value::from("run"));
        assert_eq!(completion.consumed, 4);
        assert_eq!(completion.args(b"exec/ls"), b"/ls");
    }

    #[tokio::test]
    async fn miss_grafts_once() {
        let (resolver, _) = resolver();
        let backend = store("disk", &[("cd", "Y"), ("ce", "Z")]);
        resolver.register_mount("c", vec![backend.clone()]).unwrap();
        assert_eq!(resolver.stubs(), vec![Key::from("c")]);

        assert_eq!(value(resolver.resolve(b"cd").await.unwrap()), Some("Y".into()));
        assert_eq!(value(resolver.resolve(b"ce").await.unwrap()), Some("Z".into()));
        assert_eq!(backend.fetches(), 1);
        assert!(resolver.stubs().is_empty());
        assert_eq!(resolver.inflight_misses(), 0);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let (resolver, _) = resolver();
        let gated = Arc::new(Gated {
            id: "gated".into(),
            gate: tokio::sync::Notify::new(),
            fetches: AtomicUsize::new(0),
            tree: Subtree::from_pairs([("d", "Y")]),
        });
        resolver.register_mount("c", vec![gated.clone()]).unwrap();

        let r1 = resolver.clone();
        let r2 = resolver.clone();
        let first = tokio::spawn(async move { r1.resolve(b"cd").await });
        let second = tokio::spawn(async move { r2.resolve(b"cd").await });

        while gated.fetches.load(Ordering::SeqCst) == 0 || resolver.inflight_misses() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        gated.gate.notify_waiters();

        let a = first.await.unwrap().unwrap();
        let b = second.await.unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(value(a), Some("Y".into()));
        assert_eq!(gated.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn misses_on_different_stubs_do_not_wait_for_each_other() {
        let (resolver, _) = resolver();
        let parked = Arc::new(Gated {
            id: "parked".into(),
            gate: tokio::sync::Notify::new(),
            fetches: AtomicUsize::new(0),
            tree: Subtree::from_pairs([("x", "slow")]),
        });
        let quick = store("quick", &[("bx", "fast")]);
        resolver.register_mount("a", vec![parked.clone()]).unwrap();
        resolver.register_mount("b", vec![quick.clone()]).unwrap();

        let r = resolver.clone();
        let slow = tokio::spawn(async move { r.resolve(b"ax").await });
        while parked.fetches.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(value(resolver.resolve(b"bx").await.unwrap()), Some("fast".into()));
        assert_eq!(resolver.stubs(), vec![Key::from("a")]);
        assert_eq!(resolver.inflight_misses(), 1);
        assert!(!slow.is_finished());

        parked.gate.notify_waiters();
        assert_eq!(value(slow.await.unwrap().unwrap()), Some("slow".into()));
        assert!(resolver.stubs().is_empty());
    }

    #[tokio::test]
    async fn dropped_waiter_does_not_cancel_fetch() {
        let (resolver, _) = resolver();
        let gated = Arc::new(Gated {
            id: "gated".into(),
            gate: tokio::sync::Notify::new(),
            fetches: AtomicUsize::new(0),
            tree: Subtree::from_pairs([("d", "Y")]),
        });
        resolver.register_mount("c", vec![gated.clone()]).unwrap();

        let r1 = resolver.clone();
        let doomed = tokio::spawn(async move { r1.resolve(b"cd").await });
        let r2 = resolver.clone();
        let survivor = tokio::spawn(async move { r2.resolve(b"cd").await });

        while gated.fetches.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        doomed.abort();
        gated.gate.notify_waiters();

        assert_eq!(value(survivor.await.unwrap().unwrap()), Some("Y".into()));
        assert_eq!(gated.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_leaves_stub_in_place() {
        let (resolver, _) = resolver();
        let backend = store("down", &[("cd", "Y")]);
        backend.set_online(false);
        resolver.register_mount("c", vec![backend.clone()]).unwrap();

        let err = resolver.resolve(b"cd").await.unwrap_err();
        assert!(matches!(err, ResolveError::Exhausted(_)));
        assert_eq!(resolver.stubs(), vec![Key::from("c")]);

        backend.set_online(true);
        assert_eq!(value(resolver.resolve(b"cd").await.unwrap()), Some("Y".into()));
    }

    #[tokio::test]
    async fn absence_is_rechecked() {
        let (resolver, _) = resolver();
        resolver.insert_local(b"c", "outer").unwrap();
        let backend = store("late", &[]);
        resolver.register_mount("cd", vec![backend.clone()]).unwrap();

        // Absent ends descent at the stub, falling back to the shorter match
        let completion = resolver.resolve(b"cde").await.unwrap().unwrap();
        assert_eq!(completion.value, Value::from("outer"));
        assert_eq!(completion.consumed, 1);

        backend.insert("cde", "inner");
        assert_eq!(value(resolver.resolve(b"cde").await.unwrap()), Some("inner".into()));
        assert_eq!(backend.fetches(), 2);
    }

    #[tokio::test]
    async fn nested_mount_stays_stubbed_after_parent_graft() {
        let (resolver, _) = resolver();
        let outer = store("disk", &[("pa", "disk-a"), ("peer/x", "shadowed")]);
        let inner = store("peer", &[("peer/x", "remote-x")]);
        resolver.register_mount("p", vec![outer.clone()]).unwrap();
        resolver.register_mount("peer/", vec![inner.clone()]).unwrap();

        assert_eq!(value(resolver.resolve(b"pa").await.unwrap()), Some("disk-a".into()));
        assert_eq!(resolver.stubs(), vec![Key::from("peer/")]);
        assert_eq!(inner.fetches(), 0);

        assert_eq!(value(resolver.resolve(b"peer/x").await.unwrap()), Some("remote-x".into()));
        assert_eq!(outer.fetches(), 1);
        assert_eq!(inner.fetches(), 1);
    }

    #[tokio::test]
    async fn depth_limit_stops_runaway_resolution() {
        let weights = Arc::new(WeightTable::new());
        let router = Router::new(RouterConfig::fast(), weights);
        let resolver = Resolver::new(KernelConfig::fast().with_max_resolution_depth(2), router);

        // Each level is a sub-mount of the previous one
        for (i, prefix) in ["a", "ab", "abc"].iter().enumerate() {
            let backend = store(&format!("b{i}"), &[("abcd", "deep")]);
            resolver.register_mount(*prefix, vec![backend]).unwrap();
        }

        let err = resolver.resolve(b"abcd").await.unwrap_err();
        assert_eq!(err, ResolveError::DepthExceeded { rounds: 2 });
    }

    #[tokio::test]
    async fn invalid_keys_are_rejected() {
        let (resolver, _) = resolver();
        assert!(matches!(resolver.resolve(b"").await, Err(ResolveError::InvalidKey(_))));
        let long = vec![b'x'; 5000];
        assert!(matches!(resolver.resolve(&long).await, Err(ResolveError::InvalidKey(_))));
    }

    #[test]
    fn overlapping_mount_is_rejected() {
        let (resolver, _) = resolver();
        resolver.register_mount("c", vec![store("a", &[])]).unwrap();
        let err = resolver.register_mount("c", vec![store("b", &[])]).unwrap_err();
        assert!(matches!(err, Error::Mount(ref m) if m.is_overlap()));
    }

    #[test]
    fn local_insert_under_mount_is_rejected() {
        let (resolver, _) = resolver();
        resolver.register_mount("c", vec![store("a", &[])]).unwrap();
        assert!(matches!(resolver.insert_local(b"cd", "x"), Err(Error::Trie(_))));
    }

    #[tokio::test]
    async fn mounting_over_local_content_discards_it() {
        let (resolver, _) = resolver();
        resolver.insert_local(b"cd", "local").unwrap();
        resolver.register_mount("c", vec![store("disk", &[])]).unwrap();
        resolver.unregister_mount(b"c").unwrap();

        assert_eq!(resolver.resolve(b"cd").await.unwrap(), None);
        assert_eq!(resolver.node_count(), 1);
    }

    #[tokio::test]
    async fn unregister_returns_region_to_local() {
        let (resolver, _) = resolver();
        let backend = store("disk", &[("cd", "Y")]);
        resolver.register_mount("c", vec![backend.clone()]).unwrap();
        resolver.resolve(b"cd").await.unwrap();

        let removed = resolver.unregister_mount(b"c").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(resolver.resolve(b"cd").await.unwrap(), None);
        assert!(resolver.mount(b"c").is_none());
    }

    #[tokio::test]
    async fn evicted_mount_is_refetched() {
        let (resolver, _) = resolver();
        let backend = store("disk", &[("cd", "Y")]);
        resolver.register_mount("c", vec![backend.clone()]).unwrap();
        resolver.resolve(b"cd").await.unwrap();

        assert!(resolver.evict(b"cd").unwrap());
        assert_eq!(resolver.stubs(), vec![Key::from("c")]);
        assert_eq!(value(resolver.resolve(b"cd").await.unwrap()), Some("Y".into()));
        assert_eq!(backend.fetches(), 2);
    }

    #[tokio::test]
    async fn evicting_local_region_deletes_it() {
        let (resolver, _) = resolver();
        resolver.insert_local(b"ab", "X").unwrap();
        assert!(resolver.evict(b"a").unwrap());
        assert_eq!(resolver.resolve(b"ab").await.unwrap(), None);
        assert!(!resolver.evict(b"a").unwrap());
    }

    #[tokio::test]
    async fn graft_budget_evicts_oldest_region() {
        let (resolver, _) = resolver();
        resolver.set_eviction_policy(Arc::new(GraftBudget::new(4)));
        let first = store("one", &[("xa", "1"), ("xb", "2")]);
        let second = store("two", &[("ya", "3"), ("yb", "4")]);
        resolver.register_mount("x", vec![first.clone()]).unwrap();
        resolver.register_mount("y", vec![second.clone()]).unwrap();

        resolver.resolve(b"xa").await.unwrap();
        resolver.resolve(b"ya").await.unwrap();
        assert_eq!(resolver.stubs(), vec![Key::from("x")]);

        assert_eq!(value(resolver.resolve(b"xb").await.unwrap()), Some("2".into()));
        assert_eq!(first.fetches(), 2);
    }

    #[tokio::test]
    async fn dropping_a_region_releases_nested_grafts_from_budget() {
        let (resolver, _) = resolver();
        let budget = Arc::new(GraftBudget::new(1000));
        resolver.set_eviction_policy(budget.clone());
        let outer = store("disk", &[("pa", "disk-a")]);
        let inner = store("peer", &[("peer/x", "remote-x")]);
        resolver.register_mount("p", vec![outer.clone()]).unwrap();
        resolver.register_mount("peer/", vec![inner.clone()]).unwrap();

        resolver.resolve(b"peer/x").await.unwrap();
        assert!(budget.total_nodes() > 0);
        assert!(resolver.evict(b"p").unwrap());
        assert_eq!(budget.total_nodes(), 0);

        resolver.resolve(b"peer/x").await.unwrap();
        assert!(budget.total_nodes() > 0);
        resolver.unregister_mount(b"p").unwrap();
        assert_eq!(budget.total_nodes(), 0);
        assert_eq!(resolver.stubs(), vec![Key::from("peer/")]);
    }
}
