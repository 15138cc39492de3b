//! Request surface: mint a port, send a key, receive the completion there.

use std::sync::Arc;
use std::time::{Duration, Instant};

use grid_port::{Port, PortReceiver, PortTable, RequestState};
use grid_router::{Backend, Router, WeightTable};
use grid_trie::{EvictionPolicy, Key, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{KernelConfig, Reply, Resolver, Result};

/// Slack between a request's timeout and its port's deadline, so the
/// `TimedOut` reply lands before the reaper retires the port.
const PORT_GRACE: Duration = Duration::from_secs(1);

struct Inner {
    resolver: Resolver,
    ports: PortTable<Reply>,
}

/// The grid kernel: a resolver plus the ports replies are delivered to.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("resolver", &self.inner.resolver)
            .field("ports", &self.inner.ports)
            .finish()
    }
}

impl Kernel {
    /// Create a kernel whose router reads `weights`.
    pub fn new(config: KernelConfig, weights: Arc<WeightTable>) -> Self {
        let router = Router::new(config.router, weights);
        Self::with_router(config, router)
    }

    /// Create a kernel around a configured router.
    pub fn with_router(config: KernelConfig, router: Router) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver: Resolver::new(config, router),
                ports: PortTable::new(),
            }),
        }
    }

    /// The underlying resolver.
    pub fn resolver(&self) -> &Resolver {
        &self.inner.resolver
    }

    /// Weights read by the router.
    pub fn weights(&self) -> &Arc<WeightTable> {
        self.inner.resolver.router().weights()
    }

    /// Mint a single-reply port.
    ///
    /// A port that is never sent on is retired by the reaper once the
    /// request timeout has passed.
    pub fn mint_port(&self) -> (Port, PortReceiver<Reply>) {
        let deadline = Instant::now() + self.inner.resolver.config().request_timeout;
        self.inner.ports.open(1, Some(deadline))
    }

    /// Mint a port admitting up to `bound` replies, retired at `deadline`.
    pub fn mint_port_bounded(&self, bound: u32, deadline: Option<Instant>) -> (Port, PortReceiver<Reply>) {
        self.inner.ports.open(bound, deadline)
    }

    /// Check if `port` can still receive replies.
    pub fn port_open(&self, port: &Port) -> bool {
        self.inner.ports.is_open(port)
    }

    /// Resolve `key` and deliver the outcome to `port`.
    ///
    /// Fails only if `port` is not open. Everything else, including a
    /// malformed key, is reported through the port. Dropping the handle
    /// detaches the request; it still runs and replies.
    pub fn send(&self, key: impl Into<Key>, port: Port) -> Result<RequestHandle> {
        let deadline = Instant::now() + self.inner.resolver.config().request_timeout + PORT_GRACE;
        self.inner.ports.extend_deadline(&port, deadline)?;

        let key = key.into();
        let state = Arc::new(watch::Sender::new(RequestState::Sent));
        debug!(%port, key = %key, "request sent");

        let task = tokio::spawn(run_request(
            Arc::clone(&self.inner),
            key,
            port,
            Arc::clone(&state),
        ));

        Ok(RequestHandle {
            port,
            state,
            task,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Retire every port whose deadline has passed.
    pub fn expire_ports(&self, now: Instant) -> Vec<Port> {
        self.inner.ports.expire(now)
    }

    /// Periodically retire expired ports until the kernel is dropped.
    pub fn spawn_port_reaper(&self, every: Duration) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let expired = inner.ports.expire(Instant::now());
                if !expired.is_empty() {
                    debug!(count = expired.len(), "reaped expired ports");
                }
            }
        })
    }

    /// Store a value outside every mount.
    pub fn insert_local(&self, key: impl AsRef<[u8]>, value: impl Into<Value>) -> Result<Option<Value>> {
        self.inner.resolver.insert_local(key.as_ref(), value)
    }

    /// Bind backends to a prefix.
    pub fn register_mount(&self, prefix: impl Into<Key>, backends: Vec<Arc<dyn Backend>>) -> Result<()> {
        self.inner.resolver.register_mount(prefix, backends)
    }

    /// Remove the binding at `prefix`.
    pub fn unregister_mount(&self, prefix: impl AsRef<[u8]>) -> Result<Vec<Arc<dyn Backend>>> {
        self.inner.resolver.unregister_mount(prefix.as_ref())
    }

    /// Drop the cached region at `prefix`.
    pub fn evict(&self, prefix: impl AsRef<[u8]>) -> Result<bool> {
        self.inner.resolver.evict(prefix.as_ref())
    }

    /// Replace the eviction policy.
    pub fn set_eviction_policy(&self, policy: Arc<dyn EvictionPolicy>) {
        self.inner.resolver.set_eviction_policy(policy);
    }
}

async fn run_request(inner: Arc<Inner>, key: Key, port: Port, state: Arc<watch::Sender<RequestState>>) {
    state.send_if_modified(|s| s.advance(RequestState::Resolving { round: 0 }).is_ok());

    let timeout = inner.resolver.config().request_timeout;
    let observer = Arc::clone(&state);
    let resolution = inner.resolver.resolve_observed(key.as_bytes(), move |round| {
        observer.send_if_modified(|s| s.advance(RequestState::Resolving { round }).is_ok());
    });

    let (reply, terminal) = match tokio::time::timeout(timeout, resolution).await {
        Ok(Ok(Some(completion))) => (Reply::Completed(completion), RequestState::Completed),
        Ok(Ok(None)) => (Reply::NotFound, RequestState::Completed),
        Ok(Err(e)) => {
            warn!(%port, key = %key, error = %e, "request failed");
            (Reply::Failed(e), RequestState::Failed)
        }
        Err(_) => {
            warn!(%port, key = %key, "request timed out");
            (Reply::TimedOut, RequestState::TimedOut)
        }
    };

    // The state lock orders delivery against cancel: whichever moves the
    // request to a terminal state first wins.
    state.send_if_modified(|s| {
        if s.advance(terminal).is_err() {
            return false;
        }
        if let Err(e) = inner.ports.deliver(&port, reply) {
            debug!(%port, error = %e, "reply not delivered");
        }
        true
    });
    debug!(%port, state = %terminal, "request finished");
}

/// Tracks one in-flight request.
pub struct RequestHandle {
    port: Port,
    state: Arc<watch::Sender<RequestState>>,
    task: JoinHandle<()>,
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("port", &self.port)
            .field("state", &self.state())
            .finish()
    }
}

impl RequestHandle {
    /// The reply port.
    pub const fn port(&self) -> Port {
        self.port
    }

    /// Current state.
    pub fn state(&self) -> RequestState {
        *self.state.borrow()
    }

    /// Wait for a terminal state.
    pub async fn wait(&self) -> RequestState {
        let mut rx = self.state.subscribe();
        let result = rx.wait_for(RequestState::is_terminal).await.map(|s| *s);
        result.unwrap_or_else(|_| *self.state.borrow())
    }

    /// Cancel the request. The port is closed and receives nothing.
    ///
    /// Returns false if the request had already finished.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .send_if_modified(|s| s.advance(RequestState::Cancelled).is_ok());
        if cancelled {
            self.inner.ports.close(&self.port);
            self.task.abort();
            info!(port = %self.port, "request cancelled");
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_router::{MemoryBackend, RouterConfig};

    fn kernel() -> Kernel {
        Kernel::new(KernelConfig::fast(), Arc::new(WeightTable::new()))
    }

    #[tokio::test]
    async fn local_request_completes() {
        let kernel = kernel();
        kernel.insert_local("ab", "X").unwrap();

        let (port, mut rx) = kernel.mint_port();
        let handle = kernel.send("ab", port).unwrap();

        assert_eq!(handle.wait().await, RequestState::Completed);
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.value(), Some(&Value::from("X")));
        assert_eq!(rx.recv().await, None);
        assert!(!kernel.port_open(&port));
    }

    #[tokio::test]
    async fn not_found_completes_with_no_value() {
        let kernel = kernel();
        let (port, mut rx) = kernel.mint_port();
        let handle = kernel.send("zz", port).unwrap();

        assert_eq!(handle.wait().await, RequestState::Completed);
        assert_eq!(rx.recv().await, Some(Reply::NotFound));
    }

    #[tokio::test]
    async fn exhausted_miss_fails_request() {
        let kernel = kernel();
        let backend = Arc::new(MemoryBackend::new("down"));
        backend.set_online(false);
        kernel.register_mount("c", vec![backend]).unwrap();

        let (port, mut rx) = kernel.mint_port();
        let handle = kernel.send("cd", port).unwrap();

        assert_eq!(handle.wait().await, RequestState::Failed);
        assert!(matches!(rx.recv().await, Some(Reply::Failed(e)) if e.is_retryable()));
    }

    #[tokio::test]
    async fn slow_request_times_out() {
        let config = KernelConfig::fast()
            .with_router(RouterConfig::default())
            .with_request_timeout(Duration::from_millis(50));
        let kernel = Kernel::new(config, Arc::new(WeightTable::new()));
        let backend = Arc::new(MemoryBackend::new("slow").with_delay(Duration::from_secs(10)));
        kernel.register_mount("c", vec![backend]).unwrap();

        let (port, mut rx) = kernel.mint_port();
        let handle = kernel.send("cd", port).unwrap();

        assert_eq!(handle.wait().await, RequestState::TimedOut);
        assert_eq!(rx.recv().await, Some(Reply::TimedOut));
    }

    #[tokio::test]
    async fn cancelled_request_delivers_nothing() {
        let kernel = kernel();
        let backend = Arc::new(MemoryBackend::new("slow").with_delay(Duration::from_secs(10)));
        kernel.register_mount("c", vec![backend]).unwrap();

        let (port, mut rx) = kernel.mint_port();
        let handle = kernel.send("cd", port).unwrap();

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(handle.wait().await, RequestState::Cancelled);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn finished_request_cannot_be_cancelled() {
        let kernel = kernel();
        kernel.insert_local("ab", "X").unwrap();
        let (port, mut rx) = kernel.mint_port();
        let handle = kernel.send("ab", port).unwrap();

        handle.wait().await;
        assert!(!handle.cancel());
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn resolving_rounds_are_counted() {
        let kernel = kernel();
        let backend = Arc::new(MemoryBackend::new("disk"));
        backend.insert("cd", "Y");
        kernel.register_mount("c", vec![backend]).unwrap();

        let (port, _rx) = kernel.mint_port();
        let handle = kernel.send("cd", port).unwrap();
        let mut rx = handle.state.subscribe();
        let mut seen = vec![*rx.borrow_and_update()];
        while !seen.last().is_some_and(RequestState::is_terminal) {
            rx.changed().await.unwrap();
            seen.push(*rx.borrow_and_update());
        }
        assert_eq!(seen.last(), Some(&RequestState::Completed));
        assert!(seen
            .iter()
            .all(|s| !matches!(s, RequestState::Resolving { round } if *round > 1)));
    }

    #[test]
    fn send_requires_open_port() {
        let kernel = kernel();
        let forged = Port::from_bytes([7u8; 32]);
        tokio_test::block_on(async {
            assert!(kernel.send("ab", forged).is_err());
        });
    }

    #[tokio::test]
    async fn unused_ports_are_reaped() {
        let kernel = kernel();
        let (idle, _idle_rx) = kernel.mint_port();
        let (abandoned, rx) = kernel.mint_port();
        let (held, _held_rx) = kernel.mint_port();
        drop(rx);

        assert_eq!(kernel.expire_ports(Instant::now()), vec![abandoned]);
        assert!(kernel.port_open(&idle));

        let timeout = kernel.resolver().config().request_timeout;
        let later = Instant::now() + timeout;
        let mut reaped = kernel.expire_ports(later);
        reaped.sort();
        let mut expected = vec![idle, held];
        expected.sort();
        assert_eq!(reaped, expected);
    }

    #[tokio::test]
    async fn send_keeps_port_open_past_mint_deadline() {
        let kernel = kernel();
        let backend = Arc::new(MemoryBackend::new("slow").with_delay(Duration::from_secs(10)));
        kernel.register_mount("c", vec![backend]).unwrap();

        let (port, _rx) = kernel.mint_port();
        let handle = kernel.send("cd", port).unwrap();
        let timeout = kernel.resolver().config().request_timeout;

        assert!(kernel.expire_ports(Instant::now() + timeout).is_empty());
        assert!(kernel.port_open(&port));
        handle.cancel();
    }

    #[tokio::test]
    async fn expired_port_rejects_send() {
        let kernel = kernel();
        let (port, _rx) = kernel.mint_port_bounded(1, Some(Instant::now()));
        assert_eq!(kernel.expire_ports(Instant::now()), vec![port]);
        assert!(kernel.send("ab", port).is_err());
    }
}
