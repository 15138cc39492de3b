//! Outstanding ports and bounded reply delivery.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{Error, Port, PortIssuer, Result};

/// Outcome of a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// More replies may still be delivered to the port.
    Open {
        /// Replies left before the port retires.
        remaining: u32,
    },
    /// That was the last permitted reply; the port is retired.
    Retired,
}

/// Receiving half of a port, held by whoever minted it.
#[derive(Debug)]
pub struct PortReceiver<R> {
    port: Port,
    rx: mpsc::Receiver<R>,
}

impl<R> PortReceiver<R> {
    /// The port this receiver listens on.
    pub const fn port(&self) -> Port {
        self.port
    }

    /// Wait for the next reply. Returns `None` once the port is retired and
    /// every delivered reply has been received.
    pub async fn recv(&mut self) -> Option<R> {
        self.rx.recv().await
    }

    /// Take a reply if one is ready.
    pub fn try_recv(&mut self) -> Option<R> {
        self.rx.try_recv().ok()
    }
}

struct PortSlot<R> {
    tx: mpsc::Sender<R>,
    remaining: u32,
    deadline: Option<Instant>,
}

/// Registry of open ports.
///
/// Each port admits at most `bound` deliveries and retires when the bound is
/// met, when it is closed, or when its deadline passes.
pub struct PortTable<R> {
    issuer: PortIssuer,
    slots: Mutex<HashMap<Port, PortSlot<R>>>,
}

impl<R> Default for PortTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> std::fmt::Debug for PortTable<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortTable")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl<R> PortTable<R> {
    /// Create a table with a fresh issuer.
    pub fn new() -> Self {
        Self::with_issuer(PortIssuer::new())
    }

    /// Create a table around an existing issuer.
    pub fn with_issuer(issuer: PortIssuer) -> Self {
        Self {
            issuer,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<Port, PortSlot<R>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mint a single-reply port with no deadline.
    pub fn mint(&self) -> (Port, PortReceiver<R>) {
        self.open(1, None)
    }

    /// Mint a port admitting up to `bound` replies (at least one).
    pub fn open(&self, bound: u32, deadline: Option<Instant>) -> (Port, PortReceiver<R>) {
        let bound = bound.max(1);
        let port = self.issuer.mint();
        let (tx, rx) = mpsc::channel(bound as usize);
        self.slots().insert(
            port,
            PortSlot {
                tx,
                remaining: bound,
                deadline,
            },
        );
        trace!(%port, bound, "opened port");
        (port, PortReceiver { port, rx })
    }

    /// Check if `port` is open.
    pub fn is_open(&self, port: &Port) -> bool {
        self.slots().contains_key(port)
    }

    /// Replies still admitted by `port`.
    pub fn remaining(&self, port: &Port) -> Option<u32> {
        self.slots().get(port).map(|s| s.remaining)
    }

    /// Set or replace the deadline of an open port.
    pub fn set_deadline(&self, port: &Port, deadline: Instant) -> Result<()> {
        let mut slots = self.slots();
        let slot = slots.get_mut(port).ok_or(Error::Unknown(*port))?;
        slot.deadline = Some(deadline);
        Ok(())
    }

    /// Move the deadline of an open port out to at least `deadline`.
    ///
    /// Ports opened without a deadline keep none.
    pub fn extend_deadline(&self, port: &Port, deadline: Instant) -> Result<()> {
        let mut slots = self.slots();
        let slot = slots.get_mut(port).ok_or(Error::Unknown(*port))?;
        if let Some(current) = slot.deadline {
            slot.deadline = Some(current.max(deadline));
        }
        Ok(())
    }

    /// Deliver one reply.
    pub fn deliver(&self, port: &Port, reply: R) -> Result<Delivery> {
        let mut slots = self.slots();
        let slot = slots.get_mut(port).ok_or(Error::Unknown(*port))?;

        // Channel capacity equals the bound, so a full channel cannot happen
        // while `remaining > 0`; only a dropped receiver fails here.
        if slot.tx.try_send(reply).is_err() {
            slots.remove(port);
            debug!(%port, "receiver dropped, retiring port");
            return Err(Error::Closed(*port));
        }

        slot.remaining -= 1;
        if slot.remaining == 0 {
            slots.remove(port);
            trace!(%port, "port retired after final reply");
            Ok(Delivery::Retired)
        } else {
            Ok(Delivery::Open {
                remaining: slot.remaining,
            })
        }
    }

    /// Retire a port without delivering. Returns false if it was not open.
    pub fn close(&self, port: &Port) -> bool {
        self.slots().remove(port).is_some()
    }

    /// Retire every port whose deadline is at or before `now`, and every
    /// port whose receiver has been dropped.
    pub fn expire(&self, now: Instant) -> Vec<Port> {
        let mut slots = self.slots();
        let expired: Vec<Port> = slots
            .iter()
            .filter(|(_, s)| s.tx.is_closed() || s.deadline.is_some_and(|d| d <= now))
            .map(|(p, _)| *p)
            .collect();
        for port in &expired {
            slots.remove(port);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "expired ports");
        }
        expired
    }

    /// Number of open ports.
    pub fn outstanding(&self) -> usize {
        self.slots().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn single_reply_retires_port() {
        let table = PortTable::new();
        let (port, mut rx) = table.mint();

        assert_eq!(table.deliver(&port, "hello").unwrap(), Delivery::Retired);
        assert_eq!(rx.recv().await, Some("hello"));

        // Second delivery is refused
        assert_eq!(table.deliver(&port, "again"), Err(Error::Unknown(port)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn bounded_port_admits_bound_replies() {
        let table = PortTable::new();
        let (port, mut rx) = table.open(3, None);

        assert_eq!(table.deliver(&port, 1).unwrap(), Delivery::Open { remaining: 2 });
        assert_eq!(table.deliver(&port, 2).unwrap(), Delivery::Open { remaining: 1 });
        assert_eq!(table.deliver(&port, 3).unwrap(), Delivery::Retired);
        assert!(table.deliver(&port, 4).is_err());

        let mut got = Vec::new();
        while let Some(v) = rx.recv().await {
            got.push(v);
        }
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn forged_port_is_rejected() {
        let table: PortTable<u8> = PortTable::new();
        let forged = Port::from_bytes([9u8; 32]);
        assert_eq!(table.deliver(&forged, 1), Err(Error::Unknown(forged)));
    }

    #[tokio::test]
    async fn closed_port_delivers_nothing() {
        let table = PortTable::new();
        let (port, mut rx) = table.mint();

        assert!(table.close(&port));
        assert!(!table.close(&port));
        assert!(table.deliver(&port, "late").is_err());
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn dropped_receiver_retires_port() {
        let table = PortTable::new();
        let (port, rx) = table.mint();
        drop(rx);

        assert_eq!(table.deliver(&port, 1u8), Err(Error::Closed(port)));
        assert!(!table.is_open(&port));
    }

    #[test]
    fn expire_retires_past_deadline() {
        let table: PortTable<u8> = PortTable::new();
        let now = Instant::now();
        let (old, _rx1) = table.open(1, Some(now));
        let (fresh, _rx2) = table.open(1, Some(now + Duration::from_secs(60)));
        let (forever, _rx3) = table.mint();

        assert_eq!(table.expire(now), vec![old]);
        assert!(table.is_open(&fresh));
        assert!(table.is_open(&forever));
        assert_eq!(table.outstanding(), 2);

        table.set_deadline(&forever, now).unwrap();
        assert_eq!(table.expire(now + Duration::from_secs(1)), vec![forever]);
    }

    #[test]
    fn expire_retires_abandoned_receivers() {
        let table: PortTable<u8> = PortTable::new();
        let (abandoned, rx) = table.mint();
        let (kept, _rx) = table.mint();
        drop(rx);

        assert_eq!(table.expire(Instant::now()), vec![abandoned]);
        assert!(table.is_open(&kept));
        assert_eq!(table.outstanding(), 1);
    }

    #[test]
    fn deadline_only_moves_later() {
        let table: PortTable<u8> = PortTable::new();
        let now = Instant::now();
        let (port, _rx) = table.open(1, Some(now + Duration::from_secs(10)));
        let (open_ended, _rx2) = table.open(1, None);

        table.extend_deadline(&port, now + Duration::from_secs(1)).unwrap();
        assert!(table.expire(now + Duration::from_secs(5)).is_empty());
        table.extend_deadline(&port, now + Duration::from_secs(20)).unwrap();
        assert!(table.expire(now + Duration::from_secs(15)).is_empty());
        assert_eq!(table.expire(now + Duration::from_secs(20)), vec![port]);

        table.extend_deadline(&open_ended, now).unwrap();
        assert!(table.is_open(&open_ended));
        assert!(table.extend_deadline(&port, now).is_err());
    }

    #[test]
    fn zero_bound_is_one() {
        let table: PortTable<u8> = PortTable::new();
        let (port, _rx) = table.open(0, None);
        assert_eq!(table.remaining(&port), Some(1));
    }
}
