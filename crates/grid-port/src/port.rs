//! Capability ports.
//!
//! A port is 256 bits of keyed Blake3 output. The key is a random secret
//! held by the issuer, the input is a monotonically increasing counter.
//! Without the secret, ports can be neither derived nor predicted, and two
//! ports from the same issuer never collide.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::RngCore;

/// Unforgeable reply address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Port([u8; 32]);

impl Port {
    /// Wrap raw bytes, e.g. a port received from a peer.
    ///
    /// Holding bytes is not the same as holding an open port: delivery is
    /// checked against the issuing table.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl std::fmt::Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}...", &self.to_hex()[..8])
    }
}

/// Mints ports.
#[derive(Debug)]
pub struct PortIssuer {
    secret: [u8; 32],
    counter: AtomicU64,
}

impl Default for PortIssuer {
    fn default() -> Self {
        Self::new()
    }
}

impl PortIssuer {
    /// Create an issuer with a fresh random secret.
    pub fn new() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::with_secret(secret)
    }

    /// Create an issuer from a known secret.
    pub fn with_secret(secret: [u8; 32]) -> Self {
        Self {
            secret,
            counter: AtomicU64::new(0),
        }
    }

    /// Mint a fresh port.
    pub fn mint(&self) -> Port {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Port(*blake3::keyed_hash(&self.secret, &n.to_le_bytes()).as_bytes())
    }

    /// Number of ports minted so far.
    pub fn minted(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}
