//! Error types for grid-router.

use grid_trie::Key;
use thiserror::Error;

/// A single fetch failed. Absorbed by the router's retry loop.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The backend could not be reached.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with an explicit failure.
    #[error("backend rejected fetch: {0}")]
    Rejected(String),

    /// Local IO failure (persistent stores).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else a collaborator wants to report.
    #[error("{0}")]
    Other(String),
}

/// Every candidate for a stub failed within the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissError {
    /// Candidates exhausted; the stub stays unresolved.
    #[error("no backend resolved {prefix} after {attempts} attempt(s)")]
    Exhausted {
        /// Mount prefix of the stub.
        prefix: Key,
        /// Fetch attempts made.
        attempts: usize,
    },
}

impl MissError {
    /// Creates an `Exhausted` error.
    pub fn exhausted(prefix: Key, attempts: usize) -> Self {
        Self::Exhausted { prefix, attempts }
    }

    /// Returns true if candidates were exhausted.
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_display() {
        let err = MissError::exhausted(Key::from("c"), 2);
        assert!(err.is_exhausted());
        assert!(err.to_string().contains("after 2 attempt(s)"));
        assert!(err.to_string().contains("\"c\""));
    }

    #[test]
    fn transport_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TransportError = io.into();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
