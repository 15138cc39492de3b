//! Error types for grid-kernel.

use grid_router::MissError;
use grid_trie::{MountError, TrieError};
use thiserror::Error;

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a resolve produced no completion. `NotFound` is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Every candidate for a stub on the key's path failed.
    #[error(transparent)]
    Exhausted(#[from] MissError),

    /// The key is empty or too long.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// More miss rounds than `max_resolution_depth`.
    #[error("resolution exceeded {rounds} miss rounds")]
    DepthExceeded {
        /// Rounds completed before giving up.
        rounds: u32,
    },
}

impl ResolveError {
    /// Returns true if a later attempt could succeed without any
    /// administrative change.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
}

/// Kernel errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Mount administration failed.
    #[error(transparent)]
    Mount(#[from] MountError),

    /// Local trie mutation failed.
    #[error(transparent)]
    Trie(#[from] TrieError),

    /// Port misuse.
    #[error(transparent)]
    Port(#[from] grid_port::Error),
}
