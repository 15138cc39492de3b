//! Lifecycle of a single request carrying a reply port.
//!
//! ```text
//! Sent ──> Resolving ──> Completed
//!   │        │  ^   ├──> Failed
//!   │        └──┘   ├──> TimedOut
//!   │     (next miss └──> Cancelled
//!   │       round)
//!   └──> TimedOut | Cancelled
//! ```
//!
//! The four end states are terminal.

use crate::{Error, Result};

/// State of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Accepted, not yet walking the trie.
    Sent,
    /// Walking the trie; `round` counts miss/fetch rounds so far.
    Resolving {
        /// Completed miss rounds.
        round: u32,
    },
    /// A reply was delivered.
    Completed,
    /// Resolution failed; a failure reply was delivered.
    Failed,
    /// The request deadline passed; a timeout reply was delivered.
    TimedOut,
    /// The caller detached; nothing was delivered.
    Cancelled,
}

impl RequestState {
    /// Check if no further transitions are possible.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// Check whether `self -> next` is a legal transition.
    pub const fn can_advance(&self, next: &RequestState) -> bool {
        match (self, next) {
            (Self::Sent, Self::Resolving { round: 0 }) => true,
            (Self::Sent, Self::TimedOut | Self::Cancelled) => true,
            (Self::Resolving { round }, Self::Resolving { round: next }) => *next == *round + 1,
            (Self::Resolving { .. }, next) => next.is_terminal(),
            _ => false,
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn advance(&mut self, next: RequestState) -> Result<()> {
        if !self.can_advance(&next) {
            return Err(Error::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "Sent"),
            Self::Resolving { round } => write!(f, "Resolving(round {round})"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::TimedOut => write!(f, "TimedOut"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}
