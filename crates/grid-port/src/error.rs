//! Error types for grid-port.

use thiserror::Error;

use crate::{Port, RequestState};

/// Result type for grid-port operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when delivering to ports or tracking requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The port was never issued here, or has been retired.
    #[error("port {0} is not open")]
    Unknown(Port),

    /// The holder of the port stopped listening.
    #[error("receiver for port {0} has been dropped")]
    Closed(Port),

    /// Illegal request state transition.
    #[error("invalid request transition: {from} -> {to}")]
    InvalidTransition {
        from: RequestState,
        to: RequestState,
    },
}
