//! Grid Kernel
//!
//! Ties the pieces together. A caller mints a [`Port`](grid_port::Port),
//! sends a key with it, and receives the completion on the port. Between
//! the two, the [`Resolver`] walks local content and mounted backends,
//! fetching unresolved regions through the router the first time they are
//! touched.
//!
//! ```text
//! send(key, port)
//!     │
//!     ▼
//! Resolver ── lookup ──> Found / NotFound ──> reply on port
//!     │
//!     └─ Stub ──> single-flight miss ──> Router ──> Backend::fetch
//!                     │
//!                     └──> graft, evict, look up again
//! ```

mod config;
mod error;
mod kernel;
mod reply;
mod resolver;

pub use config::KernelConfig;
pub use error::{Error, ResolveError, Result};
pub use kernel::{Kernel, RequestHandle};
pub use reply::{Completion, Reply};
pub use resolver::{MissOutcome, Mounts, Resolver};
