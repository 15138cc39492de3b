//! Grid Ports - capability-addressed replies
//!
//! A port names where a response goes. It is minted by the party that will
//! receive the response and handed out with the request; nobody else can
//! derive it. Holding a port is the right to receive a bounded number of
//! replies (one by default).
//!
//! - [`PortIssuer`]: mints unforgeable 256-bit ports (keyed Blake3)
//! - [`PortTable`]: tracks open ports, enforces the reply bound, retires ports
//! - [`RequestState`]: the `Sent -> Resolving -> terminal` request machine

mod error;
mod port;
mod request;
mod table;

pub use error::{Error, Result};
pub use port::{Port, PortIssuer};
pub use request::RequestState;
pub use table::{Delivery, PortReceiver, PortTable};
