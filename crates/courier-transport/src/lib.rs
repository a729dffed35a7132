//! Loopback TCP transport for courier.
//!
//! This is the lowest layer of the workspace. It owns socket lifecycle only:
//! binding a listener, accepting and connecting streams, and applying
//! timeouts. Everything above it talks to a [`Channel`].

pub mod channel;
pub mod error;
pub mod tcp;

pub use channel::Channel;
pub use error::{Result, TransportError};
pub use tcp::TcpTransport;
