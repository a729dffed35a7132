//! TCP client/server plumbing for courier messages.
//!
//! [`TcpClient`] sends a request and waits for its reply. [`TcpServer`]
//! accepts connections and leaves dispatch to the caller.
//! [`SubscriptionListener`] pumps pushed messages into a handler on a
//! background thread.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod listener;
pub mod server;

pub use client::TcpClient;
pub use config::{ClientConfig, ServerConfig};
pub use connection::Connection;
pub use error::{PeerError, Result};
pub use listener::{ListenerExit, MessageSource, SubscriptionListener};
pub use server::TcpServer;
