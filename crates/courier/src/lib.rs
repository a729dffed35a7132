//! Framed messaging with durable queues.
//!
//! # Crate Structure
//!
//! - [`transport`]: loopback TCP listener and byte channel
//! - [`frame`]: message envelope, bit-exact wire codec, payload transforms
//! - [`queue`]: bounded, circular and null in-memory queues
//! - [`wal`]: segmented write-ahead log and the durable queue decorator
//!   (behind the `wal` feature)
//! - [`peer`]: request/reply client, server and subscription listener
//!   (behind the `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use courier_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use courier_frame::*;
}

/// Re-export queue types.
pub mod queue {
    pub use courier_queue::*;
}

/// Re-export WAL types (requires `wal` feature).
#[cfg(feature = "wal")]
pub mod wal {
    pub use courier_wal::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use courier_peer::*;
}
