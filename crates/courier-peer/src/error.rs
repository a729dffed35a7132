/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// The client, server or connection is not in a state that allows the call.
    #[error("invalid state: {0}")]
    State(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] courier_transport::TransportError),

    /// Protocol-level error. The channel must be discarded.
    #[error("protocol error: {0}")]
    Protocol(#[from] courier_frame::ProtocolError),

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// A read or write did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl PeerError {
    pub(crate) fn state(msg: impl Into<String>) -> Self {
        PeerError::State(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
