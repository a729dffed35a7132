/// Errors that can occur while encoding or decoding text payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// The charset name is not recognized.
    #[error("unsupported charset '{0}'")]
    UnsupportedCharset(String),

    /// A character cannot be represented in the target charset.
    #[error("character {ch:?} cannot be encoded as {charset}")]
    Unmappable { charset: &'static str, ch: char },

    /// The payload bytes are not valid in the message charset.
    #[error("payload is not valid {charset}")]
    Malformed { charset: &'static str },

    /// A text view was requested for a binary message.
    #[error("message has no charset (binary payload)")]
    NotText,
}

/// Errors that can occur during message encoding/decoding.
///
/// Every variant is fatal for the channel it was raised on: callers must
/// reconnect rather than retry mid-stream.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The header does not start with the `'v' 'n'` magic bytes.
    #[error("invalid magic {0:02x?} (expected \"vn\")")]
    InvalidMagic([u8; 2]),

    /// The header carries a protocol version other than the supported one.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(i32),

    /// The header carries a status code with no known meaning.
    #[error("unknown status code {0}")]
    UnknownStatus(i32),

    /// A frame declared a negative length.
    #[error("invalid frame length {0}")]
    InvalidFrameLength(i32),

    /// A frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The input ended before a complete message was available.
    #[error("truncated message ({available} bytes available)")]
    Truncated { available: usize },

    /// A bounded buffer held bytes past the end of the message.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// The charset frame or text payload could not be interpreted.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A compression or encryption transform failed.
    #[error("{transform} failed: {reason}")]
    Transform {
        transform: &'static str,
        reason: String,
    },

    /// An I/O error occurred while reading or writing messages.
    #[error("protocol I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed cleanly at a message boundary.
    #[error("connection closed")]
    ConnectionClosed,
}

impl ProtocolError {
    /// True when the error came from a read or write timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(err)
                if matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
