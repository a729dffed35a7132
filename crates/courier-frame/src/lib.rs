//! Message envelope and wire codec.
//!
//! Every message travels as a fixed 10-byte header followed by three
//! length-prefixed frames:
//! - `'v' 'n'` magic, a 4-byte big-endian protocol version and a 4-byte
//!   big-endian status code
//! - charset, mimetype and payload frames, each a 4-byte big-endian length
//!   followed by that many bytes (an empty charset marks a binary message)
//!
//! Payload bytes pass through pluggable [`Compressor`] and [`Encryptor`]
//! transforms. No partial reads, no buffer management in user code.

pub mod charset;
pub mod codec;
pub mod error;
pub mod message;
pub mod protocol;
pub mod reader;
pub mod transform;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::MessageCodec;
pub use charset::Charset;
pub use codec::{
    decode_exact, decode_message, encode_message, ProtocolConfig, RawMessage, DEFAULT_MAX_FRAME,
    HEADER_SIZE, MAGIC, PROTOCOL_VERSION,
};
pub use error::{EncodingError, ProtocolError, Result};
pub use message::{now_millis, Message, Status};
pub use protocol::Protocol;
pub use reader::MessageReader;
#[cfg(feature = "gzip")]
pub use transform::GzipCompressor;
pub use transform::{Compressor, Encryptor, NoCompression, NoEncryption};
pub use writer::MessageWriter;
