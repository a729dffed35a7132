use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::message::Status;

/// Message header: magic (2) + version (4) + status (4) = 10 bytes.
pub const HEADER_SIZE: usize = 10;

/// Magic bytes: "vn" (0x76 0x6E).
pub const MAGIC: [u8; 2] = [0x76, 0x6E];

/// The only protocol version this codec speaks.
pub const PROTOCOL_VERSION: i32 = 1;

/// Size of each frame's length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// The untransformed contents of one message as they appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub status: Status,
    /// Charset name bytes; empty for binary messages.
    pub charset: Bytes,
    pub mimetype: Bytes,
    /// Payload bytes as framed, i.e. after compression/encryption.
    pub payload: Bytes,
}

impl RawMessage {
    /// The total wire size of this message (header + frames).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE
            + 3 * LENGTH_PREFIX_SIZE
            + self.charset.len()
            + self.mimetype.len()
            + self.payload.len()
    }
}

/// Encode one message into the wire format.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌────────┬─────────┬────────┬───────────────┬────────────────┬───────────────┐
/// │ "vn"   │ version │ status │ charset frame │ mimetype frame │ payload frame │
/// │ (2B)   │ (4B)    │ (4B)   │ len(4B)+bytes │ len(4B)+bytes  │ len(4B)+bytes │
/// └────────┴─────────┴────────┴───────────────┴────────────────┴───────────────┘
/// ```
pub fn encode_message(
    status: Status,
    charset: &[u8],
    mimetype: &[u8],
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let frames = [charset, mimetype, payload];
    for frame in frames {
        if frame.len() > i32::MAX as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: frame.len(),
                max: i32::MAX as usize,
            });
        }
    }

    let body: usize = frames.iter().map(|f| LENGTH_PREFIX_SIZE + f.len()).sum();
    dst.reserve(HEADER_SIZE + body);
    dst.put_slice(&MAGIC);
    dst.put_i32(PROTOCOL_VERSION);
    dst.put_i32(status.code());
    for frame in frames {
        dst.put_i32(frame.len() as i32);
        dst.put_slice(frame);
    }
    Ok(())
}

/// Decode one message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// Header fields and frame lengths are validated as soon as their bytes are
/// present, so garbage is rejected without waiting for more input. On
/// success, consumes the message bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, max_frame: usize) -> Result<Option<RawMessage>> {
    let layout = match scan(src, max_frame)? {
        Scan::Incomplete => return Ok(None),
        Scan::Complete(layout) => layout,
    };

    let message = src.split_to(layout.total).freeze();
    let [charset, mimetype, payload] = layout.frames;
    Ok(Some(RawMessage {
        status: layout.status,
        charset: message.slice(charset.0..charset.1),
        mimetype: message.slice(mimetype.0..mimetype.1),
        payload: message.slice(payload.0..payload.1),
    }))
}

/// Decode exactly one message occupying all of `src`.
///
/// Short input is [`ProtocolError::Truncated`]; leftover bytes are
/// [`ProtocolError::TrailingBytes`].
pub fn decode_exact(src: &[u8], max_frame: usize) -> Result<RawMessage> {
    let mut buf = BytesMut::from(src);
    match decode_message(&mut buf, max_frame)? {
        Some(raw) if buf.is_empty() => Ok(raw),
        Some(_) => Err(ProtocolError::TrailingBytes(buf.len())),
        None => Err(ProtocolError::Truncated {
            available: src.len(),
        }),
    }
}

enum Scan {
    Incomplete,
    Complete(Layout),
}

struct Layout {
    status: Status,
    /// `(start, end)` byte offsets of the charset, mimetype and payload frames.
    frames: [(usize, usize); 3],
    total: usize,
}

fn scan(src: &[u8], max_frame: usize) -> Result<Scan> {
    if src.len() >= MAGIC.len() && src[..MAGIC.len()] != MAGIC {
        return Err(ProtocolError::InvalidMagic([src[0], src[1]]));
    }
    if src.len() >= 6 {
        let version = read_i32(&src[2..6]);
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
    }
    if src.len() < HEADER_SIZE {
        return Ok(Scan::Incomplete);
    }

    let code = read_i32(&src[6..10]);
    let status = Status::from_code(code).ok_or(ProtocolError::UnknownStatus(code))?;

    let mut offset = HEADER_SIZE;
    let mut frames = [(0usize, 0usize); 3];
    for slot in frames.iter_mut() {
        if src.len() < offset + LENGTH_PREFIX_SIZE {
            return Ok(Scan::Incomplete);
        }
        let declared = read_i32(&src[offset..offset + LENGTH_PREFIX_SIZE]);
        if declared < 0 {
            return Err(ProtocolError::InvalidFrameLength(declared));
        }
        let len = declared as usize;
        if len > max_frame {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: max_frame,
            });
        }
        offset += LENGTH_PREFIX_SIZE;
        *slot = (offset, offset + len);
        offset += len;
        if src.len() < offset {
            return Ok(Scan::Incomplete);
        }
    }

    Ok(Scan::Complete(Layout {
        status,
        frames,
        total: offset,
    }))
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Maximum size of any single frame in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
