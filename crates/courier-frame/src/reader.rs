use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use courier_transport::Channel;

use crate::error::{ProtocolError, Result};
use crate::message::Message;
use crate::protocol::Protocol;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete messages from any `Read` stream.
///
/// Partial reads are buffered; callers only ever see complete messages.
/// Any error leaves the reader unusable: the stream position is no longer at
/// a message boundary.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    protocol: Protocol,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with the raw protocol.
    pub fn new(inner: T) -> Self {
        Self::with_protocol(inner, Protocol::raw())
    }

    /// Create a new message reader with an explicit protocol.
    pub fn with_protocol(inner: T, protocol: Protocol) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            protocol,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(ProtocolError::ConnectionClosed)` when EOF is reached at a
    /// message boundary and `Err(ProtocolError::Truncated)` when EOF cuts a
    /// message short.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(message) = self.protocol.decode(&mut self.buf)? {
                return Ok(message);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ProtocolError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Err(ProtocolError::ConnectionClosed);
                }
                return Err(ProtocolError::Truncated {
                    available: self.buf.len(),
                });
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Protocol used for decoding.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }
}

impl MessageReader<Channel> {
    /// Create a message reader for a [`Channel`] and apply the protocol's read timeout.
    pub fn for_channel(inner: Channel, protocol: Protocol) -> Result<Self> {
        inner
            .set_read_timeout(protocol.config().read_timeout)
            .map_err(transport_to_protocol_error)?;
        Ok(Self::with_protocol(inner, protocol))
    }
}

pub(crate) fn transport_to_protocol_error(
    err: courier_transport::TransportError,
) -> ProtocolError {
    match err {
        courier_transport::TransportError::Io(io)
        | courier_transport::TransportError::Accept(io) => ProtocolError::Io(io),
        courier_transport::TransportError::Bind { source, .. }
        | courier_transport::TransportError::Connect { source, .. } => ProtocolError::Io(source),
        other => ProtocolError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use bytes::BufMut;

    use super::*;
    use crate::codec::{MAGIC, PROTOCOL_VERSION};
    use crate::message::Status;
    use crate::writer::MessageWriter;

    fn wire(messages: &[Message]) -> Vec<u8> {
        let protocol = Protocol::raw();
        let mut buf = BytesMut::new();
        for message in messages {
            protocol.encode(message, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn text(status: Status, body: &str) -> Message {
        Message::text(status, "text/plain", "UTF-8", body).unwrap()
    }

    #[test]
    fn read_single_message() {
        let msg = text(Status::Request, "hello");
        let mut reader = MessageReader::new(Cursor::new(wire(&[msg.clone()])));
        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    fn read_multiple_messages() {
        let messages = vec![
            text(Status::Request, "one"),
            text(Status::ResponseOk, "two"),
            Message::binary(Status::Event, "application/octet-stream", vec![3u8]),
        ];
        let mut reader = MessageReader::new(Cursor::new(wire(&messages)));

        for expected in &messages {
            assert_eq!(&reader.read_message().unwrap(), expected);
        }
        assert!(matches!(
            reader.read_message(),
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[test]
    fn read_message_with_large_payload() {
        let msg = Message::binary(Status::Event, "blob", vec![0xAB; 64 * 1024]);
        let mut reader = MessageReader::new(Cursor::new(wire(&[msg.clone()])));
        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    fn partial_read_handling() {
        let msg = text(Status::Request, "slow");
        let byte_reader = ByteByByteReader {
            bytes: wire(&[msg.clone()]),
            pos: 0,
        };
        let mut reader = MessageReader::new(byte_reader);
        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = MessageReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }

    #[test]
    fn short_header_is_truncated() {
        let mut reader = MessageReader::new(Cursor::new(b"vn\x00\x00\x00".to_vec()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { available: 5 }));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_i32(PROTOCOL_VERSION);
        partial.put_i32(Status::Request.code());
        partial.put_i32(0);
        partial.put_i32(0);
        partial.put_i32(16);
        partial.put_slice(b"only-part");

        let mut reader = MessageReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }

    #[test]
    fn invalid_magic_in_stream() {
        let bytes = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01];
        let mut reader = MessageReader::new(Cursor::new(bytes));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMagic([0x00, 0x01])));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut bytes = BytesMut::new();
        bytes.put_slice(&MAGIC);
        bytes.put_i32(PROTOCOL_VERSION);
        bytes.put_i32(Status::Request.code());
        bytes.put_i32(1024);

        let protocol = Protocol::new(crate::codec::ProtocolConfig {
            max_frame_size: 16,
            ..crate::codec::ProtocolConfig::default()
        });
        let mut reader = MessageReader::with_protocol(Cursor::new(bytes.to_vec()), protocol);
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = MessageWriter::new(left);
        let mut reader = MessageReader::new(right);

        let ping = text(Status::Request, "ping");
        writer.write_message(&ping).unwrap();
        assert_eq!(reader.read_message().unwrap(), ping);
    }

    #[test]
    fn concurrent_reader_writer_threads() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = MessageWriter::new(left);
        let reader = Arc::new(Mutex::new(MessageReader::new(right)));

        let reader_thread = {
            let reader = Arc::clone(&reader);
            std::thread::spawn(move || {
                for expected in 0..64 {
                    let msg = reader.lock().unwrap().read_message().unwrap();
                    assert_eq!(msg.text_payload().unwrap(), format!("msg-{expected}"));
                }
            })
        };

        for i in 0..64 {
            writer
                .write_message(&text(Status::Event, &format!("msg-{i}")))
                .unwrap();
        }

        reader_thread.join().unwrap();
    }

    #[test]
    fn read_would_block_propagates_io_error() {
        let reader = WouldBlockThenData {
            state: 0,
            bytes: wire(&[text(Status::Request, "ok")]),
            pos: 0,
        };
        let mut framed = MessageReader::new(reader);
        let err = framed.read_message().unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn interrupted_read_retries() {
        let msg = text(Status::Request, "ok");
        let reader = WouldBlockThenData {
            state: 2,
            bytes: wire(&[msg.clone()]),
            pos: 0,
        };
        let mut framed = MessageReader::new(reader);
        assert_eq!(framed.read_message().unwrap(), msg);
    }

    /// State 0 fails once with WouldBlock, state 2 fails once with Interrupted.
    struct WouldBlockThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for WouldBlockThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.state {
                0 => {
                    self.state = 1;
                    return Err(std::io::Error::from(ErrorKind::WouldBlock));
                }
                2 => {
                    self.state = 1;
                    return Err(std::io::Error::from(ErrorKind::Interrupted));
                }
                _ => {}
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn applies_read_timeout_for_channel() {
        let listener = courier_transport::TcpTransport::bind_loopback(0).unwrap();
        let addr = listener.local_addr();
        let _client = courier_transport::TcpTransport::connect(addr).unwrap();
        let stream = listener.accept().unwrap();

        let protocol = Protocol::new(crate::codec::ProtocolConfig {
            read_timeout: Some(std::time::Duration::from_millis(20)),
            ..crate::codec::ProtocolConfig::default()
        });
        let mut reader = MessageReader::for_channel(stream, protocol).unwrap();
        let err = reader.read_message().unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
    }

    #[test]
    fn roundtrip_over_tcp_channel() {
        let listener = courier_transport::TcpTransport::bind_loopback(0).unwrap();
        let addr = listener.local_addr();

        let server = std::thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let mut reader = MessageReader::for_channel(stream, Protocol::raw()).unwrap();
            reader.read_message().unwrap()
        });

        let stream = courier_transport::TcpTransport::connect(addr).unwrap();
        let mut writer = MessageWriter::for_channel(stream, Protocol::raw()).unwrap();
        let msg = text(Status::Request, "tcp");
        writer.write_message(&msg).unwrap();

        assert_eq!(server.join().unwrap(), msg);
    }
}
