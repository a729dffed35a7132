use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use courier_transport::Channel;

use crate::error::{ProtocolError, Result};
use crate::message::Message;
use crate::protocol::Protocol;
use crate::reader::transport_to_protocol_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete messages to any `Write` stream.
///
/// A message is encoded into an internal buffer first, so a payload that
/// fails to encode never leaves a partial message on the stream.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    protocol: Protocol,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with the raw protocol.
    pub fn new(inner: T) -> Self {
        Self::with_protocol(inner, Protocol::raw())
    }

    /// Create a new message writer with an explicit protocol.
    pub fn with_protocol(inner: T, protocol: Protocol) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            protocol,
        }
    }

    /// Encode and write a complete message (blocking), then flush.
    ///
    /// A write timeout surfaces as `ProtocolError::Io`; the stream may hold a
    /// partial message afterwards and must be discarded.
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        self.buf.clear();
        self.protocol.encode(message, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(ProtocolError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ProtocolError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ProtocolError::Io(err)),
            }
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }
}

impl MessageWriter<Channel> {
    /// Create a message writer for a [`Channel`] and apply the protocol's write timeout.
    pub fn for_channel(inner: Channel, protocol: Protocol) -> Result<Self> {
        inner
            .set_write_timeout(protocol.config().write_timeout)
            .map_err(transport_to_protocol_error)?;
        Ok(Self::with_protocol(inner, protocol))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::codec::ProtocolConfig;
    use crate::message::Status;
    use crate::reader::MessageReader;

    fn decode_all(bytes: Vec<u8>) -> Vec<Message> {
        let mut reader = MessageReader::new(Cursor::new(bytes));
        let mut out = Vec::new();
        loop {
            match reader.read_message() {
                Ok(msg) => out.push(msg),
                Err(ProtocolError::ConnectionClosed) => return out,
                Err(err) => panic!("unexpected decode error: {err}"),
            }
        }
    }

    #[test]
    fn write_multiple_messages() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        let messages = vec![
            Message::text(Status::Request, "text/plain", "UTF-8", "one").unwrap(),
            Message::binary(Status::Event, "application/octet-stream", vec![2u8]),
            Message::text(Status::ResponseError, "text/plain", "US-ASCII", "three").unwrap(),
        ];
        for msg in &messages {
            writer.write_message(msg).unwrap();
        }

        let wire = writer.into_inner().into_inner();
        assert_eq!(decode_all(wire), messages);
    }

    #[test]
    fn oversized_payload_writes_nothing() {
        let protocol = Protocol::new(ProtocolConfig {
            max_frame_size: 4,
            ..ProtocolConfig::default()
        });
        let mut writer = MessageWriter::with_protocol(Cursor::new(Vec::<u8>::new()), protocol);

        let err = writer
            .write_message(&Message::binary(Status::Request, "x", b"oversized".to_vec()))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
        assert!(writer.into_inner().into_inner().is_empty());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = MessageWriter::new(sink);

        writer
            .write_message(&Message::binary(Status::Event, "x", b"x".to_vec()))
            .unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };

        let msg = Message::binary(Status::Request, "x", b"retry".to_vec());
        let mut writer = MessageWriter::new(writer_impl);
        writer.write_message(&msg).unwrap();

        let inner = writer.into_inner();
        assert_eq!(decode_all(inner.data), vec![msg]);
    }

    #[test]
    fn would_block_is_reported_not_retried() {
        let mut writer = MessageWriter::new(WouldBlockWriter);
        let err = writer
            .write_message(&Message::binary(Status::Request, "x", b"x".to_vec()))
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = MessageWriter::new(ZeroWriter);
        let err = writer
            .write_message(&Message::binary(Status::Request, "x", b"x".to_vec()))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }

    #[test]
    fn applies_write_timeout_for_channel() {
        let listener = courier_transport::TcpTransport::bind_loopback(0).unwrap();
        let client = courier_transport::TcpTransport::connect(listener.local_addr()).unwrap();
        let _server = listener.accept().unwrap();

        let protocol = Protocol::new(ProtocolConfig {
            write_timeout: Some(std::time::Duration::from_millis(10)),
            ..ProtocolConfig::default()
        });
        assert!(MessageWriter::for_channel(client, protocol).is_ok());
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct WouldBlockWriter;

    impl Write for WouldBlockWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
