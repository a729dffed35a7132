//! `tokio_util::codec` adapter for async streams.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::message::Message;
use crate::protocol::Protocol;

/// Frames [`Message`]s over any `AsyncRead + AsyncWrite` via `Framed`.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    protocol: Protocol,
}

impl MessageCodec {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        self.protocol.decode(src)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        match self.decode(buf)? {
            Some(message) => Ok(Some(message)),
            None if buf.is_empty() => Ok(None),
            None => Err(ProtocolError::Truncated {
                available: buf.len(),
            }),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        self.protocol.encode(&item, dst)
    }
}

impl Encoder<&Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        self.protocol.encode(item, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::message::Status;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, MessageCodec::default());
        let mut stream = FramedRead::new(server, MessageCodec::default());

        let sent = vec![
            Message::text(Status::Request, "text/plain", "UTF-8", "hello").unwrap(),
            Message::binary(Status::Event, "application/octet-stream", vec![7u8; 300]),
        ];
        let writer = {
            let sent = sent.clone();
            tokio::spawn(async move {
                for msg in sent {
                    sink.send(msg).await.unwrap();
                }
            })
        };

        for expected in &sent {
            let got = stream.next().await.unwrap().unwrap();
            assert_eq!(&got, expected);
        }
        writer.await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn eof_inside_message_is_truncated() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::from(&b"vn\x00\x00\x00\x01"[..]);
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { available: 6 }));
    }

    #[test]
    fn eof_at_boundary_is_clean() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }
}
