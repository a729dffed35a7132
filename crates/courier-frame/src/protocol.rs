use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::charset::Charset;
use crate::codec::{decode_exact, decode_message, encode_message, ProtocolConfig, RawMessage};
use crate::error::{EncodingError, ProtocolError, Result};
use crate::message::Message;
use crate::transform::{Compressor, Encryptor, NoCompression, NoEncryption};

/// The message codec plus its payload transforms.
///
/// Cheap to clone; transforms are shared.
#[derive(Clone)]
pub struct Protocol {
    config: ProtocolConfig,
    compressor: Arc<dyn Compressor>,
    encryptor: Arc<dyn Encryptor>,
}

impl Protocol {
    /// Create a protocol with explicit configuration and transforms off.
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            compressor: Arc::new(NoCompression),
            encryptor: Arc::new(NoEncryption),
        }
    }

    /// Default configuration, no compression, no encryption.
    ///
    /// The write-ahead log stores messages in this form.
    pub fn raw() -> Self {
        Self::new(ProtocolConfig::default())
    }

    /// Use `compressor` for payloads.
    pub fn with_compressor(mut self, compressor: impl Compressor + 'static) -> Self {
        self.compressor = Arc::new(compressor);
        self
    }

    /// Use `encryptor` for payloads.
    pub fn with_encryptor(mut self, encryptor: impl Encryptor + 'static) -> Self {
        self.encryptor = Arc::new(encryptor);
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Encode `message` onto the end of `dst`.
    pub fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<()> {
        let compressed = self.compressor.encode(message.payload())?;
        let payload = self.encryptor.encode(&compressed)?;

        let charset = message.charset().map(Charset::name).unwrap_or_default();
        let frames = [
            charset.as_bytes(),
            message.mimetype().as_bytes(),
            payload.as_slice(),
        ];
        for frame in frames {
            if frame.len() > self.config.max_frame_size {
                return Err(ProtocolError::FrameTooLarge {
                    size: frame.len(),
                    max: self.config.max_frame_size,
                });
            }
        }

        encode_message(
            message.status(),
            charset.as_bytes(),
            message.mimetype().as_bytes(),
            &payload,
            dst,
        )
    }

    /// Encode `message` into a standalone buffer.
    pub fn to_bytes(&self, message: &Message) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(message, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode one message from a streaming buffer.
    ///
    /// Returns `Ok(None)` until a complete message is buffered.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Message>> {
        match decode_message(src, self.config.max_frame_size)? {
            Some(raw) => self.finish(raw).map(Some),
            None => Ok(None),
        }
    }

    /// Decode one message that occupies all of `src`.
    pub fn decode_exact(&self, src: &[u8]) -> Result<Message> {
        let raw = decode_exact(src, self.config.max_frame_size)?;
        self.finish(raw)
    }

    fn finish(&self, raw: RawMessage) -> Result<Message> {
        let charset = if raw.charset.is_empty() {
            None
        } else {
            let name = std::str::from_utf8(&raw.charset).map_err(|_| {
                EncodingError::UnsupportedCharset(String::from_utf8_lossy(&raw.charset).into_owned())
            })?;
            Some(Charset::for_name(name)?)
        };
        let mimetype = String::from_utf8(raw.mimetype.to_vec())
            .map_err(|_| EncodingError::Malformed { charset: "UTF-8" })?;

        let decrypted = self.encryptor.decode(&raw.payload)?;
        let payload = self.compressor.decode(&decrypted)?;

        Ok(Message::from_parts(raw.status, mimetype, charset, payload))
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::raw()
    }
}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("config", &self.config)
            .field("compressor", &self.compressor.name())
            .field("encryptor", &self.encryptor.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Status;

    /// Reversible test cipher: XOR with a fixed key byte.
    struct XorEncryptor(u8);

    impl Encryptor for XorEncryptor {
        fn name(&self) -> &'static str {
            "xor"
        }

        fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
            Ok(data.iter().map(|b| b ^ self.0).collect())
        }

        fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
            self.encode(data)
        }
    }

    /// Test compressor that prefixes a marker so ordering is observable.
    struct MarkerCompressor;

    impl Compressor for MarkerCompressor {
        fn name(&self) -> &'static str {
            "marker"
        }

        fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
            let mut out = b"Z:".to_vec();
            out.extend_from_slice(data);
            Ok(out)
        }

        fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
            data.strip_prefix(b"Z:")
                .map(<[u8]>::to_vec)
                .ok_or(ProtocolError::Transform {
                    transform: "marker",
                    reason: "missing marker".to_string(),
                })
        }
    }

    fn roundtrip(protocol: &Protocol, message: &Message) -> Message {
        let mut buf = BytesMut::new();
        protocol.encode(message, &mut buf).unwrap();
        let decoded = protocol.decode(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
        decoded
    }

    #[test]
    fn text_roundtrip_preserves_every_field() {
        let protocol = Protocol::raw();
        for (charset, text) in [
            ("UTF-8", "héllo ☃"),
            ("US-ASCII", "plain"),
            ("ISO-8859-1", "façade"),
            ("UTF-16BE", "wide ☃"),
            ("UTF-16LE", ""),
        ] {
            let msg = Message::text(Status::Request, "text/plain", charset, text).unwrap();
            let decoded = roundtrip(&protocol, &msg);
            assert_eq!(decoded, msg, "charset {charset}");
            assert_eq!(decoded.text_payload().unwrap(), text);
        }
    }

    #[test]
    fn binary_roundtrip_preserves_every_field() {
        let protocol = Protocol::raw();
        let payloads: [&[u8]; 3] = [b"", &[0, 255, 7], &[0xAB; 70_000]];
        for payload in payloads {
            let msg = Message::binary(
                Status::ResponseError,
                "application/octet-stream",
                payload.to_vec(),
            );
            assert_eq!(roundtrip(&protocol, &msg), msg);
        }
    }

    #[test]
    fn transforms_apply_compress_then_encrypt() {
        let protocol = Protocol::raw()
            .with_compressor(MarkerCompressor)
            .with_encryptor(XorEncryptor(0x5A));
        let msg = Message::binary(Status::Event, "x", b"data".to_vec());

        let wire = protocol.to_bytes(&msg).unwrap();
        let framed_payload = &wire[wire.len() - 6..];
        let expected: Vec<u8> = b"Z:data".iter().map(|b| b ^ 0x5A).collect();
        assert_eq!(framed_payload, expected.as_slice());

        assert_eq!(roundtrip(&protocol, &msg), msg);
    }

    #[test]
    fn decode_exact_restores_message() {
        let protocol = Protocol::raw();
        let msg = Message::text(Status::Request, "application/json", "UTF-8", "{}").unwrap();
        let wire = protocol.to_bytes(&msg).unwrap();
        assert_eq!(protocol.decode_exact(&wire).unwrap(), msg);
    }

    #[test]
    fn short_header_never_yields_a_message() {
        let protocol = Protocol::raw();
        let err = protocol.decode_exact(b"vn\x00\x00\x00\x01\x00").unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { available: 7 }));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let protocol = Protocol::raw();
        let msg = Message::binary(Status::Request, "x", b"y".to_vec());
        let mut wire = protocol.to_bytes(&msg).unwrap().to_vec();
        wire[0] = b'x';
        let err = protocol.decode_exact(&wire).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMagic(_)));
    }

    #[test]
    fn unknown_charset_on_wire_is_rejected() {
        let mut buf = BytesMut::new();
        encode_message(Status::Request, b"EBCDIC", b"text/plain", b"x", &mut buf).unwrap();
        let err = Protocol::raw().decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Encoding(EncodingError::UnsupportedCharset(_))
        ));
    }

    #[test]
    fn oversized_payload_rejected_on_encode() {
        let protocol = Protocol::new(ProtocolConfig {
            max_frame_size: 4,
            ..ProtocolConfig::default()
        });
        let msg = Message::binary(Status::Request, "x", vec![0u8; 5]);
        let err = protocol.to_bytes(&msg).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { size: 5, max: 4 }));
    }
}
