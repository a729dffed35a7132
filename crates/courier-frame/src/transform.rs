//! Payload transforms applied around framing.
//!
//! On send the payload is compressed, then encrypted; on receive it is
//! decrypted, then decompressed. The "off" variants pass bytes through.

use crate::error::Result;

/// Symmetric payload compression.
pub trait Compressor: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Symmetric payload encryption.
pub trait Encryptor: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Compression turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn name(&self) -> &'static str {
        "none"
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Encryption turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEncryption;

impl Encryptor for NoEncryption {
    fn name(&self) -> &'static str {
        "none"
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Gzip payload compression.
#[cfg(feature = "gzip")]
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: flate2::Compression,
}

#[cfg(feature = "gzip")]
impl GzipCompressor {
    /// Compression level 0-9.
    pub fn new(level: u32) -> Self {
        Self {
            level: flate2::Compression::new(level.min(9)),
        }
    }
}

#[cfg(feature = "gzip")]
impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: flate2::Compression::default(),
        }
    }
}

#[cfg(feature = "gzip")]
impl Compressor for GzipCompressor {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        use std::io::Write;

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), self.level);
        encoder.write_all(data).map_err(|err| gzip_error(&err))?;
        encoder.finish().map_err(|err| gzip_error(&err))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        use std::io::Read;

        let mut decoder = flate2::read::GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|err| gzip_error(&err))?;
        Ok(out)
    }
}

#[cfg(feature = "gzip")]
fn gzip_error(err: &std::io::Error) -> crate::error::ProtocolError {
    crate::error::ProtocolError::Transform {
        transform: "gzip",
        reason: err.to_string(),
    }
}
