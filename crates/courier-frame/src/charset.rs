//! Text charsets understood by the codec.
//!
//! The charset frame on the wire carries the canonical name returned by
//! [`Charset::name`]. Lookups accept any casing and the usual aliases.

use std::fmt;
use std::str::FromStr;

use crate::error::EncodingError;

/// A supported text encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    Utf8,
    UsAscii,
    Iso8859_1,
    Utf16Be,
    Utf16Le,
}

impl Charset {
    /// Resolve a charset by name or alias (case-insensitive).
    pub fn for_name(name: &str) -> Result<Self, EncodingError> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        let charset = match normalized.as_str() {
            "utf-8" | "utf8" => Charset::Utf8,
            "us-ascii" | "ascii" | "iso646-us" => Charset::UsAscii,
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" => Charset::Iso8859_1,
            "utf-16be" | "utf16be" => Charset::Utf16Be,
            "utf-16le" | "utf16le" => Charset::Utf16Le,
            _ => return Err(EncodingError::UnsupportedCharset(name.to_string())),
        };
        Ok(charset)
    }

    /// Canonical name written to the charset frame.
    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::UsAscii => "US-ASCII",
            Charset::Iso8859_1 => "ISO-8859-1",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf16Le => "UTF-16LE",
        }
    }

    /// Encode text into bytes of this charset.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, EncodingError> {
        match self {
            Charset::Utf8 => Ok(text.as_bytes().to_vec()),
            Charset::UsAscii => self.encode_single_byte(text, 0x7F),
            Charset::Iso8859_1 => self.encode_single_byte(text, 0xFF),
            Charset::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            Charset::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
        }
    }

    /// Decode bytes of this charset into text.
    pub fn decode(self, bytes: &[u8]) -> Result<String, EncodingError> {
        let malformed = EncodingError::Malformed {
            charset: self.name(),
        };
        match self {
            Charset::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|_| malformed),
            Charset::UsAscii => {
                if bytes.is_ascii() {
                    Ok(bytes.iter().map(|&b| char::from(b)).collect())
                } else {
                    Err(malformed)
                }
            }
            Charset::Iso8859_1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Charset::Utf16Be | Charset::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(malformed);
                }
                let units = bytes.chunks_exact(2).map(|pair| {
                    let pair = [pair[0], pair[1]];
                    if self == Charset::Utf16Be {
                        u16::from_be_bytes(pair)
                    } else {
                        u16::from_le_bytes(pair)
                    }
                });
                char::decode_utf16(units)
                    .collect::<Result<String, _>>()
                    .map_err(|_| malformed)
            }
        }
    }

    fn encode_single_byte(self, text: &str, max: u32) -> Result<Vec<u8>, EncodingError> {
        text.chars()
            .map(|ch| {
                let code = u32::from(ch);
                if code <= max {
                    Ok(code as u8)
                } else {
                    Err(EncodingError::Unmappable {
                        charset: self.name(),
                        ch,
                    })
                }
            })
            .collect()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Charset {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Charset::for_name(s)
    }
}
