use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::charset::Charset;
use crate::error::EncodingError;

/// Message status carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// A request expecting exactly one response.
    Request,
    /// Successful response.
    ResponseOk,
    /// Failed response; the payload describes the failure.
    ResponseError,
    /// Unsolicited message pushed to a subscriber.
    Event,
}

impl Status {
    /// Wire code for this status.
    pub fn code(self) -> i32 {
        match self {
            Status::Request => 1,
            Status::ResponseOk => 2,
            Status::ResponseError => 3,
            Status::Event => 4,
        }
    }

    /// Resolve a wire code. Unknown codes return `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Status::Request),
            2 => Some(Status::ResponseOk),
            3 => Some(Status::ResponseError),
            4 => Some(Status::Event),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Request => "REQUEST",
            Status::ResponseOk => "RESPONSE_OK",
            Status::ResponseError => "RESPONSE_ERROR",
            Status::Event => "EVENT",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable message envelope.
///
/// `charset` is present exactly when the payload is text in that charset.
/// The optional `id` and `expires_at` travel with the message inside the
/// process and through the write-ahead log, not on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    status: Status,
    mimetype: String,
    charset: Option<Charset>,
    payload: Bytes,
    id: Option<Uuid>,
    expires_at: Option<u64>,
}

impl Message {
    /// Build a text message, encoding `data` with the named charset.
    pub fn text(
        status: Status,
        mimetype: impl Into<String>,
        charset: &str,
        data: &str,
    ) -> Result<Self, EncodingError> {
        let charset = Charset::for_name(charset)?;
        let payload = charset.encode(data)?;
        Ok(Self {
            status,
            mimetype: mimetype.into(),
            charset: Some(charset),
            payload: Bytes::from(payload),
            id: None,
            expires_at: None,
        })
    }

    /// Build a binary message (no charset).
    pub fn binary(status: Status, mimetype: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            status,
            mimetype: mimetype.into(),
            charset: None,
            payload: data.into(),
            id: None,
            expires_at: None,
        }
    }

    /// Reassemble a message from already-encoded parts.
    pub fn from_parts(
        status: Status,
        mimetype: impl Into<String>,
        charset: Option<Charset>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            status,
            mimetype: mimetype.into(),
            charset,
            payload: payload.into(),
            id: None,
            expires_at: None,
        }
    }

    /// A copy answering this message: status `ResponseOk`, same content.
    pub fn echo(&self) -> Self {
        Self {
            status: Status::ResponseOk,
            ..self.clone()
        }
    }

    /// Return this message carrying a correlation id.
    pub fn with_id(self, id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    /// Return this message expiring at `epoch_millis`.
    pub fn with_expiry(self, epoch_millis: u64) -> Self {
        Self {
            expires_at: Some(epoch_millis),
            ..self
        }
    }

    /// Return this message expiring `ttl` from now.
    pub fn with_ttl(self, ttl: Duration) -> Self {
        let deadline = now_millis().saturating_add(ttl.as_millis().min(u64::MAX as u128) as u64);
        self.with_expiry(deadline)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn mimetype(&self) -> &str {
        &self.mimetype
    }

    pub fn charset(&self) -> Option<Charset> {
        self.charset
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    /// Expiry as epoch milliseconds; `None` means never.
    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    pub fn is_text(&self) -> bool {
        self.charset.is_some()
    }

    /// Decode the payload with the message charset.
    pub fn text_payload(&self) -> Result<String, EncodingError> {
        match self.charset {
            Some(charset) => charset.decode(&self.payload),
            None => Err(EncodingError::NotText),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= now_millis())
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}
