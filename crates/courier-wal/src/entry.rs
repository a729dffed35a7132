//! WAL records and the typed views over them.
//!
//! Record layout, all integers big-endian:
//!
//! ```text
//! type:i8  lsn:i64  uuid:[u8;16]  expiry:i64  payload_len:i32  payload
//! ```
//!
//! `expiry` is epoch milliseconds, -1 for never. There is no checksum: a
//! record cut short by a crash is detected by length alone.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use courier_frame::{now_millis, Message, Protocol};
use courier_queue::QueueKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WalError};

/// Size of the fixed record header.
pub const ENTRY_HEADER_SIZE: usize = 37;

/// Largest payload a single record may declare.
pub const MAX_ENTRY_PAYLOAD: usize = 64 * 1024 * 1024;

/// LSN of an entry that has not been appended yet.
pub const UNASSIGNED_LSN: i64 = -1;

/// Record type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Ack,
    Config,
    Data,
}

impl EntryType {
    pub fn code(self) -> i8 {
        match self {
            EntryType::Ack => 1,
            EntryType::Config => 2,
            EntryType::Data => 3,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            1 => Some(EntryType::Ack),
            2 => Some(EntryType::Config),
            3 => Some(EntryType::Data),
            _ => None,
        }
    }
}

/// One log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    pub lsn: i64,
    pub entry_type: EntryType,
    /// Logical message the record belongs to (nil for CONFIG).
    pub uuid: Uuid,
    /// Epoch milliseconds; `None` means never.
    pub expiry: Option<u64>,
    pub payload: Bytes,
}

pub(crate) enum Decoded {
    Entry(WalEntry, usize),
    Incomplete,
    Invalid(String),
}

impl WalEntry {
    pub fn new(entry_type: EntryType, uuid: Uuid, expiry: Option<u64>, payload: Bytes) -> Self {
        Self {
            lsn: UNASSIGNED_LSN,
            entry_type,
            uuid,
            expiry,
            payload,
        }
    }

    pub fn has_expired(&self) -> bool {
        self.has_expired_at(now_millis())
    }

    pub fn has_expired_at(&self, now: u64) -> bool {
        self.expiry.is_some_and(|at| at <= now)
    }

    /// Bytes this record occupies on disk.
    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_SIZE + self.payload.len()
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_i8(self.entry_type.code());
        dst.put_i64(self.lsn);
        dst.put_slice(self.uuid.as_bytes());
        dst.put_i64(
            self.expiry
                .map_or(-1, |at| i64::try_from(at).unwrap_or(i64::MAX)),
        );
        dst.put_i32(self.payload.len() as i32);
        dst.put_slice(&self.payload);
    }

    /// Decode the record starting at `src[0]`.
    pub(crate) fn decode(src: &[u8]) -> Decoded {
        if src.len() < ENTRY_HEADER_SIZE {
            return Decoded::Incomplete;
        }

        let mut header = &src[..ENTRY_HEADER_SIZE];
        let code = header.get_i8();
        let Some(entry_type) = EntryType::from_code(code) else {
            return Decoded::Invalid(format!("unknown entry type {code}"));
        };
        let lsn = header.get_i64();
        if lsn < 0 {
            return Decoded::Invalid(format!("negative lsn {lsn}"));
        }
        let mut uuid = [0u8; 16];
        header.copy_to_slice(&mut uuid);
        let expiry = header.get_i64();
        let payload_len = header.get_i32();
        let payload_len = match usize::try_from(payload_len) {
            Ok(len) if len <= MAX_ENTRY_PAYLOAD => len,
            _ => return Decoded::Invalid(format!("invalid payload length {payload_len}")),
        };

        let total = ENTRY_HEADER_SIZE + payload_len;
        if src.len() < total {
            return Decoded::Incomplete;
        }

        let entry = WalEntry {
            lsn,
            entry_type,
            uuid: Uuid::from_bytes(uuid),
            expiry: u64::try_from(expiry).ok(),
            payload: Bytes::copy_from_slice(&src[ENTRY_HEADER_SIZE..total]),
        };
        Decoded::Entry(entry, total)
    }

    fn expect_type(&self, expected: EntryType) -> Result<()> {
        if self.entry_type != expected {
            return Err(WalError::UnexpectedEntry(format!(
                "expected {:?} entry, found {:?} at lsn {}",
                expected, self.entry_type, self.lsn
            )));
        }
        Ok(())
    }
}

/// Acknowledgement that a message left the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckWalEntry {
    pub id: Uuid,
}

impl AckWalEntry {
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }

    pub fn to_wal_entry(&self) -> WalEntry {
        WalEntry::new(
            EntryType::Ack,
            self.id,
            None,
            Bytes::copy_from_slice(self.id.as_bytes()),
        )
    }

    pub fn from_wal_entry(entry: &WalEntry) -> Result<Self> {
        entry.expect_type(EntryType::Ack)?;
        let id = Uuid::from_slice(&entry.payload).map_err(|_| {
            WalError::UnexpectedEntry(format!(
                "ACK payload at lsn {} is {} bytes, expected 16",
                entry.lsn,
                entry.payload.len()
            ))
        })?;
        Ok(Self { id })
    }
}

/// A queued message, encoded with the raw wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageWalEntry {
    message: Message,
    id: Uuid,
}

impl MessageWalEntry {
    /// Wrap a message. Fails with [`WalError::MissingId`] if it has no id.
    pub fn new(message: Message) -> Result<Self> {
        let id = message.id().ok_or(WalError::MissingId)?;
        Ok(Self { message, id })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn to_wal_entry(&self) -> Result<WalEntry> {
        let payload = Protocol::raw()
            .to_bytes(&self.message)
            .map_err(WalError::Serialize)?;
        Ok(WalEntry::new(
            EntryType::Data,
            self.id,
            self.message.expires_at(),
            payload,
        ))
    }

    pub fn from_wal_entry(entry: &WalEntry) -> Result<Self> {
        entry.expect_type(EntryType::Data)?;
        let mut message = Protocol::raw()
            .decode_exact(&entry.payload)
            .map_err(WalError::Deserialize)?
            .with_id(entry.uuid);
        if let Some(at) = entry.expiry {
            message = message.with_expiry(at);
        }
        Ok(Self {
            message,
            id: entry.uuid,
        })
    }
}

/// Queue descriptor written once when a log is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigWalEntry {
    pub name: String,
    pub kind: QueueKind,
    pub capacity: usize,
}

impl ConfigWalEntry {
    pub fn to_wal_entry(&self) -> Result<WalEntry> {
        let json = serde_json::to_vec(self)?;
        Ok(WalEntry::new(
            EntryType::Config,
            Uuid::nil(),
            None,
            Bytes::from(json),
        ))
    }

    pub fn from_wal_entry(entry: &WalEntry) -> Result<Self> {
        entry.expect_type(EntryType::Config)?;
        Ok(serde_json::from_slice(&entry.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use courier_frame::Status;

    use super::*;

    fn encoded(entry: &WalEntry) -> Vec<u8> {
        let mut buf = BytesMut::new();
        entry.encode(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn header_layout_is_fixed() {
        let id = Uuid::from_u128(0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10);
        let mut entry = AckWalEntry::new(id).to_wal_entry();
        entry.lsn = 7;
        let bytes = encoded(&entry);

        assert_eq!(bytes.len(), ENTRY_HEADER_SIZE + 16);
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..9], &7i64.to_be_bytes());
        assert_eq!(&bytes[9..25], id.as_bytes());
        assert_eq!(&bytes[25..33], &(-1i64).to_be_bytes());
        assert_eq!(&bytes[33..37], &16i32.to_be_bytes());
        assert_eq!(&bytes[37..], id.as_bytes());
    }

    #[test]
    fn ack_entry_inverts() {
        let ack = AckWalEntry::new(Uuid::new_v4());
        let entry = ack.to_wal_entry();
        assert_eq!(entry.payload.len(), 16);
        assert_eq!(AckWalEntry::from_wal_entry(&entry).unwrap(), ack);
    }

    #[test]
    fn ack_entry_rejects_short_payload() {
        let entry = WalEntry::new(EntryType::Ack, Uuid::nil(), None, Bytes::from_static(b"x"));
        assert!(matches!(
            AckWalEntry::from_wal_entry(&entry),
            Err(WalError::UnexpectedEntry(_))
        ));
    }

    #[test]
    fn message_entry_restores_id_and_expiry() {
        let id = Uuid::new_v4();
        let message = Message::text(Status::Request, "text/plain", "UTF-8", "persist me")
            .unwrap()
            .with_id(id)
            .with_expiry(4_102_444_800_000);

        let entry = MessageWalEntry::new(message.clone())
            .unwrap()
            .to_wal_entry()
            .unwrap();
        assert_eq!(entry.uuid, id);
        assert_eq!(entry.expiry, Some(4_102_444_800_000));

        let restored = MessageWalEntry::from_wal_entry(&entry).unwrap();
        assert_eq!(restored.id(), id);
        assert_eq!(restored.into_message(), message);
    }

    #[test]
    fn message_entry_requires_id() {
        let message = Message::binary(Status::Event, "x", Bytes::new());
        assert!(matches!(
            MessageWalEntry::new(message),
            Err(WalError::MissingId)
        ));
    }

    #[test]
    fn config_entry_is_json() {
        let config = ConfigWalEntry {
            name: "orders".to_string(),
            kind: QueueKind::Circular,
            capacity: 5,
        };
        let entry = config.to_wal_entry().unwrap();
        assert_eq!(
            std::str::from_utf8(&entry.payload).unwrap(),
            r#"{"name":"orders","kind":"circular","capacity":5}"#
        );
        assert_eq!(ConfigWalEntry::from_wal_entry(&entry).unwrap(), config);
    }

    #[test]
    fn typed_views_check_entry_type() {
        let ack = AckWalEntry::new(Uuid::new_v4()).to_wal_entry();
        assert!(matches!(
            MessageWalEntry::from_wal_entry(&ack),
            Err(WalError::UnexpectedEntry(_))
        ));
        assert!(matches!(
            ConfigWalEntry::from_wal_entry(&ack),
            Err(WalError::UnexpectedEntry(_))
        ));
    }

    #[test]
    fn decode_reports_incomplete_and_invalid() {
        let mut entry = AckWalEntry::new(Uuid::new_v4()).to_wal_entry();
        entry.lsn = 3;
        let bytes = encoded(&entry);

        assert!(matches!(
            WalEntry::decode(&bytes[..10]),
            Decoded::Incomplete
        ));
        assert!(matches!(
            WalEntry::decode(&bytes[..ENTRY_HEADER_SIZE + 4]),
            Decoded::Incomplete
        ));
        match WalEntry::decode(&bytes) {
            Decoded::Entry(decoded, used) => {
                assert_eq!(decoded, entry);
                assert_eq!(used, bytes.len());
            }
            _ => panic!("expected a complete entry"),
        }

        let mut zeroed = bytes.clone();
        zeroed[0] = 0;
        assert!(matches!(WalEntry::decode(&zeroed), Decoded::Invalid(_)));
    }

    #[test]
    fn expiry_checks() {
        let entry = WalEntry::new(EntryType::Data, Uuid::nil(), Some(100), Bytes::new());
        assert!(entry.has_expired_at(100));
        assert!(!entry.has_expired_at(99));
        let never = WalEntry::new(EntryType::Data, Uuid::nil(), None, Bytes::new());
        assert!(!never.has_expired());
    }
}
