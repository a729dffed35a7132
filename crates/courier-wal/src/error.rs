use std::path::PathBuf;

use courier_frame::ProtocolError;

/// Errors that can occur in write-ahead log operations.
#[derive(Debug, thiserror::Error)]
pub enum WalError {
    /// Filesystem failure on a log file or directory.
    #[error("WAL I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A record that is not the tail of the last segment failed to decode.
    #[error("corrupt WAL segment {} at offset {offset}: {reason}", .path.display())]
    Corrupt {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// A message could not be encoded into a DATA entry.
    #[error("failed to serialize message: {0}")]
    Serialize(#[source] ProtocolError),

    /// A DATA entry could not be decoded back into a message.
    #[error("failed to deserialize message: {0}")]
    Deserialize(#[source] ProtocolError),

    /// The entry has the wrong type or payload shape for the requested view.
    #[error("unexpected WAL entry: {0}")]
    UnexpectedEntry(String),

    /// DATA entries need a message id to pair with their ACK.
    #[error("message has no id")]
    MissingId,

    /// Another queue in this registry already owns the directory.
    #[error("WAL directory {} is already in use", .path.display())]
    DirectoryInUse { path: PathBuf },

    /// Queue names become directory names and must be a single path component.
    #[error("invalid queue name '{0}'")]
    InvalidName(String),

    /// CONFIG descriptor encoding failed.
    #[error("queue descriptor JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The decorated queue failed while the log was being replayed.
    #[error("queue error: {0}")]
    Queue(#[from] courier_queue::QueueError),

    /// The log or registry has been closed.
    #[error("WAL is closed")]
    Closed,
}

impl WalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WalError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, WalError>;
