//! Crash-recoverable durability for courier queues.
//!
//! [`WalQueue`] decorates any `Queue<Message>` with a write-ahead log kept in
//! a per-queue directory handed out by a [`WalRegistry`]. The log is a
//! sequence of segment files of fixed-header records (see [`entry`]):
//! DATA for each offered message, ACK for each one that left the queue and a
//! CONFIG descriptor of the queue itself. Replaying the log in LSN order
//! rebuilds the queue after a crash; compaction drops settled records.

pub mod config;
pub mod entry;
pub mod error;
pub mod log;
pub mod queue;
pub mod registry;
pub mod replay;
pub mod segment;

pub use config::{SyncPolicy, WalConfig};
pub use entry::{
    AckWalEntry, ConfigWalEntry, EntryType, MessageWalEntry, WalEntry, ENTRY_HEADER_SIZE,
};
pub use error::{Result, WalError};
pub use log::{CompactionReport, LogContents, WriteAheadLog};
pub use queue::{FaultHook, FaultPoint, ReloadReport, WalQueue};
pub use registry::{WalClaim, WalRegistry};
pub use replay::ReplayPlan;
pub use segment::SegmentInfo;
