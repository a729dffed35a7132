use serde::{Deserialize, Serialize};

/// When appended records are forced to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// `fdatasync` after every append.
    #[default]
    Always,
    /// Leave flushing to the OS; survives process crashes, not power loss.
    Never,
}

/// Write-ahead log tuning shared by every queue in a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalConfig {
    pub sync: SyncPolicy,
    /// A new segment is started once the active one reaches this size.
    pub max_segment_bytes: u64,
    /// Compact automatically after this many ACKs. `None` disables it.
    pub compact_after_acks: Option<u64>,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            sync: SyncPolicy::Always,
            max_segment_bytes: 64 * 1024 * 1024,
            compact_after_acks: None,
        }
    }
}
