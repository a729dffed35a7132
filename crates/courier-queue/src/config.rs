use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{BoundedQueue, CircularBuffer, NullQueue, Queue};

/// Backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Bounded,
    Circular,
    Null,
}

impl QueueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueKind::Bounded => "bounded",
            QueueKind::Circular => "circular",
            QueueKind::Null => "null",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bounded" => Ok(QueueKind::Bounded),
            "circular" => Ok(QueueKind::Circular),
            "null" => Ok(QueueKind::Null),
            other => Err(format!(
                "unknown queue kind '{other}' (expected bounded, circular or null)"
            )),
        }
    }
}

/// Queue declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Unique within a WAL registry; also the WAL directory name.
    pub name: String,
    pub kind: QueueKind,
    /// Ignored for [`QueueKind::Null`].
    pub capacity: usize,
    /// Never persisted when true.
    pub temporary: bool,
    pub durable: bool,
}

impl QueueConfig {
    /// A durable, non-temporary queue.
    pub fn new(name: impl Into<String>, kind: QueueKind, capacity: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            capacity,
            temporary: false,
            durable: true,
        }
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    /// Construct the configured backend.
    pub fn build<T: Send + 'static>(&self) -> Box<dyn Queue<T>> {
        match self.kind {
            QueueKind::Bounded => Box::new(BoundedQueue::with_config(self)),
            QueueKind::Circular => Box::new(CircularBuffer::with_config(self)),
            QueueKind::Null => Box::new(NullQueue::with_config(self)),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new("default", QueueKind::Bounded, 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_and_displays() {
        for kind in [QueueKind::Bounded, QueueKind::Circular, QueueKind::Null] {
            assert_eq!(kind.to_string().parse::<QueueKind>().unwrap(), kind);
        }
        assert_eq!(" Circular ".parse::<QueueKind>().unwrap(), QueueKind::Circular);
        assert!("priority".parse::<QueueKind>().is_err());
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&QueueKind::Circular).unwrap(),
            "\"circular\""
        );
    }

    #[test]
    fn build_selects_backend() {
        for kind in [QueueKind::Bounded, QueueKind::Circular, QueueKind::Null] {
            let queue = QueueConfig::new("q", kind, 3).build::<u32>();
            assert_eq!(queue.kind(), kind);
            assert_eq!(queue.name(), "q");
        }
        let null = QueueConfig::new("n", QueueKind::Null, 3).build::<u32>();
        assert_eq!(null.capacity(), 0);
    }

    #[test]
    fn flags_flow_into_backend() {
        let queue = QueueConfig::new("t", QueueKind::Bounded, 1)
            .temporary(true)
            .durable(false)
            .build::<u8>();
        assert!(queue.is_temporary());
        assert!(!queue.is_durable());
    }
}
